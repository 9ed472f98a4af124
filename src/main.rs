#![warn(clippy::pedantic)]

use core::time::Duration;

use anyhow::{self, bail, Context};
use broker_core::{handler, Message, Options, PublishOptions, Registry, SubscribeOptions};
use broker_stan::{StanConfig, StanSubscribeOptionsExt};
use clap::{Parser, Subcommand};
use stan_client::SubscriptionOption;
use tokio::signal;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Streaming cluster to connect to
    #[clap(long = "cluster-id", env = "STAN_CLUSTER_ID")]
    cluster_id: String,

    /// Comma-separated NATS server URLs
    #[clap(
        short = 's',
        long = "nats-url",
        env = "NATS_URL",
        default_value = stan_client::DEFAULT_NATS_URL
    )]
    nats_url: String,

    /// Re-establish the connection when it is lost
    #[clap(long = "reconnect", env = "STAN_RECONNECT")]
    reconnect: bool,

    /// Give up connecting after this long, e.g. `5s`. `0s` retries forever.
    #[clap(long = "connect-timeout", env = "STAN_CONNECT_TIMEOUT", value_parser = humantime::parse_duration)]
    connect_timeout: Option<Duration>,

    /// JetStream domain of the cluster
    #[clap(long = "js-domain", env = "STAN_JS_DOMAIN")]
    js_domain: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Publish a message
    Pub {
        topic: String,
        body: String,
        /// Message header as `key=value`, may be repeated
        #[clap(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Print messages arriving on a topic until interrupted
    Sub {
        topic: String,
        /// Queue group to join
        #[clap(short = 'q', long = "queue")]
        queue: Option<String>,
        /// Keep the subscription position on the server under this name
        #[clap(long = "durable")]
        durable: Option<String>,
        /// Start with the oldest message still stored
        #[clap(long = "all")]
        all: bool,
        /// Acknowledge only messages that were printed
        #[clap(long = "ack-on-success")]
        ack_on_success: bool,
    },
}

impl Args {
    fn config(&self) -> StanConfig {
        StanConfig {
            cluster_id: Some(self.cluster_id.clone()),
            cluster_uris: self.nats_url.split(',').map(String::from).collect(),
            reconnect: Some(self.reconnect),
            connect_timeout: self.connect_timeout,
            js_domain: self.js_domain.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().without_time())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,async_nats=warn")),
        )
        .init();

    let mut registry = Registry::new();
    broker_stan::register(&mut registry);
    let broker = registry
        .build(broker_stan::NAME, args.config().apply(Options::new()))
        .context("streaming broker is not registered")?;
    broker.connect().await.context("failed to connect")?;
    info!(address = %broker.address().await, "connected");

    let res = match args.command {
        Command::Pub {
            topic,
            body,
            headers,
        } => {
            let mut msg = Message::new(body);
            for header in headers {
                let Some((key, value)) = header.split_once('=') else {
                    bail!("invalid header `{header}`, expected `key=value`");
                };
                msg = msg.with_header(key, value);
            }
            broker
                .publish(&topic, &msg, PublishOptions::default())
                .await
                .with_context(|| format!("failed to publish to `{topic}`"))
        }
        Command::Sub {
            topic,
            queue,
            durable,
            all,
            ack_on_success,
        } => {
            let mut opts = SubscribeOptions::new();
            if let Some(queue) = queue {
                opts = opts.queue(queue);
            }
            if let Some(durable) = durable {
                opts = opts.durable_name(durable);
            }
            if all {
                opts = opts.subscription_option(SubscriptionOption::DeliverAllAvailable);
            }
            if ack_on_success {
                opts = opts.ack_on_success();
            }
            let sub = broker
                .subscribe(
                    &topic,
                    handler(|publication| async move {
                        let msg = publication.message();
                        println!(
                            "[{}] {:?} {}",
                            publication.topic(),
                            msg.header,
                            String::from_utf8_lossy(&msg.body)
                        );
                        Ok(())
                    }),
                    opts,
                )
                .await
                .with_context(|| format!("failed to subscribe to `{topic}`"))?;
            signal::ctrl_c()
                .await
                .context("failed to wait for Ctrl-C")?;
            sub.unsubscribe().await.context("failed to unsubscribe")
        }
    };
    broker.disconnect().await.context("failed to disconnect")?;
    res
}
