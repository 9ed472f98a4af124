//! A [`Broker`] backend for streaming messaging.
//!
//! [`StanBroker`] adapts a [`stan_client::Connection`] to the generic broker interface: it
//! connects with retries (and optionally reconnects when the connection drops), publishes
//! encoded messages, and maps subscribe options onto streaming subscription options such as
//! durable names, start positions and manual acknowledgement.
//!
//! ```no_run
//! # async fn run() -> broker_core::Result<()> {
//! use broker_core::{Broker, Options};
//! use broker_stan::{StanBroker, StanOptionsExt};
//!
//! let broker = StanBroker::new(
//!     Options::new()
//!         .addrs(["127.0.0.1:4222"])
//!         .cluster_id("test-cluster")
//!         .reconnect(true),
//! );
//! broker.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use broker_core::{Broker, Options, Registry};

mod addrs;
mod broker;
mod config;
mod options;
mod publication;
mod subscriber;

pub use addrs::normalize_addrs;
pub use broker::StanBroker;
pub use config::{
    ConfigError, StanConfig, CONFIG_STAN_ACK_TIMEOUT, CONFIG_STAN_CLUSTER_ID,
    CONFIG_STAN_CONNECT_TIMEOUT, CONFIG_STAN_JS_DOMAIN, CONFIG_STAN_MAX_PUB_ACKS_INFLIGHT,
    CONFIG_STAN_PING_INTERVAL, CONFIG_STAN_RECONNECT, CONFIG_STAN_URI,
};
pub use options::{
    AckOnSuccess, ClientOptions, ClusterId, ConnectTimeout, Reconnect, StanOptionsExt,
    StanSubscribeOptionsExt, SubscribeContext, SubscriptionOptionList, DEFAULT_CONNECT_TIMEOUT,
};
pub use publication::StanPublication;
pub use subscriber::StanSubscriber;

/// Name the broker registers under
pub const NAME: &str = "stan";

/// Construct a streaming broker as a registry [`Factory`](broker_core::Factory)
pub fn new_broker(opts: Options) -> Arc<dyn Broker> {
    Arc::new(StanBroker::new(opts))
}

/// Add the streaming broker to `registry` under [`NAME`]
pub fn register(registry: &mut Registry) {
    registry.register(NAME, new_broker);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_register() {
        let mut registry = Registry::new();
        register(&mut registry);
        assert!(registry.contains("stan"));
    }

    #[tokio::test]
    async fn test_defaults() {
        let broker = new_broker(Options::new());
        assert_eq!(broker.to_string(), "stan");
        assert_eq!(broker.address().await, "nats://127.0.0.1:4222");
        assert_eq!(broker.options().await.codec.name(), "json");
    }

    #[tokio::test]
    async fn test_addrs_from_client_options() {
        let broker = StanBroker::new(Options::new().client_options(stan_client::Options {
            nats_url: "a:4222,nats://b:4222".into(),
            ..Default::default()
        }));
        assert_eq!(broker.address().await, "nats://a:4222");
        assert_eq!(broker.options().await.addrs, ["a:4222", "nats://b:4222"]);
    }

    #[tokio::test]
    async fn test_init_replaces_options() {
        let broker = StanBroker::new(Options::new().addrs(["a:4222"]));
        broker
            .init(Options::new().addrs(["", "b:4222"]))
            .await
            .unwrap();
        assert_eq!(broker.address().await, "nats://b:4222");
    }
}
