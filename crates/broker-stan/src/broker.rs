use core::fmt;
use core::future::pending;
use core::time::Duration;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use broker_core::{
    Broker, Error, Handler, Message, Options, PublishOptions, Result, SubscribeOptions, Subscriber,
};
use stan_client::{
    msg_handler, Connection, ConnectionLostHandler, Connector, JetStreamConnector, Msg,
    SubscriptionOption, SubscriptionOptions,
};
use tokio::sync::RwLock;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::options::subscribe_context;
use crate::{
    normalize_addrs, AckOnSuccess, ClientOptions, ClusterId, ConnectTimeout, Reconnect,
    StanPublication, StanSubscriber, SubscriptionOptionList, DEFAULT_CONNECT_TIMEOUT, NAME,
};

/// Delay between connection attempts after the first one failed
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// A [`Broker`] publishing and subscribing through a streaming client connection.
///
/// Settings specific to the streaming client are read from the options context, see
/// [`StanOptionsExt`](crate::StanOptionsExt).
#[derive(Clone)]
pub struct StanBroker {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    state: RwLock<State>,
}

struct State {
    opts: Options,
    /// Normalized server addresses
    addrs: Vec<String>,
    /// Client options the broker was created with
    sopts: stan_client::Options,
    /// Client options used for connection attempts, resolved by the last `connect`
    nopts: stan_client::Options,
    conn: Option<Arc<dyn Connection>>,
    cluster_id: String,
    timeout: Duration,
    reconnect: bool,
    /// Cancelled by `disconnect` to stop pending connection attempts
    done: Option<CancellationToken>,
}

impl StanBroker {
    /// Create a broker connecting over NATS JetStream
    pub fn new(opts: Options) -> Self {
        Self::with_connector(opts, Arc::new(JetStreamConnector))
    }

    /// Create a broker opening its connections through `connector`
    pub fn with_connector(opts: Options, connector: Arc<dyn Connector>) -> Self {
        let sopts = opts
            .context
            .value::<ClientOptions>()
            .map(|ClientOptions(sopts)| sopts.clone())
            .unwrap_or_default();
        let mut opts = opts;
        if opts.addrs.is_empty() {
            opts.addrs = sopts.nats_url.split(',').map(String::from).collect();
        }
        let state = State {
            addrs: normalize_addrs(&opts.addrs),
            opts,
            nopts: sopts.clone(),
            sopts,
            conn: None,
            cluster_id: String::new(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: false,
            done: Some(CancellationToken::new()),
        };
        Self {
            inner: Arc::new(Inner {
                connector,
                state: RwLock::new(state),
            }),
        }
    }

    /// Whether a connection is currently established
    pub async fn is_connected(&self) -> bool {
        self.inner.state.read().await.conn.is_some()
    }
}

impl fmt::Display for StanBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NAME)
    }
}

impl fmt::Debug for StanBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StanBroker").finish_non_exhaustive()
    }
}

impl Inner {
    /// Try to connect right away, then once per [`RETRY_INTERVAL`] until connected, the connect
    /// timeout elapses, the options context is cancelled or the broker is disconnected.
    async fn retry(&self) -> Result<()> {
        let (cluster_id, nopts, addrs, timeout, ctx, done) = {
            let state = self.state.read().await;
            (
                state.cluster_id.clone(),
                state.nopts.clone(),
                state.addrs.clone(),
                state.timeout,
                state.opts.context.clone(),
                state.done.clone().unwrap_or_default(),
            )
        };
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let mut ticker = interval_at(Instant::now() + RETRY_INTERVAL, RETRY_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        match self.try_connect(&cluster_id, &nopts, &done).await {
            Ok(()) => return Ok(()),
            Err(err) => debug!(?addrs, %err, "first connection attempt failed"),
        }
        loop {
            tokio::select! {
                () = ctx.cancelled() => return Ok(()),
                () = done.cancelled() => return Ok(()),
                () = async {
                    match deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => pending().await,
                    }
                } => return Err(Error::ConnectTimeout(addrs)),
                _ = ticker.tick() => {
                    match self.try_connect(&cluster_id, &nopts, &done).await {
                        Ok(()) => {
                            info!(?addrs, "successfully connected");
                            return Ok(());
                        }
                        Err(err) => warn!(?addrs, %err, "failed to connect"),
                    }
                }
            }
        }
    }

    /// One connection attempt under a fresh client ID
    async fn try_connect(
        &self,
        cluster_id: &str,
        nopts: &stan_client::Options,
        done: &CancellationToken,
    ) -> stan_client::Result<()> {
        let client_id = Uuid::new_v4().to_string();
        let conn = self
            .connector
            .connect(cluster_id, &client_id, nopts.clone())
            .await?;

        let mut state = self.state.write().await;
        if done.is_cancelled() {
            drop(state);
            debug!(%client_id, "disconnected while connecting, closing new connection");
            return conn.close().await;
        }
        if let Some(old) = state.conn.replace(conn) {
            tokio::spawn(async move {
                if let Err(err) = old.close().await {
                    debug!(%err, "failed to close replaced connection");
                }
            });
        }
        debug!(%client_id, "connection established");
        Ok(())
    }
}

/// Connection-lost handler re-entering the retry loop
fn reconnect_handler(inner: Weak<Inner>) -> ConnectionLostHandler {
    Arc::new(move |err: stan_client::Error| {
        warn!(%err, "connection lost");
        let Some(inner) = inner.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if !inner.state.read().await.reconnect {
                return;
            }
            if let Err(err) = inner.retry().await {
                error!(%err, "failed to reconnect");
            }
        });
    })
}

#[async_trait]
impl Broker for StanBroker {
    async fn init(&self, options: Options) -> Result<()> {
        let mut state = self.inner.state.write().await;
        state.addrs = normalize_addrs(&options.addrs);
        state.opts = options;
        Ok(())
    }

    async fn options(&self) -> Options {
        self.inner.state.read().await.opts.clone()
    }

    async fn address(&self) -> String {
        self.inner
            .state
            .read()
            .await
            .addrs
            .first()
            .cloned()
            .unwrap_or_default()
    }

    #[instrument(level = "debug", skip_all)]
    async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            if state.conn.is_some() {
                return Ok(());
            }

            let ctx = &state.opts.context;
            let cluster_id = ctx
                .value::<ClusterId>()
                .map(|ClusterId(id)| id.clone())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| Error::Config("must specify a cluster ID".into()))?;
            let reconnect = ctx.value::<Reconnect>().is_some_and(|Reconnect(r)| *r);
            let timeout = ctx
                .value::<ConnectTimeout>()
                .map_or(DEFAULT_CONNECT_TIMEOUT, |ConnectTimeout(t)| *t);

            if state.sopts.connection_lost_handler.is_some() && reconnect {
                return Err(Error::Config(
                    "a custom connection lost handler cannot be combined with reconnect".into(),
                ));
            }

            let mut nopts = state.sopts.clone();
            nopts.nats_url = state.addrs.join(",");
            if reconnect {
                nopts.connection_lost_handler =
                    Some(reconnect_handler(Arc::downgrade(&self.inner)));
            }

            debug!(%cluster_id, addrs = ?state.addrs, reconnect, ?timeout, "connecting");
            state.nopts = nopts;
            state.cluster_id = cluster_id;
            state.timeout = timeout;
            state.reconnect = reconnect;
            if state.done.is_none() {
                state.done = Some(CancellationToken::new());
            }
        }
        self.inner.retry().await
    }

    #[instrument(level = "debug", skip_all)]
    async fn disconnect(&self) -> Result<()> {
        let conn = {
            let mut state = self.inner.state.write().await;
            if let Some(done) = state.done.take() {
                done.cancel();
            }
            state.conn.take()
        };
        match conn {
            Some(conn) => conn.close().await.map_err(Error::client),
            None => Ok(()),
        }
    }

    #[instrument(level = "trace", skip(self, msg, _opts))]
    async fn publish(&self, topic: &str, msg: &Message, _opts: PublishOptions) -> Result<()> {
        let state = self.inner.state.read().await;
        let data = state.opts.codec.marshal(msg)?;
        let conn = state.conn.as_ref().ok_or(Error::NotConnected)?;
        conn.publish(topic, data).await.map_err(Error::client)
    }

    #[instrument(level = "debug", skip(self, handler, opts), fields(queue = ?opts.queue))]
    async fn subscribe(
        &self,
        topic: &str,
        handler: Handler,
        opts: SubscribeOptions,
    ) -> Result<Box<dyn Subscriber>> {
        let state = self.inner.state.read().await;
        let conn = state.conn.as_ref().ok_or(Error::NotConnected)?;
        let codec = Arc::clone(&state.opts.codec);

        let mut opts = opts;
        let ctx = subscribe_context(&opts);
        let mut stan_opts = Vec::new();
        if !opts.auto_ack {
            stan_opts.push(SubscriptionOption::ManualAckMode);
        }
        if let Some(SubscriptionOptionList(list)) = ctx.value::<SubscriptionOptionList>() {
            stan_opts.extend(list.iter().cloned());
        }
        let ack_on_success = ctx.value::<AckOnSuccess>().is_some_and(|AckOnSuccess(a)| *a);
        if ack_on_success {
            stan_opts.push(SubscriptionOption::ManualAckMode);
        }

        let resolved = SubscriptionOptions::from_options(&stan_opts).map_err(|err| match err {
            stan_client::Error::InvalidSubscriptionOption(reason) => {
                Error::InvalidSubscribeOption(reason)
            }
            err => Error::client(err),
        })?;
        opts.auto_ack = !resolved.manual_acks;

        let on_msg = msg_handler(move |msg: Msg| {
            let codec = Arc::clone(&codec);
            let handler = Arc::clone(&handler);
            async move {
                let message = match codec.unmarshal(&msg.data) {
                    Ok(message) => message,
                    Err(err) => {
                        debug!(subject = %msg.subject, %err, "dropping undecodable message");
                        return;
                    }
                };
                let publication = StanPublication {
                    topic: msg.subject.clone(),
                    message,
                    msg: msg.clone(),
                };
                match handler(Box::new(publication)).await {
                    Ok(()) if ack_on_success => {
                        if let Err(err) = msg.ack().await {
                            warn!(subject = %msg.subject, %err, "failed to ack message");
                        }
                    }
                    Ok(()) => {}
                    Err(err) => debug!(subject = %msg.subject, ?err, "handler failed"),
                }
            }
        });

        let sub = match opts.queue.as_deref() {
            Some(queue) if !queue.is_empty() => {
                conn.queue_subscribe(topic, queue, on_msg, &stan_opts).await
            }
            _ => conn.subscribe(topic, on_msg, &stan_opts).await,
        }
        .map_err(Error::client)?;
        drop(state);

        debug!(durable = resolved.is_durable(), "subscribed");
        Ok(Box::new(StanSubscriber::new(
            topic.to_string(),
            opts,
            resolved.is_durable(),
            sub,
        )))
    }
}
