//! [`Connector`] implementation backed by NATS JetStream.
//!
//! Every cluster maps to one stream named after the cluster ID and capturing all subjects under
//! `<cluster>.>`. Channels are published as `<cluster>.<channel>`, and subscriptions are pull
//! consumers filtered on a single channel.

use core::future::IntoFuture;
use core::time::Duration;

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy};
use async_nats::jetstream::{self, stream};
use async_nats::{ClientError, Event, ServerAddr};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    Acker, Connection, ConnectionLostHandler, Connector, Error, Msg, MsgHandler, Options, Result,
    StartPosition, Subscription, SubscriptionOption, SubscriptionOptions,
};

/// How long the server keeps a consumer nobody pulls from before removing it
const EPHEMERAL_INACTIVE_THRESHOLD: Duration = Duration::from_secs(5);

/// Connects to a NATS server with JetStream enabled
#[derive(Clone, Copy, Debug, Default)]
pub struct JetStreamConnector;

#[async_trait]
impl Connector for JetStreamConnector {
    #[instrument(level = "debug", skip(self, opts), fields(nats_url = %opts.nats_url))]
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        opts: Options,
    ) -> Result<Arc<dyn Connection>> {
        let stream_name = stream_name(cluster_id)?;
        let servers = opts
            .urls()
            .map(ServerAddr::from_str)
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| Error::Connect {
                url: opts.nats_url.clone(),
                source: Box::new(e),
            })?;

        let lost = LostSignal {
            fired: Arc::default(),
            handler: opts.connection_lost_handler.clone(),
            nats_url: opts.nats_url.clone(),
        };
        let connect_opts = async_nats::ConnectOptions::new()
            .name(client_id)
            .connection_timeout(opts.connect_timeout)
            .ping_interval(opts.ping_interval)
            .max_reconnects(opts.max_reconnects)
            .request_timeout(Some(opts.ack_timeout))
            .event_callback({
                let lost = lost.clone();
                move |event| {
                    let lost = lost.clone();
                    async move { lost.observe(&event) }
                }
            });
        let client = connect_opts
            .connect(servers.as_slice())
            .await
            .map_err(|e| Error::Connect {
                url: opts.nats_url.clone(),
                source: Box::new(e),
            })?;

        let context = match opts.js_domain.as_deref() {
            Some(domain) if !domain.is_empty() => jetstream::with_domain(client.clone(), domain),
            _ => jetstream::new(client.clone()),
        };
        let stream = context
            .get_or_create_stream(stream::Config {
                name: stream_name.clone(),
                subjects: vec![format!("{stream_name}.>")],
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Other(Box::new(e)))?;
        debug!(stream = %stream_name, client_id, "connected to streaming cluster");

        Ok(Arc::new(JetStreamConnection {
            client,
            context,
            stream,
            prefix: stream_name,
            ack_timeout: opts.ack_timeout,
            pub_acks: Arc::new(Semaphore::new(opts.max_pub_acks_inflight.max(1))),
            tasks: Mutex::default(),
            lost,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Fires the connection-lost handler at most once, when the client gives up on the connection.
/// Disconnects the client recovers from are only logged.
#[derive(Clone)]
struct LostSignal {
    fired: Arc<AtomicBool>,
    handler: Option<ConnectionLostHandler>,
    nats_url: String,
}

impl LostSignal {
    fn observe(&self, event: &Event) {
        let nats_url = &self.nats_url;
        match event {
            Event::Disconnected => warn!(%nats_url, "nats client disconnected, reconnecting"),
            Event::Connected => debug!(%nats_url, "nats client connected"),
            Event::ClientError(ClientError::MaxReconnects) | Event::Closed => {
                warn!(%nats_url, %event, "nats connection lost");
                self.fire();
            }
            Event::ServerError(err) => error!("nats server error: '{:?}'", err),
            Event::ClientError(err) => error!("nats client error: '{:?}'", err),
            event => trace!(%event, "nats client event"),
        }
    }

    fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handler) = &self.handler {
            handler(Error::ConnectionLost(self.nats_url.clone()));
        }
    }

    /// Keep the handler from firing for a connection closed on purpose
    fn disarm(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }
}

/// A connection to a JetStream-backed cluster
pub struct JetStreamConnection {
    client: async_nats::Client,
    context: jetstream::Context,
    stream: stream::Stream,
    prefix: String,
    ack_timeout: Duration,
    pub_acks: Arc<Semaphore>,
    /// Delivery tasks of every subscription made on this connection
    tasks: Mutex<Vec<AbortHandle>>,
    /// Shared with the event callback
    lost: LostSignal,
    closed: AtomicBool,
}

impl JetStreamConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    async fn subscribe_consumer(
        &self,
        subject: &str,
        queue: Option<&str>,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>> {
        self.ensure_open()?;
        let sub_opts = SubscriptionOptions::from_options(opts)?;
        let filter_subject = channel_subject(&self.prefix, subject);
        let consumer_name = consumer_name(subject, queue, sub_opts.durable_name.as_deref());
        let config = pull::Config {
            durable_name: sub_opts
                .is_durable()
                .then(|| consumer_name.clone())
                .flatten(),
            name: consumer_name.clone(),
            filter_subject,
            deliver_policy: deliver_policy(sub_opts.start_at),
            ack_policy: AckPolicy::Explicit,
            ack_wait: sub_opts.ack_wait,
            max_ack_pending: i64::try_from(sub_opts.max_inflight).unwrap_or(i64::MAX),
            inactive_threshold: if sub_opts.is_durable() {
                Duration::ZERO
            } else {
                EPHEMERAL_INACTIVE_THRESHOLD
            },
            ..Default::default()
        };
        let existing = match consumer_name.as_deref() {
            Some(name) => self
                .stream
                .get_consumer::<pull::Config>(name)
                .await
                .ok(),
            None => None,
        };
        let consumer = match existing {
            Some(consumer) => {
                ensure_filter(
                    subject,
                    &consumer.cached_info().name,
                    &consumer.cached_info().config.filter_subject,
                    &config.filter_subject,
                )?;
                consumer
            }
            None => self
                .stream
                .create_consumer(config)
                .await
                .map_err(|e| Error::Subscription {
                    subject: subject.to_string(),
                    source: Box::new(e),
                })?,
        };
        let name = match consumer_name {
            Some(name) => name,
            None => consumer.cached_info().name.clone(),
        };
        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Subscription {
                subject: subject.to_string(),
                source: Box::new(e),
            })?;

        let prefix = self.prefix.clone();
        let manual_acks = sub_opts.manual_acks;
        let channel = subject.to_string();
        let task = tokio::spawn(async move {
            let mut messages = messages;
            while let Some(message) = messages.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(?err, %channel, "failed to receive message");
                        continue;
                    }
                };
                let msg = delivered_msg(&prefix, message);
                if manual_acks {
                    handler(msg).await;
                } else {
                    handler(msg.clone()).await;
                    if let Err(err) = msg.ack().await {
                        warn!(?err, %channel, "failed to ack message");
                    }
                }
            }
            debug!(%channel, "subscription delivery ended");
        });
        self.tasks.lock().await.push(task.abort_handle());

        Ok(Box::new(JetStreamSubscription {
            stream: self.stream.clone(),
            consumer: name,
            subject: subject.to_string(),
            remove_on_unsubscribe: queue.is_none() || sub_opts.is_durable(),
            durable: sub_opts.is_durable(),
            task: task.abort_handle(),
            removed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl Connection for JetStreamConnection {
    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    async fn publish(&self, subject: &str, data: Bytes) -> Result<()> {
        self.ensure_open()?;
        let _permit = self
            .pub_acks
            .acquire()
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        let subject = channel_subject(&self.prefix, subject);
        let ack = self
            .context
            .publish(subject.clone(), data)
            .await
            .map_err(|e| Error::Publish {
                subject: subject.clone(),
                source: Box::new(e),
            })?;
        match tokio::time::timeout(self.ack_timeout, ack.into_future()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::Publish {
                subject,
                source: Box::new(e),
            }),
            Err(_) => Err(Error::PublishAckTimeout(subject)),
        }
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>> {
        self.subscribe_consumer(subject, None, handler, opts).await
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>> {
        if queue.is_empty() {
            return self.subscribe_consumer(subject, None, handler, opts).await;
        }
        self.subscribe_consumer(subject, Some(queue), handler, opts)
            .await
    }

    #[instrument(level = "debug", skip(self), fields(stream = %self.prefix))]
    async fn close(&self) -> Result<()> {
        self.lost.disarm();
        self.closed.store(true, Ordering::SeqCst);
        self.pub_acks.close();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        // Drains every subscription and shuts the client down, including the handles cloned
        // into subscriptions
        self.client
            .drain()
            .await
            .map_err(|e| Error::Other(Box::new(e)))
    }
}

/// A pull consumer and the task delivering its messages
struct JetStreamSubscription {
    stream: stream::Stream,
    consumer: String,
    subject: String,
    /// Queue groups without a durable name share their consumer, which the server removes
    /// once no member pulls from it
    remove_on_unsubscribe: bool,
    durable: bool,
    task: AbortHandle,
    removed: AtomicBool,
}

impl JetStreamSubscription {
    async fn delete_consumer(&self) -> Result<()> {
        if self.removed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.stream.delete_consumer(&self.consumer).await {
            self.removed.store(false, Ordering::SeqCst);
            return Err(Error::Subscription {
                subject: self.subject.clone(),
                source: Box::new(e),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Subscription for JetStreamSubscription {
    #[instrument(level = "debug", skip(self), fields(subject = %self.subject, consumer = %self.consumer))]
    async fn unsubscribe(&self) -> Result<()> {
        self.task.abort();
        if self.remove_on_unsubscribe {
            self.delete_consumer().await?;
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(subject = %self.subject, consumer = %self.consumer))]
    async fn close(&self) -> Result<()> {
        self.task.abort();
        if !self.durable && self.remove_on_unsubscribe {
            self.delete_consumer().await?;
        }
        Ok(())
    }
}

/// Acks a JetStream message
struct JetStreamAcker(jetstream::Message);

#[async_trait]
impl Acker for JetStreamAcker {
    async fn ack(&self) -> Result<()> {
        self.0.ack().await.map_err(Error::Ack)
    }
}

fn delivered_msg(prefix: &str, message: jetstream::Message) -> Msg {
    let subject = strip_prefix(prefix, message.subject.as_str()).to_string();
    let data = message.payload.clone();
    let info = message
        .info()
        .map(|info| (info.stream_sequence, info.delivered > 1, info.published))
        .ok();
    let msg = Msg::new(subject, data, Arc::new(JetStreamAcker(message)));
    match info {
        Some((sequence, redelivered, published)) => msg
            .with_sequence(sequence)
            .with_redelivered(redelivered)
            .with_timestamp(SystemTime::from(published)),
        None => msg,
    }
}

/// Stream name for a cluster ID. Stream names may not contain whitespace, subject separators,
/// wildcards or path separators.
pub fn stream_name(cluster_id: &str) -> Result<String> {
    let name = sanitize(cluster_id);
    if name.is_empty() || name.chars().all(|c| c == '_') {
        return Err(Error::InvalidClusterId(cluster_id.to_string()));
    }
    Ok(name)
}

/// Consumer name for a subscription on `channel`. Queue groups and durable names are scoped to
/// their channel, and durable groups are kept apart from non-durable ones with the same name.
fn consumer_name(channel: &str, queue: Option<&str>, durable_name: Option<&str>) -> Option<String> {
    let channel = sanitize(channel);
    let durable_name = durable_name.filter(|name| !name.is_empty());
    match (queue, durable_name) {
        (Some(queue), Some(durable)) => Some(format!(
            "durable-queue_{channel}_{}_{}",
            sanitize(durable),
            sanitize(queue)
        )),
        (Some(queue), None) => Some(format!("queue_{channel}_{}", sanitize(queue))),
        (None, Some(durable)) => Some(format!("{channel}_{}", sanitize(durable))),
        (None, None) => None,
    }
}

/// Reject an existing consumer filtering on another subject than the one subscribed to
fn ensure_filter(subject: &str, consumer: &str, bound: &str, wanted: &str) -> Result<()> {
    if bound == wanted {
        return Ok(());
    }
    Err(Error::Subscription {
        subject: subject.to_string(),
        source: format!("consumer `{consumer}` already filters on `{bound}`").into(),
    })
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_whitespace() || matches!(c, '.' | '*' | '>' | '/' | '\\') {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn channel_subject(prefix: &str, channel: &str) -> String {
    format!("{prefix}.{channel}")
}

fn strip_prefix<'a>(prefix: &str, subject: &'a str) -> &'a str {
    subject
        .strip_prefix(prefix)
        .and_then(|s| s.strip_prefix('.'))
        .unwrap_or(subject)
}

fn deliver_policy(start_at: StartPosition) -> DeliverPolicy {
    match start_at {
        StartPosition::NewOnly => DeliverPolicy::New,
        StartPosition::LastReceived => DeliverPolicy::Last,
        StartPosition::First => DeliverPolicy::All,
        StartPosition::Sequence(start_sequence) => DeliverPolicy::ByStartSequence { start_sequence },
        StartPosition::Time(at) => DeliverPolicy::ByStartTime {
            start_time: time::OffsetDateTime::from(at),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case("test-cluster", "test-cluster"; "plain")]
    #[test_case("my.cluster", "my_cluster"; "dotted")]
    #[test_case("a b/c", "a_b_c"; "space and slash")]
    #[test_case("events>*", "events__"; "wildcards")]
    fn test_stream_name(cluster_id: &str, expected: &str) {
        assert_eq!(stream_name(cluster_id).unwrap(), expected);
    }

    #[test_case(""; "empty")]
    #[test_case("..."; "only separators")]
    fn test_stream_name_invalid(cluster_id: &str) {
        assert!(matches!(
            stream_name(cluster_id),
            Err(Error::InvalidClusterId(id)) if id == cluster_id
        ));
    }

    #[test]
    fn test_consumer_names() {
        assert_eq!(consumer_name("orders", None, None), None);
        assert_eq!(consumer_name("orders", None, Some("")), None);
        assert_eq!(
            consumer_name("orders", None, Some("svc")).as_deref(),
            Some("orders_svc")
        );
        assert_eq!(
            consumer_name("orders", Some("workers"), None).as_deref(),
            Some("queue_orders_workers")
        );
        assert_eq!(
            consumer_name("orders", Some("workers"), Some("svc")).as_deref(),
            Some("durable-queue_orders_svc_workers")
        );
        assert_eq!(
            consumer_name("orders.created", Some("a.b"), None).as_deref(),
            Some("queue_orders_created_a_b")
        );
    }

    #[test_case(Some("workers"), None; "queue group")]
    #[test_case(None, Some("svc"); "durable")]
    #[test_case(Some("workers"), Some("svc"); "durable queue group")]
    fn test_consumer_names_scoped_to_channel(queue: Option<&str>, durable: Option<&str>) {
        let orders = consumer_name("orders", queue, durable);
        let payments = consumer_name("payments", queue, durable);
        assert!(orders.is_some());
        assert_ne!(orders, payments);
    }

    #[test]
    fn test_ensure_filter() {
        ensure_filter("orders", "queue_orders_workers", "c.orders", "c.orders").unwrap();
        let err = ensure_filter("orders", "queue_orders_workers", "c.payments", "c.orders")
            .unwrap_err();
        assert!(matches!(err, Error::Subscription { ref subject, .. } if subject == "orders"));
        assert!(err.to_string().contains("c.payments"), "{err}");
    }

    fn counting_signal() -> (LostSignal, Arc<std::sync::atomic::AtomicUsize>) {
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handler: ConnectionLostHandler = Arc::new({
            let fired = Arc::clone(&fired);
            move |err: Error| {
                assert!(matches!(err, Error::ConnectionLost(_)));
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });
        let signal = LostSignal {
            fired: Arc::default(),
            handler: Some(handler),
            nats_url: "nats://127.0.0.1:4222".into(),
        };
        (signal, fired)
    }

    #[test]
    fn test_transient_disconnect_keeps_connection() {
        let (signal, fired) = counting_signal();
        signal.observe(&Event::Disconnected);
        signal.observe(&Event::Connected);
        signal.observe(&Event::Disconnected);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        signal.observe(&Event::ClientError(ClientError::MaxReconnects));
        signal.observe(&Event::Closed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closing_does_not_report_loss() {
        let (signal, fired) = counting_signal();
        signal.disarm();
        signal.observe(&Event::Closed);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_channel_subjects() {
        let subject = channel_subject("cluster", "orders.created");
        assert_eq!(subject, "cluster.orders.created");
        assert_eq!(strip_prefix("cluster", &subject), "orders.created");
        assert_eq!(strip_prefix("cluster", "other.orders"), "other.orders");
    }

    #[test]
    fn test_deliver_policy() {
        assert_eq!(deliver_policy(StartPosition::NewOnly), DeliverPolicy::New);
        assert_eq!(deliver_policy(StartPosition::First), DeliverPolicy::All);
        assert_eq!(
            deliver_policy(StartPosition::LastReceived),
            DeliverPolicy::Last
        );
        assert_eq!(
            deliver_policy(StartPosition::Sequence(7)),
            DeliverPolicy::ByStartSequence { start_sequence: 7 }
        );
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            deliver_policy(StartPosition::Time(at)),
            DeliverPolicy::ByStartTime {
                start_time: time::OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
            }
        );
    }
}
