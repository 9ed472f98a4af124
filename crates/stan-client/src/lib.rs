//! A streaming-messaging client: connections identified by cluster and client ID, acknowledged
//! publishes, and subscriptions that can be durable, queue-grouped and manually acknowledged.
//!
//! The [`Connector`], [`Connection`] and [`Subscription`] traits describe the client. The
//! [`jetstream`] module implements them on top of NATS JetStream.

use core::future::Future;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

mod error;
pub mod jetstream;
mod msg;
mod options;
mod subscription;

pub use error::{Error, Result};
pub use jetstream::JetStreamConnector;
pub use msg::{Acker, Msg};
pub use options::{
    ConnectionLostHandler, Options, DEFAULT_ACK_WAIT, DEFAULT_CONNECT_WAIT,
    DEFAULT_MAX_PUB_ACKS_INFLIGHT, DEFAULT_MAX_RECONNECTS, DEFAULT_NATS_URL, DEFAULT_PING_INTERVAL,
};
pub use subscription::{
    StartPosition, SubscriptionOption, SubscriptionOptions, DEFAULT_MAX_INFLIGHT,
    DEFAULT_SUBSCRIPTION_ACK_WAIT,
};

/// Callback invoked for every message delivered to a subscription.
///
/// In automatic ack mode the message is acknowledged once the returned future completes.
pub type MsgHandler = Arc<dyn Fn(Msg) -> BoxFuture<'static, ()> + Send + Sync>;

/// Build a [`MsgHandler`] from an async closure
pub fn msg_handler<F, Fut>(f: F) -> MsgHandler
where
    F: Fn(Msg) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}

/// Opens connections to a streaming cluster
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the cluster `cluster_id`, identifying as `client_id`
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        opts: Options,
    ) -> Result<Arc<dyn Connection>>;
}

/// An established streaming connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Publish `data` on `subject`, returning once the server has stored it
    async fn publish(&self, subject: &str, data: Bytes) -> Result<()>;

    async fn subscribe(
        &self,
        subject: &str,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>>;

    /// Subscribe as a member of `queue`; each message goes to one member of the group
    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>>;

    /// Close the connection and every subscription made through it
    async fn close(&self) -> Result<()>;
}

/// A subscription on a [`Connection`]
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Remove the subscription from the server. For durable subscriptions this deletes the
    /// stored position as well.
    async fn unsubscribe(&self) -> Result<()>;

    /// Stop delivery to this client. Durable subscriptions keep their server-side state and
    /// can be resumed by subscribing again with the same durable name.
    async fn close(&self) -> Result<()>;
}
