//! The generic message-broker interface.
//!
//! A [`Broker`] connects to some messaging backend, publishes [`Message`]s to topics and
//! delivers messages arriving on subscribed topics to a [`Handler`]. Backends are
//! interchangeable: the host only ever holds an `Arc<dyn Broker>`, usually obtained from a
//! [`Registry`] by name.

use core::fmt;
use core::future::Future;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

mod codec;
mod context;
mod error;
mod message;
mod options;
mod registry;

pub use codec::{Codec, CodecError, JsonCodec};
pub use context::Context;
pub use error::{Error, Result};
pub use message::Message;
pub use options::{Options, PublishOptions, SubscribeOptions};
pub use registry::{Factory, Registry};

/// A message delivered to a subscription
#[async_trait]
pub trait Publication: Send + Sync {
    /// Topic the message was received on
    fn topic(&self) -> &str;

    /// The decoded message
    fn message(&self) -> &Message;

    /// Acknowledge the message
    async fn ack(&self) -> Result<()>;
}

/// A live subscription returned by [`Broker::subscribe`]
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn topic(&self) -> &str;

    /// The options the subscription was created with, as resolved by the backend
    fn options(&self) -> &SubscribeOptions;

    /// Stop receiving messages on this subscription
    async fn unsubscribe(&self) -> Result<()>;
}

/// Callback invoked once per delivered message.
///
/// Returning an error marks the message as not handled; backends that acknowledge on success
/// will leave such messages unacknowledged.
pub type Handler =
    Arc<dyn Fn(Box<dyn Publication>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Build a [`Handler`] from an async closure
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Box<dyn Publication>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |publication| Box::pin(f(publication)))
}

/// A pluggable message broker.
///
/// The [`Display`](fmt::Display) implementation yields the backend name.
#[async_trait]
pub trait Broker: fmt::Display + Send + Sync {
    /// Replace the broker options
    async fn init(&self, options: Options) -> Result<()>;

    /// Current broker options
    async fn options(&self) -> Options;

    /// Address of the server the broker connects to
    async fn address(&self) -> String;

    /// Establish the connection to the backend
    async fn connect(&self) -> Result<()>;

    /// Tear the connection down
    async fn disconnect(&self) -> Result<()>;

    /// Publish a message to a topic
    async fn publish(&self, topic: &str, msg: &Message, opts: PublishOptions) -> Result<()>;

    /// Subscribe to a topic, delivering each message to `handler`
    async fn subscribe(
        &self,
        topic: &str,
        handler: Handler,
        opts: SubscribeOptions,
    ) -> Result<Box<dyn Subscriber>>;
}
