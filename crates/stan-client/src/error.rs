pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors produced by the streaming client
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The server could not be reached or refused the connection
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The cluster identifier cannot be used to name server-side resources
    #[error("invalid cluster ID `{0}`")]
    InvalidClusterId(String),
    /// The connection was closed
    #[error("connection closed")]
    ConnectionClosed,
    /// The connection to the server dropped
    #[error("connection to `{0}` lost")]
    ConnectionLost(String),
    /// A subscription option failed validation
    #[error("invalid subscription option: {0}")]
    InvalidSubscriptionOption(String),
    /// The server did not acknowledge a publish in time
    #[error("timed out waiting for publish ack on `{0}`")]
    PublishAckTimeout(String),
    /// Publishing failed
    #[error("failed to publish to `{subject}`: {source}")]
    Publish {
        subject: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Creating or removing a subscription failed
    #[error("subscription on `{subject}` failed: {source}")]
    Subscription {
        subject: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Acknowledging a message failed
    #[error("failed to ack message: {0}")]
    Ack(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Catch-all for failures reported by the server
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}
