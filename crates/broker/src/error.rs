//! Error types shared by every broker backend

use crate::CodecError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors surfaced by [`Broker`](crate::Broker) operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The broker options are incomplete or contradictory
    #[error("invalid broker configuration: {0}")]
    Config(String),
    /// The operation needs a live connection and there is none
    #[error("not connected")]
    NotConnected,
    /// No connection could be established before the connect timeout elapsed
    #[error("timeout connect to {0:?}")]
    ConnectTimeout(Vec<String>),
    /// Encoding or decoding a message failed
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A subscription option was rejected by the backend
    #[error("invalid subscribe option: {0}")]
    InvalidSubscribeOption(String),
    /// Errors from the underlying messaging client
    #[error("broker client error: {0}")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an error coming from a backend's client library
    pub fn client(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Client(err.into())
    }
}
