use core::fmt;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Acknowledges a single delivered message to the server
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<()>;
}

/// A message delivered to a subscription
#[derive(Clone)]
pub struct Msg {
    /// Channel the message was published on
    pub subject: String,
    pub data: Bytes,
    /// Server-assigned sequence number within the channel
    pub sequence: u64,
    /// Whether the server delivered this message before
    pub redelivered: bool,
    /// When the message was stored by the server
    pub timestamp: Option<SystemTime>,
    acker: Arc<dyn Acker>,
}

impl Msg {
    pub fn new(subject: impl Into<String>, data: impl Into<Bytes>, acker: Arc<dyn Acker>) -> Self {
        Self {
            subject: subject.into(),
            data: data.into(),
            sequence: 0,
            redelivered: false,
            timestamp: None,
            acker,
        }
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    #[must_use]
    pub fn with_redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Acknowledge the message, so the server will not redeliver it
    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msg")
            .field("subject", &self.subject)
            .field("data_len", &self.data.len())
            .field("sequence", &self.sequence)
            .field("redelivered", &self.redelivered)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}
