//! Message codecs used to put a [`Message`] on the wire and take it back off.

use core::fmt;

use bytes::Bytes;

use crate::Message;

/// Errors produced while encoding or decoding a [`Message`]
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The message could not be encoded
    #[error("failed to marshal message with {codec} codec: {source}")]
    Marshal {
        codec: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The payload could not be decoded into a message
    #[error("failed to unmarshal message with {codec} codec: {source}")]
    Unmarshal {
        codec: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Converts [`Message`]s to and from their wire representation.
pub trait Codec: Send + Sync {
    /// Short identifier of the encoding, e.g. `json`
    fn name(&self) -> &'static str;

    /// Encode a message
    fn marshal(&self, msg: &Message) -> Result<Bytes, CodecError>;

    /// Decode a message
    fn unmarshal(&self, data: &[u8]) -> Result<Message, CodecError>;
}

impl fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Codec").field(&self.name()).finish()
    }
}

/// The default codec, encoding messages as JSON objects
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn marshal(&self, msg: &Message) -> Result<Bytes, CodecError> {
        serde_json::to_vec(msg)
            .map(Bytes::from)
            .map_err(|e| CodecError::Marshal {
                codec: self.name(),
                source: e.into(),
            })
    }

    fn unmarshal(&self, data: &[u8]) -> Result<Message, CodecError> {
        serde_json::from_slice(data).map_err(|e| CodecError::Unmarshal {
            codec: self.name(),
            source: e.into(),
        })
    }
}
