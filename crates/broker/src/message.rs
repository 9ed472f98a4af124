use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A message exchanged through a [`Broker`](crate::Broker).
///
/// The field names serialize as `Header` and `Body`, with the body encoded as base64, so
/// payloads stay readable by other services speaking the same JSON envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    /// Free-form string metadata
    #[serde(default)]
    pub header: HashMap<String, String>,
    /// Opaque payload
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

impl Message {
    /// Create a message with the given body and no headers
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            header: HashMap::new(),
            body: body.into(),
        }
    }

    /// Add a header, returning the updated message
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        // a JSON `null` body is what the host framework emits for an empty slice
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}
