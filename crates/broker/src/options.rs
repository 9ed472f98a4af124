use std::sync::Arc;

use crate::{Codec, Context, JsonCodec};

/// Broker-wide settings
#[derive(Clone, Debug)]
pub struct Options {
    /// Addresses of the servers to connect to
    pub addrs: Vec<String>,
    /// Codec used to encode published and decode delivered messages
    pub codec: Arc<dyn Codec>,
    /// Whether the connection should be secured
    pub secure: bool,
    /// Cancellation and backend-specific settings
    pub context: Context,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            addrs: Vec::new(),
            codec: Arc::new(JsonCodec),
            secure: false,
            context: Context::default(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn addrs<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addrs = addrs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Store a backend-specific value in the options context
    #[must_use]
    pub fn with_value<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.context.insert(value);
        self
    }
}

/// Per-subscription settings
#[derive(Clone, Debug)]
pub struct SubscribeOptions {
    /// Acknowledge messages automatically once the handler has run. When disabled the handler
    /// is expected to call [`Publication::ack`](crate::Publication::ack) itself.
    pub auto_ack: bool,
    /// Queue group to join. Messages are load-balanced across members of the same group.
    pub queue: Option<String>,
    /// Cancellation and backend-specific settings
    pub context: Context,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            auto_ack: true,
            queue: None,
            context: Context::default(),
        }
    }
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable automatic acknowledgement
    #[must_use]
    pub fn disable_auto_ack(mut self) -> Self {
        self.auto_ack = false;
        self
    }

    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Store a backend-specific value in the subscription context
    #[must_use]
    pub fn with_value<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.context.insert(value);
        self
    }
}

/// Per-publish settings
#[derive(Clone, Debug, Default)]
pub struct PublishOptions {
    pub context: Context,
}
