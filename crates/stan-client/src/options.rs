use core::fmt;
use core::time::Duration;

use std::sync::Arc;

use crate::Error;

pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";
pub const DEFAULT_CONNECT_WAIT: Duration = Duration::from_secs(2);
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_PUB_ACKS_INFLIGHT: usize = 16384;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RECONNECTS: usize = 60;

/// Invoked once an established connection is gone for good, after the client gave up
/// reconnecting. Short outages the client recovers from do not trigger it.
pub type ConnectionLostHandler = Arc<dyn Fn(Error) + Send + Sync>;

/// Connection settings
#[derive(Clone)]
pub struct Options {
    /// Comma-separated list of server URLs
    pub nats_url: String,
    /// How long to wait for the initial connection
    pub connect_timeout: Duration,
    /// How long to wait for the server to acknowledge a publish
    pub ack_timeout: Duration,
    /// Maximum number of published messages awaiting an ack
    pub max_pub_acks_inflight: usize,
    /// Interval between client pings
    pub ping_interval: Duration,
    /// Consecutive failed reconnects after which the connection counts as lost
    pub max_reconnects: usize,
    /// JetStream domain to bind to, if not the local one
    pub js_domain: Option<String>,
    pub connection_lost_handler: Option<ConnectionLostHandler>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_WAIT,
            ack_timeout: DEFAULT_ACK_WAIT,
            max_pub_acks_inflight: DEFAULT_MAX_PUB_ACKS_INFLIGHT,
            ping_interval: DEFAULT_PING_INTERVAL,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            js_domain: None,
            connection_lost_handler: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("nats_url", &self.nats_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("ack_timeout", &self.ack_timeout)
            .field("max_pub_acks_inflight", &self.max_pub_acks_inflight)
            .field("ping_interval", &self.ping_interval)
            .field("max_reconnects", &self.max_reconnects)
            .field("js_domain", &self.js_domain)
            .field(
                "connection_lost_handler",
                &self.connection_lost_handler.as_ref().map(|_| ".."),
            )
            .finish()
    }
}

impl Options {
    /// Server URLs, split out of [`Options::nats_url`]
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.nats_url
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_urls_split_and_trimmed() {
        let opts = Options {
            nats_url: "nats://a:4222, nats://b:4222,,".into(),
            ..Default::default()
        };
        assert_eq!(
            opts.urls().collect::<Vec<_>>(),
            ["nats://a:4222", "nats://b:4222"]
        );
    }

    #[test]
    fn test_debug_hides_handler() {
        let opts = Options {
            connection_lost_handler: Some(Arc::new(|_: Error| {})),
            ..Default::default()
        };
        let out = format!("{opts:?}");
        assert!(out.contains("connection_lost_handler: Some(\"..\")"));
        assert!(out.contains(DEFAULT_NATS_URL));
    }
}
