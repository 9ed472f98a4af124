use core::time::Duration;

use std::time::SystemTime;

use crate::{Error, Result};

pub const DEFAULT_MAX_INFLIGHT: usize = 1024;
pub const DEFAULT_SUBSCRIPTION_ACK_WAIT: Duration = Duration::from_secs(30);

/// Where a new subscription starts reading the channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// Only messages published after the subscription was created
    #[default]
    NewOnly,
    /// The last message published, then everything after it
    LastReceived,
    /// Messages published at or after the given time
    Time(SystemTime),
    /// Messages starting at the given sequence number
    Sequence(u64),
    /// Every message still stored on the channel
    First,
}

/// Resolved subscription settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Durable subscriptions keep their position on the server across client restarts
    pub durable_name: Option<String>,
    /// Maximum number of unacknowledged messages the server sends
    pub max_inflight: usize,
    /// How long the server waits for an ack before redelivering
    pub ack_wait: Duration,
    pub start_at: StartPosition,
    /// When set, acknowledging is left to the application
    pub manual_acks: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            durable_name: None,
            max_inflight: DEFAULT_MAX_INFLIGHT,
            ack_wait: DEFAULT_SUBSCRIPTION_ACK_WAIT,
            start_at: StartPosition::NewOnly,
            manual_acks: false,
        }
    }
}

impl SubscriptionOptions {
    /// Apply `opts` in order on top of the defaults
    pub fn from_options<'a>(opts: impl IntoIterator<Item = &'a SubscriptionOption>) -> Result<Self> {
        let mut resolved = Self::default();
        for opt in opts {
            opt.apply(&mut resolved)?;
        }
        Ok(resolved)
    }

    /// Whether the subscription carries a (non-empty) durable name
    pub fn is_durable(&self) -> bool {
        self.durable_name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// A single subscription setting, applied to [`SubscriptionOptions`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionOption {
    DurableName(String),
    MaxInflight(usize),
    AckWait(Duration),
    StartAtSequence(u64),
    StartAtTime(SystemTime),
    /// Start at the time this far in the past
    StartAtTimeDelta(Duration),
    StartWithLastReceived,
    DeliverAllAvailable,
    ManualAckMode,
}

impl SubscriptionOption {
    pub fn apply(&self, opts: &mut SubscriptionOptions) -> Result<()> {
        match self {
            Self::DurableName(name) => {
                validate_name(name)?;
                opts.durable_name = Some(name.clone());
            }
            Self::MaxInflight(0) => {
                return Err(Error::InvalidSubscriptionOption(
                    "max inflight must be greater than zero".into(),
                ))
            }
            Self::MaxInflight(n) => opts.max_inflight = *n,
            Self::AckWait(wait) if *wait < Duration::from_secs(1) => {
                return Err(Error::InvalidSubscriptionOption(format!(
                    "ack wait must be at least 1s, got {wait:?}"
                )))
            }
            Self::AckWait(wait) => opts.ack_wait = *wait,
            Self::StartAtSequence(seq) => opts.start_at = StartPosition::Sequence(*seq),
            Self::StartAtTime(at) => opts.start_at = StartPosition::Time(*at),
            Self::StartAtTimeDelta(delta) => {
                let at = SystemTime::now().checked_sub(*delta).ok_or_else(|| {
                    Error::InvalidSubscriptionOption(format!("start time delta {delta:?} too large"))
                })?;
                opts.start_at = StartPosition::Time(at);
            }
            Self::StartWithLastReceived => opts.start_at = StartPosition::LastReceived,
            Self::DeliverAllAvailable => opts.start_at = StartPosition::First,
            Self::ManualAckMode => opts.manual_acks = true,
        }
        Ok(())
    }
}

/// Names become server-side identifiers, which cannot contain whitespace, subject separators
/// or wildcards
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidSubscriptionOption(
            "durable name must not be empty".into(),
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '.' | '*' | '>' | '/' | '\\'))
    {
        return Err(Error::InvalidSubscriptionOption(format!(
            "durable name `{name}` contains invalid character {c:?}"
        )));
    }
    Ok(())
}
