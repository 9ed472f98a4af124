//! Streaming-specific settings, carried in the [`Context`] of the generic broker options.
//!
//! Each setting is a distinct type stored in the context. The extension traits add builder
//! methods for them to [`Options`] and [`SubscribeOptions`].

use core::time::Duration;

use broker_core::{Context, Options, SubscribeOptions};
use stan_client::SubscriptionOption;

/// Streaming cluster to connect to. Required by [`connect`](broker_core::Broker::connect).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterId(pub String);

/// Re-establish the connection when it is lost
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reconnect(pub bool);

/// Give up connecting after this long. [`Duration::ZERO`] retries until disconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectTimeout(pub Duration);

/// Client connection options to start from
#[derive(Clone, Debug)]
pub struct ClientOptions(pub stan_client::Options);

/// Extra options for a subscription
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionOptionList(pub Vec<SubscriptionOption>);

/// Acknowledge a message only once the handler returned successfully
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckOnSuccess(pub bool);

/// Context whose values take the place of the subscribe options' own context
#[derive(Clone, Debug)]
pub struct SubscribeContext(pub Context);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub trait StanOptionsExt: Sized {
    #[must_use]
    fn cluster_id(self, id: impl Into<String>) -> Self;

    #[must_use]
    fn reconnect(self, reconnect: bool) -> Self;

    #[must_use]
    fn connect_timeout(self, timeout: Duration) -> Self;

    #[must_use]
    fn client_options(self, opts: stan_client::Options) -> Self;
}

impl StanOptionsExt for Options {
    fn cluster_id(self, id: impl Into<String>) -> Self {
        self.with_value(ClusterId(id.into()))
    }

    fn reconnect(self, reconnect: bool) -> Self {
        self.with_value(Reconnect(reconnect))
    }

    fn connect_timeout(self, timeout: Duration) -> Self {
        self.with_value(ConnectTimeout(timeout))
    }

    fn client_options(self, opts: stan_client::Options) -> Self {
        self.with_value(ClientOptions(opts))
    }
}

pub trait StanSubscribeOptionsExt: Sized {
    /// Add a client subscription option, keeping the ones already set
    #[must_use]
    fn subscription_option(self, opt: SubscriptionOption) -> Self;

    #[must_use]
    fn durable_name(self, name: impl Into<String>) -> Self {
        self.subscription_option(SubscriptionOption::DurableName(name.into()))
    }

    #[must_use]
    fn ack_on_success(self) -> Self;

    #[must_use]
    fn subscribe_context(self, ctx: Context) -> Self;
}

impl StanSubscribeOptionsExt for SubscribeOptions {
    fn subscription_option(mut self, opt: SubscriptionOption) -> Self {
        let mut list = self
            .context
            .value::<SubscriptionOptionList>()
            .cloned()
            .unwrap_or_default();
        list.0.push(opt);
        self.context.insert(list);
        self
    }

    fn ack_on_success(self) -> Self {
        self.with_value(AckOnSuccess(true))
    }

    fn subscribe_context(self, ctx: Context) -> Self {
        self.with_value(SubscribeContext(ctx))
    }
}

/// The context subscription settings are read from
pub(crate) fn subscribe_context(opts: &SubscribeOptions) -> &Context {
    opts.context
        .value::<SubscribeContext>()
        .map_or(&opts.context, |SubscribeContext(ctx)| ctx)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_options_ext() {
        let opts = Options::new()
            .cluster_id("test-cluster")
            .reconnect(true)
            .connect_timeout(Duration::from_secs(1));
        assert_eq!(
            opts.context.value::<ClusterId>(),
            Some(&ClusterId("test-cluster".into()))
        );
        assert_eq!(opts.context.value::<Reconnect>(), Some(&Reconnect(true)));
        assert_eq!(
            opts.context.value::<ConnectTimeout>(),
            Some(&ConnectTimeout(Duration::from_secs(1)))
        );
    }

    #[test]
    fn test_subscription_options_accumulate() {
        let opts = SubscribeOptions::new()
            .durable_name("orders")
            .subscription_option(SubscriptionOption::DeliverAllAvailable)
            .ack_on_success();
        assert_eq!(
            opts.context.value::<SubscriptionOptionList>(),
            Some(&SubscriptionOptionList(vec![
                SubscriptionOption::DurableName("orders".into()),
                SubscriptionOption::DeliverAllAvailable,
            ]))
        );
        assert_eq!(
            opts.context.value::<AckOnSuccess>(),
            Some(&AckOnSuccess(true))
        );
    }

    #[test]
    fn test_subscribe_context_overrides() {
        let opts = SubscribeOptions::new().durable_name("ignored");
        assert!(subscribe_context(&opts)
            .value::<SubscriptionOptionList>()
            .is_some());

        let opts = opts.subscribe_context(Context::new().with_value(AckOnSuccess(true)));
        let ctx = subscribe_context(&opts);
        assert!(ctx.value::<SubscriptionOptionList>().is_none());
        assert_eq!(ctx.value::<AckOnSuccess>(), Some(&AckOnSuccess(true)));
    }
}
