use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::{Broker, Options};

/// Constructor registered for a broker backend
pub type Factory = fn(Options) -> Arc<dyn Broker>;

/// Table of broker backends, looked up by name.
///
/// Backends expose a `register` function adding themselves under their name, so a host can
/// pick a broker from configuration without depending on it directly.
#[derive(Clone, Default)]
pub struct Registry {
    factories: BTreeMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any backend previously registered under the same name
    pub fn register(&mut self, name: impl Into<String>, factory: Factory) {
        let name = name.into();
        debug!(%name, "registering broker");
        self.factories.insert(name, factory);
    }

    /// Build the broker registered under `name`
    pub fn build(&self, name: &str, options: Options) -> Option<Arc<dyn Broker>> {
        self.factories.get(name).map(|factory| factory(options))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Names of all registered backends, in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod test {
    use core::fmt;

    use async_trait::async_trait;

    use super::*;
    use crate::{Handler, Message, PublishOptions, Result, SubscribeOptions, Subscriber};

    struct Noop(Options);

    impl fmt::Display for Noop {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("noop")
        }
    }

    #[async_trait]
    impl Broker for Noop {
        async fn init(&self, _options: Options) -> Result<()> {
            Ok(())
        }

        async fn options(&self) -> Options {
            self.0.clone()
        }

        async fn address(&self) -> String {
            self.0.addrs.first().cloned().unwrap_or_default()
        }

        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn publish(&self, _topic: &str, _msg: &Message, _opts: PublishOptions) -> Result<()> {
            Ok(())
        }

        async fn subscribe(
            &self,
            _topic: &str,
            _handler: Handler,
            _opts: SubscribeOptions,
        ) -> Result<Box<dyn Subscriber>> {
            Err(crate::Error::NotConnected)
        }
    }

    fn noop(options: Options) -> Arc<dyn Broker> {
        Arc::new(Noop(options))
    }

    #[tokio::test]
    async fn test_register_and_build() {
        let mut registry = Registry::new();
        assert!(registry.build("noop", Options::default()).is_none());

        registry.register("noop", noop);
        assert!(registry.contains("noop"));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["noop"]);

        let broker = registry
            .build("noop", Options::new().addrs(["nats://a:4222"]))
            .expect("noop should be registered");
        assert_eq!(broker.to_string(), "noop");
        assert_eq!(broker.address().await, "nats://a:4222");
    }
}
