use async_trait::async_trait;
use broker_core::{Error, Result, SubscribeOptions, Subscriber};
use stan_client::Subscription;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// A subscription made through [`StanBroker`](crate::StanBroker)
pub struct StanSubscriber {
    topic: String,
    opts: SubscribeOptions,
    /// Durable subscriptions keep their server-side position when unsubscribed
    durable: bool,
    sub: Mutex<Option<Box<dyn Subscription>>>,
}

impl StanSubscriber {
    pub(crate) fn new(
        topic: String,
        opts: SubscribeOptions,
        durable: bool,
        sub: Box<dyn Subscription>,
    ) -> Self {
        Self {
            topic,
            opts,
            durable,
            sub: Mutex::new(Some(sub)),
        }
    }

    /// Stop delivery without removing the subscription from the server, whether durable or not
    pub async fn close(&self) -> Result<()> {
        let mut sub = self.sub.lock().await;
        if let Some(s) = sub.as_ref() {
            s.close().await.map_err(Error::client)?;
            *sub = None;
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for StanSubscriber {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn options(&self) -> &SubscribeOptions {
        &self.opts
    }

    #[instrument(level = "debug", skip(self), fields(topic = %self.topic, durable = self.durable))]
    async fn unsubscribe(&self) -> Result<()> {
        let mut sub = self.sub.lock().await;
        let Some(s) = sub.as_ref() else {
            return Ok(());
        };
        if !self.durable {
            s.unsubscribe().await.map_err(Error::client)?;
        }
        s.close().await.map_err(Error::client)?;
        *sub = None;
        debug!("unsubscribed");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Counts {
        unsubscribed: AtomicUsize,
        closed: AtomicUsize,
    }

    struct CountingSubscription(Arc<Counts>);

    #[async_trait]
    impl Subscription for CountingSubscription {
        async fn unsubscribe(&self) -> stan_client::Result<()> {
            self.0.unsubscribed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> stan_client::Result<()> {
            self.0.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn subscriber(durable: bool) -> (StanSubscriber, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let sub = StanSubscriber::new(
            "orders".into(),
            SubscribeOptions::default(),
            durable,
            Box::new(CountingSubscription(Arc::clone(&counts))),
        );
        (sub, counts)
    }

    #[tokio::test]
    async fn test_close_keeps_server_state() {
        let (sub, counts) = subscriber(false);
        sub.close().await.unwrap();
        sub.close().await.unwrap();
        sub.unsubscribe().await.unwrap();
        assert_eq!(counts.unsubscribed.load(Ordering::SeqCst), 0);
        assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_by_durability() {
        let (sub, counts) = subscriber(true);
        assert!(sub.durable);
        sub.unsubscribe().await.unwrap();
        assert_eq!(counts.unsubscribed.load(Ordering::SeqCst), 0);
        assert_eq!(counts.closed.load(Ordering::SeqCst), 1);

        let (sub, counts) = subscriber(false);
        sub.unsubscribe().await.unwrap();
        assert_eq!(counts.unsubscribed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
        assert_eq!(sub.topic(), "orders");
    }
}
