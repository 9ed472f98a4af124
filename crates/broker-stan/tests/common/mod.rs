//! In-process streaming client recording every call made through it

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use stan_client::{
    Acker, Connection, Connector, Error, Msg, MsgHandler, Options, Result, Subscription,
    SubscriptionOption,
};
use tokio::sync::Notify;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Connect {
        cluster_id: String,
        client_id: String,
    },
    Publish {
        subject: String,
        data: Bytes,
    },
    Subscribe {
        subject: String,
        queue: Option<String>,
        opts: Vec<SubscriptionOption>,
    },
    Unsubscribe(String),
    CloseSubscription(String),
    CloseConnection,
    Ack(u64),
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<Call>>,
    /// Remaining connection attempts that fail
    failures: AtomicUsize,
    handlers: Mutex<Vec<MsgHandler>>,
    options: Mutex<Vec<Options>>,
    /// Connection closes wait on this until notified
    close_gate: Mutex<Option<Arc<Notify>>>,
}

impl Shared {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Connector handing out [`MockConnection`]s
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose first `n` connection attempts fail
    pub fn failing(n: usize) -> Self {
        let connector = Self::default();
        connector.shared.failures.store(n, Ordering::SeqCst);
        connector
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Connect { client_id, .. } => Some(client_id),
                _ => None,
            })
            .collect()
    }

    /// Connect attempts so far, successful or not
    pub fn attempts(&self) -> usize {
        self.connects().len()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Client options passed to the most recent connection attempt
    pub fn last_options(&self) -> Option<Options> {
        self.shared.options.lock().unwrap().last().cloned()
    }

    /// Deliver `data` to the most recent subscription as message number `sequence`
    pub async fn deliver(&self, subject: &str, data: impl Into<Bytes>, sequence: u64) {
        let handler = self
            .shared
            .handlers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no subscription to deliver to");
        let acker = Arc::new(MockAcker {
            shared: Arc::clone(&self.shared),
            sequence,
        });
        handler(Msg::new(subject, data, acker).with_sequence(sequence)).await;
    }

    /// Hold every connection close until the returned gate is notified
    pub fn hold_close(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.shared.close_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Fire the connection-lost handler of the most recent connection
    pub fn lose_connection(&self) {
        let handler = self
            .last_options()
            .and_then(|opts| opts.connection_lost_handler)
            .expect("no connection lost handler installed");
        handler(Error::ConnectionLost("nats://127.0.0.1:4222".into()));
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        opts: Options,
    ) -> Result<Arc<dyn Connection>> {
        self.shared.record(Call::Connect {
            cluster_id: cluster_id.to_string(),
            client_id: client_id.to_string(),
        });
        self.shared.options.lock().unwrap().push(opts.clone());
        let failed = self
            .shared
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::Connect {
                url: opts.nats_url,
                source: "connection refused".into(),
            });
        }
        Ok(Arc::new(MockConnection {
            shared: Arc::clone(&self.shared),
        }))
    }
}

pub struct MockConnection {
    shared: Arc<Shared>,
}

impl MockConnection {
    fn subscribe_inner(
        &self,
        subject: &str,
        queue: Option<&str>,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>> {
        self.shared.record(Call::Subscribe {
            subject: subject.to_string(),
            queue: queue.map(String::from),
            opts: opts.to_vec(),
        });
        self.shared.handlers.lock().unwrap().push(handler);
        Ok(Box::new(MockSubscription {
            shared: Arc::clone(&self.shared),
            subject: subject.to_string(),
        }))
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn publish(&self, subject: &str, data: Bytes) -> Result<()> {
        self.shared.record(Call::Publish {
            subject: subject.to_string(),
            data,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>> {
        self.subscribe_inner(subject, None, handler, opts)
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
        handler: MsgHandler,
        opts: &[SubscriptionOption],
    ) -> Result<Box<dyn Subscription>> {
        self.subscribe_inner(subject, Some(queue), handler, opts)
    }

    async fn close(&self) -> Result<()> {
        let gate = self.shared.close_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.shared.record(Call::CloseConnection);
        Ok(())
    }
}

struct MockSubscription {
    shared: Arc<Shared>,
    subject: String,
}

#[async_trait]
impl Subscription for MockSubscription {
    async fn unsubscribe(&self) -> Result<()> {
        self.shared.record(Call::Unsubscribe(self.subject.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shared
            .record(Call::CloseSubscription(self.subject.clone()));
        Ok(())
    }
}

struct MockAcker {
    shared: Arc<Shared>,
    sequence: u64,
}

#[async_trait]
impl Acker for MockAcker {
    async fn ack(&self) -> Result<()> {
        self.shared.record(Call::Ack(self.sequence));
        Ok(())
    }
}
