use async_trait::async_trait;
use broker_core::{Error, Message, Publication, Result};
use stan_client::Msg;

/// A decoded message delivered through a streaming subscription
pub struct StanPublication {
    pub(crate) topic: String,
    pub(crate) message: Message,
    pub(crate) msg: Msg,
}

impl StanPublication {
    /// The client message the publication was decoded from
    pub fn msg(&self) -> &Msg {
        &self.msg
    }
}

#[async_trait]
impl Publication for StanPublication {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn message(&self) -> &Message {
        &self.message
    }

    async fn ack(&self) -> Result<()> {
        self.msg.ack().await.map_err(Error::client)
    }
}
