// Type boundary for message consumers built on top of the namespace facade.
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Settlement outcome a [`Handler`] chooses for a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionAction {
    Complete,
    Abandon,
    DeadLetter { reason: Option<String> },
    Defer,
}

/// A received message as seen by a [`Handler`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub id: Option<String>,
    pub body: Bytes,
    pub application_properties: BTreeMap<String, String>,
}

impl Message {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }
}

/// Consumer callback: receives a message and decides how it is settled.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, cancel: &CancellationToken, message: Message) -> DispositionAction;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(CancellationToken, Message) -> Fut + Send + Sync,
    Fut: Future<Output = DispositionAction> + Send,
{
    async fn handle(&self, cancel: &CancellationToken, message: Message) -> DispositionAction {
        (self)(cancel.clone(), message).await
    }
}
