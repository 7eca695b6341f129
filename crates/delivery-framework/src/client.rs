//! # Broker Client
//!
//! The client half of the in-process broker.

use crate::broker::BrokerStats;
use crate::delivery::{Delivery, Envelope, Reply};
use crate::error::BrokerError;
use crate::message::BrokerRequest;
use crate::transport::{Channel, Publisher, Requester, Subscriber};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// A handle for talking to a [`BrokerActor`](crate::BrokerActor).
///
/// Every call sends one [`BrokerRequest`] over a Tokio mpsc channel and awaits
/// the outcome on a oneshot channel. The client holds only a sender, so it is
/// cheap to clone and share across tasks.
#[derive(Clone, Debug)]
pub struct BrokerClient {
    sender: mpsc::Sender<BrokerRequest>,
}

impl BrokerClient {
    pub fn new(sender: mpsc::Sender<BrokerRequest>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, BrokerError>>) -> BrokerRequest,
    ) -> Result<T, BrokerError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| BrokerError::BrokerClosed)?;
        response.await.map_err(|_| BrokerError::BrokerDropped)?
    }

    pub async fn stats(&self) -> Result<BrokerStats, BrokerError> {
        self.call(|respond_to| BrokerRequest::Stats { respond_to })
            .await
    }

    /// Ask the broker to stop. Outstanding clients see [`BrokerError::BrokerClosed`] afterwards.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(BrokerRequest::Shutdown).await;
    }
}

#[async_trait]
impl Publisher for BrokerClient {
    async fn publish(
        &self,
        queue: &str,
        pattern: &str,
        payload: Value,
    ) -> Result<(), BrokerError> {
        let queue = queue.to_string();
        let envelope = Envelope::event(pattern, payload);
        self.call(|respond_to| BrokerRequest::Publish {
            queue,
            envelope,
            respond_to,
        })
        .await
    }
}

#[async_trait]
impl Requester for BrokerClient {
    async fn send(
        &self,
        queue: &str,
        pattern: &str,
        payload: Value,
    ) -> Result<oneshot::Receiver<Reply>, BrokerError> {
        let (reply_to, reply) = oneshot::channel();
        let queue = queue.to_string();
        let pattern = pattern.to_string();
        self.call(|respond_to| BrokerRequest::Send {
            queue,
            pattern,
            payload,
            reply_to,
            respond_to,
        })
        .await?;
        Ok(reply)
    }
}

#[async_trait]
impl Channel for BrokerClient {
    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        self.call(|respond_to| BrokerRequest::Ack { tag, respond_to })
            .await
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.call(|respond_to| BrokerRequest::Nack {
            tag,
            requeue,
            respond_to,
        })
        .await
    }

    async fn reply(&self, correlation_id: u64, reply: Reply) -> Result<(), BrokerError> {
        self.call(|respond_to| BrokerRequest::Reply {
            correlation_id,
            reply,
            respond_to,
        })
        .await
    }
}

#[async_trait]
impl Subscriber for BrokerClient {
    async fn subscribe(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, BrokerError> {
        let queue = queue.to_string();
        self.call(|respond_to| BrokerRequest::Subscribe { queue, respond_to })
            .await
    }
}
