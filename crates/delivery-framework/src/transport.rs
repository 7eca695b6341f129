//! # Transport Traits
//!
//! The pipeline never talks to a concrete broker. It needs four capabilities,
//! each a trait here:
//!
//! - [`Publisher`]: fire-and-forget publish to a queue.
//! - [`Requester`]: publish and get a receiver for the correlated reply.
//! - [`Channel`]: settle a delivery and send replies.
//! - [`Subscriber`]: start consuming a queue.
//!
//! [`BrokerClient`](crate::BrokerClient) implements all of them against the
//! in-process broker, and [`MockTransport`](crate::mock::MockTransport)
//! implements the first three for tests.
//!
//! # Example
//!
//! ```rust
//! use delivery_framework::{BrokerActor, Publisher, Subscriber};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, client) = BrokerActor::new(16, None);
//!     tokio::spawn(actor.run());
//!
//!     client.publish("orders_queue", "order-placed", json!({"email": "ok@x.com"})).await.unwrap();
//!
//!     let mut deliveries = client.subscribe("orders_queue").await.unwrap();
//!     let delivery = deliveries.recv().await.unwrap();
//!     assert_eq!(delivery.envelope.pattern, "order-placed");
//!     delivery.handle.ack().await.unwrap();
//! }
//! ```

use crate::delivery::{Delivery, Reply};
use crate::error::BrokerError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` under `pattern` to `queue` without expecting a reply.
    async fn publish(&self, queue: &str, pattern: &str, payload: Value)
        -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Requester: Publisher {
    /// Publish a request and return the receiver its reply will arrive on.
    ///
    /// Dropping the receiver abandons the request; a late reply is discarded.
    async fn send(
        &self,
        queue: &str,
        pattern: &str,
        payload: Value,
    ) -> Result<oneshot::Receiver<Reply>, BrokerError>;
}

#[async_trait]
pub trait Channel: Send + Sync {
    async fn ack(&self, tag: u64) -> Result<(), BrokerError>;

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError>;

    /// Route `reply` to whoever sent the request with `correlation_id`.
    async fn reply(&self, correlation_id: u64, reply: Reply) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Become the consumer of `queue`.
    async fn subscribe(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<Delivery>, BrokerError>;
}
