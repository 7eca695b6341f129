//! # Delivery Framework
//!
//! Building blocks for consuming messages from a broker with explicit
//! acknowledgment, bounded retries and dead-lettering.
//!
//! ## Architecture Overview
//!
//! The crate separates concerns into four layers:
//!
//! 1. **Task Layer** ([`FallibleTask`], [`WorkItem`]): your business logic, one attempt at a time
//! 2. **Retry Layer** ([`RetryPolicy`], [`TaskExecutor`]): whether and when to try again
//! 3. **Settlement Layer** ([`AckController`], [`DeadLetterRouter`]): how a delivery ends
//! 4. **Transport Layer** ([`BrokerActor`], [`BrokerClient`], [`Consumer`], [`RequestFacade`]): moving messages
//!
//! Business code implements [`FallibleTask`] and never sees a delivery handle.
//! The controller owns the handle and guarantees exactly one settlement per
//! delivery, whatever the task does.
//!
//! ## Delivery Modes
//!
//! | Mode | On success | On failure |
//! |------|------------|------------|
//! | [`DeliveryMode::RetryThenDeadLetter`] | ack | retry with backoff, then dead-letter and ack |
//! | [`DeliveryMode::RequeueOnFailure`] | ack + reply | nack with requeue, reply with the error |
//! | [`DeliveryMode::RetryThenRequeue`] | ack + reply | retry with backoff, then nack with requeue |
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use delivery_framework::{
//!     AckController, BrokerActor, DeadLetterRouter, DeliveryMode, FallibleTask, Publisher,
//!     RetryPolicy, Settlement, Subscriber, TaskError, TaskExecutor, WorkItem,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order { email: String }
//!
//! impl WorkItem for Order {
//!     fn identity(&self) -> &str { &self.email }
//! }
//!
//! struct Intake(Order);
//!
//! #[async_trait]
//! impl FallibleTask for Intake {
//!     type Item = Order;
//!     type Output = ();
//!     fn item(&self) -> &Order { &self.0 }
//!     async fn attempt(&self) -> Result<(), TaskError> {
//!         Err(TaskError::Failed("Simulated processing error".into()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, broker) = BrokerActor::new(16, None);
//!     tokio::spawn(actor.run());
//!
//!     let policy = RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1));
//!     let executor = TaskExecutor::new(policy, CancellationToken::new());
//!     let router = DeadLetterRouter::new(Arc::new(broker.clone()), "dead_letter_queue");
//!     let controller = AckController::new(executor, Arc::new(router));
//!
//!     broker.publish("orders_queue", "order-placed", serde_json::json!({"email": "error@x.com"}))
//!         .await
//!         .unwrap();
//!     let mut deliveries = broker.subscribe("orders_queue").await.unwrap();
//!     let delivery = deliveries.recv().await.unwrap();
//!     let order: Order = serde_json::from_value(delivery.envelope.payload).unwrap();
//!
//!     let processed = controller
//!         .process(delivery.handle, &Intake(order), DeliveryMode::RetryThenDeadLetter)
//!         .await;
//!     assert_eq!(processed.settlement, Settlement::AckedDeadLettered);
//!     assert_eq!(controller.dead_letters().retry_count("error@x.com"), 1);
//! }
//! ```
//!
//! ## Testing
//!
//! [`mock::MockTransport`] implements the transport traits in memory with an
//! expectation API, so the controller, the dead-letter router and the request
//! facade can be tested without a broker. See the [`mock`] module.

pub mod broker;
pub mod client;
pub mod consumer;
pub mod controller;
pub mod dead_letter;
pub mod delivery;
pub mod error;
pub mod executor;
pub mod facade;
pub mod message;
pub mod mock;
pub mod retry;
pub mod task;
pub mod tracing;
pub mod transport;

// Re-export core types for convenience
pub use broker::{BrokerActor, BrokerStats};
pub use client::BrokerClient;
pub use consumer::{Consumer, Dispatch};
pub use controller::{AckController, DeliveryMode, Processed};
pub use dead_letter::{DeadLetterRouter, DEFAULT_DEAD_LETTER_QUEUE};
pub use delivery::{Delivery, DeliveryHandle, Envelope, Reply, Settlement};
pub use error::{
    BrokerError, DeadLetterPublishError, ExecutionError, ExhaustedError, ProcessError,
    RequestError, TaskError,
};
pub use executor::TaskExecutor;
pub use facade::{RequestFacade, DEFAULT_REQUEST_TIMEOUT};
pub use message::{BrokerRequest, Response};
pub use retry::{FailureClass, RetryConfig, RetryPolicy};
pub use task::{FallibleTask, RawItem, WorkItem};
pub use transport::{Channel, Publisher, Requester, Subscriber};
