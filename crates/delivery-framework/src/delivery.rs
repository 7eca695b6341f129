//! # Deliveries
//!
//! A [`Delivery`] is one hand-over of a message from the broker to a
//! consumer: the [`Envelope`] (what was published) plus a [`DeliveryHandle`]
//! (how to settle it).
//!
//! The settlement methods on [`DeliveryHandle`] take `self`, so once a
//! delivery is acked or nacked the handle is gone and the compiler rejects a
//! second settlement.

use crate::error::BrokerError;
use crate::transport::Channel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The answer to a request/reply message: a value, or the consumer's error message.
pub type Reply = Result<Value, String>;

/// A published message as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing pattern, e.g. `order-placed` or `fetch-orders`.
    pub pattern: String,
    pub payload: Value,
    /// Set for request/reply messages; the reply is routed back by this id.
    pub correlation_id: Option<u64>,
}

impl Envelope {
    pub fn event(pattern: impl Into<String>, payload: Value) -> Self {
        Self {
            pattern: pattern.into(),
            payload,
            correlation_id: None,
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.correlation_id.is_some()
    }
}

/// Transport-level reference to a delivered message, sufficient to settle it.
pub struct DeliveryHandle {
    tag: u64,
    redelivered: bool,
    channel: Arc<dyn Channel>,
}

impl DeliveryHandle {
    pub fn new(tag: u64, redelivered: bool, channel: Arc<dyn Channel>) -> Self {
        Self {
            tag,
            redelivered,
            channel,
        }
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Whether the broker has handed this message out before.
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Remove the message from its source queue.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.channel.ack(self.tag).await
    }

    /// Reject the message, optionally putting it back on its queue.
    pub async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        self.channel.nack(self.tag, requeue).await
    }
}

impl fmt::Debug for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryHandle")
            .field("tag", &self.tag)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    pub handle: DeliveryHandle,
}

impl Delivery {
    pub fn into_parts(self) -> (Envelope, DeliveryHandle) {
        (self.envelope, self.handle)
    }
}

/// Terminal state of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processed successfully and acknowledged.
    Acked,
    /// Negatively acknowledged and put back on the queue.
    NackedRequeue,
    /// Retries exhausted; forwarded to the dead-letter destination and acknowledged.
    AckedDeadLettered,
    /// Could not be routed or decoded; nacked without requeue.
    Discarded,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Settlement::Acked => "acked",
            Settlement::NackedRequeue => "nacked_requeue",
            Settlement::AckedDeadLettered => "acked_dead_lettered",
            Settlement::Discarded => "discarded",
        };
        f.write_str(name)
    }
}
