//! # Broker Messages
//!
//! The request type sent from a [`BrokerClient`](crate::BrokerClient) to the
//! [`BrokerActor`](crate::BrokerActor). Each variant carries a oneshot
//! `respond_to` sender so the client can await the outcome.

use crate::broker::BrokerStats;
use crate::delivery::{Delivery, Envelope, Reply};
use crate::error::BrokerError;
use tokio::sync::{mpsc, oneshot};

/// Type alias for the one-shot response channel used by the broker.
pub type Response<T> = oneshot::Sender<Result<T, BrokerError>>;

/// Operations understood by the broker actor.
///
/// They mirror what an AMQP channel offers a client: publishing, consuming,
/// settling deliveries and answering requests.
#[derive(Debug)]
pub enum BrokerRequest {
    Publish {
        queue: String,
        envelope: Envelope,
        respond_to: Response<()>,
    },
    /// Publish a request and register `reply_to` under a fresh correlation id.
    Send {
        queue: String,
        pattern: String,
        payload: serde_json::Value,
        reply_to: oneshot::Sender<Reply>,
        respond_to: Response<u64>,
    },
    Subscribe {
        queue: String,
        respond_to: Response<mpsc::UnboundedReceiver<Delivery>>,
    },
    Ack {
        tag: u64,
        respond_to: Response<()>,
    },
    Nack {
        tag: u64,
        requeue: bool,
        respond_to: Response<()>,
    },
    Reply {
        correlation_id: u64,
        reply: Reply,
        respond_to: Response<()>,
    },
    Stats {
        respond_to: Response<BrokerStats>,
    },
    /// Stop the broker even if clients are still alive.
    Shutdown,
}
