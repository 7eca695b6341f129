//! # Acknowledgment Controller
//!
//! Owns a [`DeliveryHandle`] for the lifetime of one delivery and decides how
//! it is settled:
//!
//! ```text
//! Received ─► Processing ─┬─► Acked
//!                         ├─► NackedRequeue
//!                         └─► AckedDeadLettered
//! ```
//!
//! Which failure path applies depends on the [`DeliveryMode`] of the route.
//! Every path ends in exactly one settlement call, including a panicking
//! handler and a failed dead-letter publish.

use crate::dead_letter::DeadLetterRouter;
use crate::delivery::{DeliveryHandle, Reply, Settlement};
use crate::error::{BrokerError, ExecutionError, ProcessError};
use crate::executor::TaskExecutor;
use crate::task::{attempt_guarded, FallibleTask, WorkItem};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How a route reacts to a failed direct call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Event intake: retry through the executor, dead-letter on exhaustion.
    RetryThenDeadLetter,
    /// Request/reply: nack with requeue and reject the reply.
    RequeueOnFailure,
    /// Request/reply with executor retries before giving up with a requeue.
    RetryThenRequeue,
}

/// What happened to one delivery.
#[derive(Debug)]
pub struct Processed<T> {
    pub settlement: Settlement,
    pub outcome: Result<T, ProcessError>,
    /// Set when the ack/nack call itself failed on the transport.
    pub settle_error: Option<BrokerError>,
}

impl<T: Serialize> Processed<T> {
    /// Turn the outcome into the reply sent back to a requester.
    pub fn into_reply(self) -> Reply {
        match self.outcome {
            Ok(value) => serde_json::to_value(value).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AckController {
    executor: TaskExecutor,
    dead_letters: Arc<DeadLetterRouter>,
}

impl AckController {
    pub fn new(executor: TaskExecutor, dead_letters: Arc<DeadLetterRouter>) -> Self {
        Self {
            executor,
            dead_letters,
        }
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterRouter> {
        &self.dead_letters
    }

    /// Run `task` for the delivery behind `handle` and settle it.
    #[instrument(skip_all, fields(identifier = task.identifier(), tag = handle.tag(), ?mode))]
    pub async fn process<T>(
        &self,
        handle: DeliveryHandle,
        task: &T,
        mode: DeliveryMode,
    ) -> Processed<T::Output>
    where
        T: FallibleTask + ?Sized,
    {
        let result = match mode {
            DeliveryMode::RetryThenRequeue => {
                self.executor.execute(task).await.map_err(ProcessError::from)
            }
            DeliveryMode::RetryThenDeadLetter | DeliveryMode::RequeueOnFailure => {
                match attempt_guarded(task).await {
                    Ok(value) => Ok(value),
                    Err(e) if mode == DeliveryMode::RequeueOnFailure => Err(e.into()),
                    Err(e) => {
                        warn!(error = %e, "Direct attempt failed, retrying");
                        self.executor.execute(task).await.map_err(ProcessError::from)
                    }
                }
            }
        };

        match result {
            Ok(value) => {
                let settle_error = settle(handle, Settlement::Acked).await;
                info!("Processed");
                Processed {
                    settlement: Settlement::Acked,
                    outcome: Ok(value),
                    settle_error,
                }
            }
            Err(ProcessError::Execution(ExecutionError::Exhausted(exhausted)))
                if mode == DeliveryMode::RetryThenDeadLetter =>
            {
                error!(error = %exhausted, "Max retries reached");
                self.dead_letters.escalate(task.item()).await;
                let settle_error = settle(handle, Settlement::AckedDeadLettered).await;
                Processed {
                    settlement: Settlement::AckedDeadLettered,
                    outcome: Err(ExecutionError::Exhausted(exhausted).into()),
                    settle_error,
                }
            }
            Err(e) => {
                warn!(error = %e, "Processing failed, requeueing");
                let settle_error = settle(handle, Settlement::NackedRequeue).await;
                Processed {
                    settlement: Settlement::NackedRequeue,
                    outcome: Err(e),
                    settle_error,
                }
            }
        }
    }

    /// Dead-letter an event that can never be processed and ack it.
    ///
    /// For events whose payload does not decode or whose pattern has no
    /// handler: there is no requester to tell, so the dead-letter queue is the
    /// only place the failure shows up. `item` is published as given.
    pub async fn dead_letter<T, W>(
        &self,
        handle: DeliveryHandle,
        item: &W,
        reason: String,
    ) -> Processed<T>
    where
        W: WorkItem + ?Sized,
    {
        error!(tag = handle.tag(), identity = item.identity(), %reason, "Unprocessable event");
        self.dead_letters.escalate(item).await;
        let settle_error = settle(handle, Settlement::AckedDeadLettered).await;
        Processed {
            settlement: Settlement::AckedDeadLettered,
            outcome: Err(ProcessError::Undeliverable(reason)),
            settle_error,
        }
    }

    /// Settle a request that cannot be processed at all (unknown pattern, undecodable payload).
    ///
    /// The requester gets the reason as its rejected reply.
    pub async fn discard<T>(&self, handle: DeliveryHandle, reason: String) -> Processed<T> {
        warn!(tag = handle.tag(), %reason, "Discarding delivery");
        let settle_error = settle(handle, Settlement::Discarded).await;
        Processed {
            settlement: Settlement::Discarded,
            outcome: Err(ProcessError::Undeliverable(reason)),
            settle_error,
        }
    }
}

async fn settle(handle: DeliveryHandle, settlement: Settlement) -> Option<BrokerError> {
    let tag = handle.tag();
    let result = match settlement {
        Settlement::Acked | Settlement::AckedDeadLettered => handle.ack().await,
        Settlement::NackedRequeue => handle.nack(true).await,
        Settlement::Discarded => handle.nack(false).await,
    };
    match result {
        Ok(()) => {
            debug!(tag, %settlement, "Settled");
            None
        }
        Err(e) => {
            error!(tag, %settlement, error = %e, "Settlement failed");
            Some(e)
        }
    }
}
