//! # Work Items & Fallible Tasks
//!
//! A [`WorkItem`] is the payload a producer publishes. Its identity (an email
//! address, a lookup key) keys the dead-letter retry counter, so it only needs
//! to be unique among items that are in flight at the same time.
//!
//! A [`FallibleTask`] is one unit of business work over a work item. The
//! [`TaskExecutor`](crate::TaskExecutor) and the
//! [`AckController`](crate::AckController) are written once against this trait
//! and work for every handler.
//!
//! We use associated types so the controller always knows which item to
//! dead-letter for a given task, and so each task keeps its own output type.

use crate::error::TaskError;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::panic::AssertUnwindSafe;

/// An immutable payload with a caller-supplied identity.
pub trait WorkItem: Serialize + Send + Sync {
    fn identity(&self) -> &str;
}

/// A payload kept exactly as it was received.
///
/// Serializes to `payload` and nothing else, so dead-lettering a `RawItem`
/// forwards the producer's bytes even when they never decoded into a typed item.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    identity: String,
    payload: Value,
}

impl RawItem {
    pub fn new(identity: impl Into<String>, payload: Value) -> Self {
        Self {
            identity: identity.into(),
            payload,
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl Serialize for RawItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

impl WorkItem for RawItem {
    fn identity(&self) -> &str {
        &self.identity
    }
}

/// A unit of work that may fail and may be attempted again.
///
/// Implementations must be safe to call repeatedly: every retry calls
/// [`attempt`](FallibleTask::attempt) again on the same task.
#[async_trait]
pub trait FallibleTask: Send + Sync {
    /// The work item this task operates on.
    type Item: WorkItem;

    /// The value produced by a successful attempt.
    type Output: Send;

    fn item(&self) -> &Self::Item;

    /// The identifier used in retry bookkeeping and error messages.
    fn identifier(&self) -> &str {
        self.item().identity()
    }

    /// Run the work once.
    async fn attempt(&self) -> Result<Self::Output, TaskError>;
}

/// Run one attempt, turning a panic into [`TaskError::Panicked`].
pub(crate) async fn attempt_guarded<T: FallibleTask + ?Sized>(
    task: &T,
) -> Result<T::Output, TaskError> {
    match AssertUnwindSafe(task.attempt()).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskError::Panicked(message))
        }
    }
}
