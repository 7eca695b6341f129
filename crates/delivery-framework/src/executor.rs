//! # Task Executor
//!
//! Drives a [`FallibleTask`] through the [`RetryPolicy`] until it succeeds or
//! the policy gives up. The executor performs no I/O of its own and never
//! touches a [`DeliveryHandle`](crate::DeliveryHandle); settling the delivery
//! is the controller's job.
//!
//! Backoff waits are tokio timers, so only the waiting task is suspended.
//! Other deliveries keep running, and several deliveries can be inside
//! overlapping backoff windows at once. The only way to cut a wait short is
//! the shutdown token.

use crate::error::{ExecutionError, ExhaustedError};
use crate::retry::RetryPolicy;
use crate::task::{attempt_guarded, FallibleTask};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TaskExecutor {
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl TaskExecutor {
    pub fn new(policy: RetryPolicy, shutdown: CancellationToken) -> Self {
        Self { policy, shutdown }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempt `task` until it succeeds, fails fatally, or runs out of retries.
    ///
    /// Every execution starts its own attempt count, so with `max_attempts = 3`
    /// the task is attempted at most four times.
    pub async fn execute<T: FallibleTask + ?Sized>(
        &self,
        task: &T,
    ) -> Result<T::Output, ExecutionError> {
        let mut attempts_made = 0;
        loop {
            attempts_made += 1;
            let error = match attempt_guarded(task).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            // After the n-th failed attempt we are deciding on retry number n.
            if !self.policy.should_retry(&error, attempts_made) {
                return Err(ExhaustedError {
                    identifier: task.identifier().to_string(),
                    attempts_made,
                    last_cause: error,
                }
                .into());
            }

            let delay = self.policy.delay_for(attempts_made);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    return Err(ExecutionError::Cancelled {
                        identifier: task.identifier().to_string(),
                        attempts_made,
                    });
                }
            }
        }
    }
}
