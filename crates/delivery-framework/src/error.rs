//! # Pipeline Errors
//!
//! Every layer of the delivery pipeline has its own error enum. Failures of a
//! single attempt are [`TaskError`]s; the executor turns a run of them into an
//! [`ExecutionError`]; the controller reports what happened to a delivery as a
//! [`ProcessError`]. Transport problems are [`BrokerError`]s and the producer
//! side sees [`RequestError`].

use std::time::Duration;

/// Failure of one attempt of a task.
///
/// The variants carry the response status (if any) that decides whether the
/// failure is worth retrying. See [`RetryPolicy::classify`](crate::RetryPolicy::classify).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    /// The attempt failed without producing a response status
    /// (network failure, simulated business failure).
    #[error("{0}")]
    Failed(String),

    /// The remote side answered with a non-success status.
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },

    /// The attempt failed in a way that will not change on retry.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The attempt panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// The response status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TaskError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// The retry budget for a task was consumed, or its last failure was not retryable.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Failed to process {identifier} after {attempts_made} attempts: {last_cause}")]
pub struct ExhaustedError {
    pub identifier: String,
    pub attempts_made: u32,
    pub last_cause: TaskError,
}

/// Why [`TaskExecutor::execute`](crate::TaskExecutor::execute) gave up.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    /// Shutdown fired while the task was waiting for its next attempt.
    #[error("Retry of {identifier} cancelled by shutdown after {attempts_made} attempts")]
    Cancelled {
        identifier: String,
        attempts_made: u32,
    },
}

/// Errors raised by the broker transport.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker closed")]
    BrokerClosed,
    #[error("Broker dropped response channel")]
    BrokerDropped,
    #[error("Unknown delivery tag: {0}")]
    UnknownDeliveryTag(u64),
    #[error("Queue already has a consumer: {0}")]
    AlreadySubscribed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// What the controller reports for a delivery that did not succeed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// The delivery could not be routed or decoded.
    #[error("Undeliverable message: {0}")]
    Undeliverable(String),
}

/// Errors seen by producers going through the [`RequestFacade`](crate::RequestFacade).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("No reply to {command} within {}ms", .timeout.as_millis())]
    Timeout { command: String, timeout: Duration },
    /// The consumer answered with an error.
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("Reply decode error: {0}")]
    Decode(String),
}

/// A dead-letter publish failed. Only ever logged.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Dead-letter publish of {identity} to {destination} failed: {source}")]
pub struct DeadLetterPublishError {
    pub identity: String,
    pub destination: String,
    pub source: BrokerError,
}
