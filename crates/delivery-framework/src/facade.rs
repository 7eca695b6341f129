//! # Request Facade
//!
//! The producer side of the pipeline. [`RequestFacade::emit`] publishes an
//! event and returns as soon as the broker has it. [`RequestFacade::request`]
//! sends a command and waits for the correlated reply with a deadline.
//!
//! A request that times out is abandoned: the reply slot is dropped with the
//! receiver, and a late reply is discarded by the broker.

use crate::delivery::Reply;
use crate::error::{BrokerError, RequestError};
use crate::transport::Requester;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone)]
pub struct RequestFacade {
    requester: Arc<dyn Requester>,
    queue: String,
    timeout: Duration,
}

impl RequestFacade {
    pub fn new(requester: Arc<dyn Requester>, queue: impl Into<String>, timeout: Duration) -> Self {
        Self {
            requester,
            queue: queue.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Publish `payload` as an event under `topic`. No reply is awaited.
    pub async fn emit<P>(&self, topic: &str, payload: &P) -> Result<(), RequestError>
    where
        P: Serialize + ?Sized,
    {
        let payload = to_value(payload)?;
        debug!(queue = %self.queue, topic, "Emitting event");
        self.requester.publish(&self.queue, topic, payload).await?;
        Ok(())
    }

    /// Send `command` and decode its reply, waiting at most the configured timeout.
    pub async fn request<R, P>(&self, command: &str, payload: &P) -> Result<R, RequestError>
    where
        R: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.request_with_timeout(command, payload, self.timeout).await
    }

    pub async fn request_with_timeout<R, P>(
        &self,
        command: &str,
        payload: &P,
        timeout: Duration,
    ) -> Result<R, RequestError>
    where
        R: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let payload = to_value(payload)?;
        debug!(queue = %self.queue, command, "Sending request");

        let exchange = self.exchange(command, payload);
        let reply = match tokio::time::timeout(timeout, exchange).await {
            Ok(reply) => reply?,
            Err(_) => {
                warn!(command, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                return Err(RequestError::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        let value = reply.map_err(RequestError::Rejected)?;
        serde_json::from_value(value).map_err(|e| RequestError::Decode(e.to_string()))
    }

    async fn exchange(&self, command: &str, payload: Value) -> Result<Reply, BrokerError> {
        let reply = self.requester.send(&self.queue, command, payload).await?;
        // A dropped sender means the broker forgot the request.
        reply.await.map_err(|_| BrokerError::BrokerDropped)
    }
}

fn to_value<P: Serialize + ?Sized>(payload: &P) -> Result<Value, RequestError> {
    serde_json::to_value(payload).map_err(|e| BrokerError::Serialization(e.to_string()).into())
}
