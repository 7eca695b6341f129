//! # Dead-Letter Router
//!
//! Forwards work items whose retries are exhausted to a fixed dead-letter
//! destination and counts escalations per identity.
//!
//! Escalation is best-effort. A failed publish is logged and swallowed so that
//! settling the original delivery never depends on the dead-letter side.

use crate::error::{BrokerError, DeadLetterPublishError};
use crate::task::WorkItem;
use crate::transport::Publisher;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

pub const DEFAULT_DEAD_LETTER_QUEUE: &str = "dead_letter_queue";

pub struct DeadLetterRouter {
    publisher: Arc<dyn Publisher>,
    destination: String,
    retry_counts: DashMap<String, u64>,
}

impl DeadLetterRouter {
    pub fn new(publisher: Arc<dyn Publisher>, destination: impl Into<String>) -> Self {
        Self {
            publisher,
            destination: destination.into(),
            retry_counts: DashMap::new(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Count the escalation and publish `item` unmodified to the dead-letter destination.
    pub async fn escalate<W: WorkItem + ?Sized>(&self, item: &W) {
        let identity = item.identity();
        let count = {
            let mut entry = self.retry_counts.entry(identity.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        match self.publish(item).await {
            Ok(()) => warn!(
                identity,
                destination = %self.destination,
                escalations = count,
                "Dead-lettered"
            ),
            Err(e) => error!(error = %e, escalations = count, "Dead-letter publish failed"),
        }
    }

    async fn publish<W: WorkItem + ?Sized>(&self, item: &W) -> Result<(), DeadLetterPublishError> {
        let failed = |source: BrokerError| DeadLetterPublishError {
            identity: item.identity().to_string(),
            destination: self.destination.clone(),
            source,
        };
        let payload = serde_json::to_value(item)
            .map_err(|e| failed(BrokerError::Serialization(e.to_string())))?;
        self.publisher
            .publish(&self.destination, &self.destination, payload)
            .await
            .map_err(failed)
    }

    /// Number of escalations seen for `identity` since startup.
    pub fn retry_count(&self, identity: &str) -> u64 {
        self.retry_counts.get(identity).map_or(0, |count| *count)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.retry_counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
