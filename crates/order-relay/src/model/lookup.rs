use delivery_framework::WorkItem;
use serde::{Deserialize, Serialize};

/// Payload of the `fetch-pokemon` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub name: String,
}

impl LookupRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl WorkItem for LookupRequest {
    fn identity(&self) -> &str {
        &self.name
    }
}
