//! # Configuration
//!
//! [`RelayConfig`] is read with the `config` crate from, in order of
//! precedence:
//!
//! 1. Environment variables prefixed `RELAY__`, sections separated by `__`
//!    (`RELAY__RETRY__BASE_DELAY_MS=100`).
//! 2. The file named by `RELAY_CONFIG`, or `relay.toml` in the working
//!    directory if it exists.
//! 3. Built-in defaults.
//!
//! ```toml
//! [broker]
//! queue = "orders_queue"
//! dead_letter_queue = "dead_letter_queue"
//! delivery_limit = 10   # 0 requeues forever
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 5000
//! cap_delay_ms = 60000
//!
//! [request]
//! timeout_ms = 5000
//!
//! [lookup]
//! url_template = "https://pokeapi.co/api/v2/pokemon/{name}"
//! sentinel = "error"
//! retry_in_consumer = false
//! ```

use crate::handlers::{DEFAULT_LOOKUP_URL, DEFAULT_SENTINEL};
use config::{Config, ConfigError, Environment, File};
use delivery_framework::{RetryConfig, DEFAULT_DEAD_LETTER_QUEUE, DEFAULT_REQUEST_TIMEOUT};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "RELAY_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "relay";
const ENV_PREFIX: &str = "RELAY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub broker: BrokerConfig,
    pub retry: RetryConfig,
    pub request: RequestConfig,
    pub lookup: LookupConfig,
    pub intake: IntakeConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub queue: String,
    pub dead_letter_queue: String,
    /// Requeues allowed per message before the broker drops it. 0 means no limit.
    pub delivery_limit: u32,
    pub buffer_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue: "orders_queue".to_string(),
            dead_letter_queue: DEFAULT_DEAD_LETTER_QUEUE.to_string(),
            delivery_limit: 10,
            buffer_size: 256,
        }
    }
}

impl BrokerConfig {
    pub fn delivery_limit(&self) -> Option<u32> {
        (self.delivery_limit > 0).then_some(self.delivery_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub url_template: String,
    pub sentinel: String,
    /// Run lookups through the retry executor before requeueing.
    pub retry_in_consumer: bool,
    /// Per-request HTTP timeout.
    pub timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_LOOKUP_URL.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            retry_in_consumer: false,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub sentinel: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load from `RELAY_CONFIG` (or `relay.toml`) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).ok();
        Self::load_with(path.as_deref().map(Path::new), None)
    }

    /// Load from an explicit file and, if given, a fixed set of variables
    /// instead of the process environment.
    pub fn load_with(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env);

        Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}
