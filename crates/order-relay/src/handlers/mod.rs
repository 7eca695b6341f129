//! # Processing Handlers
//!
//! The business operations behind the consumer routes. Each handler exposes a
//! [`FallibleTask`](delivery_framework::FallibleTask) per operation so the
//! acknowledgment controller can retry it and settle the delivery.
//!
//! - [`intake`] - order intake and the order book behind `fetch-orders`
//! - [`lookup`] - the external HTTP lookup behind `fetch-pokemon`

pub mod intake;
pub mod lookup;

pub use intake::*;
pub use lookup::*;

use std::sync::Arc;

pub const DEFAULT_SENTINEL: &str = "error";

/// Substring that makes a handler fail on purpose.
///
/// An empty marker never trips.
#[derive(Debug, Clone)]
pub struct Sentinel(Arc<str>);

impl Sentinel {
    pub fn new(marker: &str) -> Self {
        Self(Arc::from(marker))
    }

    pub fn trips(&self, identity: &str) -> bool {
        !self.0.is_empty() && identity.contains(&*self.0)
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_matches_substrings() {
        let sentinel = Sentinel::default();
        assert!(sentinel.trips("error@x.com"));
        assert!(sentinel.trips("error-mon"));
        assert!(!sentinel.trips("ok@x.com"));
    }

    #[test]
    fn empty_sentinel_never_trips() {
        assert!(!Sentinel::new("").trips("error@x.com"));
    }
}
