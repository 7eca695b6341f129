//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered
//! by `RUST_LOG`. The module path is hidden (`with_target(false)`); log lines
//! carry structured fields such as `pattern`, `tag`, `identifier` and
//! `attempts_made` instead.
//!
//! ## What Gets Traced
//!
//! - **Broker**: startup, shutdown, and queue depth at exit
//! - **Consumers**: each received delivery (debug) and how it was settled
//! - **Controller**: direct-call failures, exhausted retries, dead-lettering
//! - **Producers**: emitted events (debug) and request timeouts
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run -p order-relay
//! RUST_LOG=debug cargo run -p order-relay   # per-delivery detail
//! RUST_LOG=delivery_framework=debug,info cargo run -p order-relay
//! ```
//!
//! ## Workflow Trace Example
//!
//! An order whose intake always fails, with `RUST_LOG=info`:
//!
//! ```text
//! WARN process{identifier="error@x.com" tag=3 mode=RetryThenDeadLetter}: Direct attempt failed, retrying error=Simulated processing error
//! ERROR process{identifier="error@x.com" tag=3 mode=RetryThenDeadLetter}: Max retries reached error=Failed to process error@x.com after 4 attempts: Simulated processing error
//! WARN process{identifier="error@x.com" tag=3 mode=RetryThenDeadLetter}: Dead-lettered identity="error@x.com" destination=dead_letter_queue escalations=1
//! ```

/// Initialize the global subscriber. Call once, at program start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`] but tolerates an already installed subscriber.
///
/// Meant for tests, where every test binary may try to install one.
pub fn try_setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}
