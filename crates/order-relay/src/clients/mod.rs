//! # Clients
//!
//! Producer-side wrappers over the request facade. They hide topic names and
//! payload shapes from callers such as an HTTP endpoint.

pub mod order_producer;

pub use order_producer::OrderProducer;
