//! # Order Relay
//!
//! A message-driven order and lookup processor built on `delivery-framework`.
//!
//! ## Core Components
//!
//! - **[model]**: work items on the wire ([`Order`](model::Order), [`LookupRequest`](model::LookupRequest))
//! - **[handlers]**: order intake and the external HTTP lookup
//! - **[consumer]**: routes `order-placed`, `fetch-orders` and `fetch-pokemon`
//! - **[clients]**: the producer API ([`OrderProducer`](clients::OrderProducer))
//! - **[config]**: [`RelayConfig`](config::RelayConfig) from file and environment
//! - **[lifecycle]**: starts and stops the whole system
//!
//! ## Testing
//!
//! See [`delivery_framework::mock`] for testing producers and settlement
//! without a broker, and `tests/` for full-system scenarios.

pub mod clients;
pub mod config;
pub mod consumer;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod model;

pub use error::RelayError;
