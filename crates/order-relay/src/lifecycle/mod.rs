//! # System Lifecycle
//!
//! [`OrderSystem`] starts, wires and stops the relay:
//!
//! 1. **Broker** - spawn the [`BrokerActor`](delivery_framework::BrokerActor)
//! 2. **Pipeline** - build the retry executor, dead-letter router and
//!    acknowledgment controller from [`RelayConfig`](crate::config::RelayConfig)
//! 3. **Consumer** - subscribe to the orders queue and spawn the consumer loop
//! 4. **Producer** - hand out an [`OrderProducer`](crate::clients::OrderProducer)
//!    bound to the same queue
//!
//! ## Graceful Shutdown
//!
//! The broker and the consumer hold clients of each other, so channel closure
//! alone would never stop them. Shutdown is explicit and ordered:
//!
//! 1. **Cancel the shutdown token** - the consumer stops taking deliveries and
//!    any delivery waiting in a backoff is settled with a requeue
//! 2. **Await the consumer** - in-flight deliveries finish and settle
//! 3. **Stop the broker** - a `Shutdown` request ends its loop
//!
//! Messages still queued or unacked at that point are lost with the process.
//!
//! ## Observability
//!
//! Call [`setup_tracing`](delivery_framework::tracing::setup_tracing) once at
//! program start; see [`delivery_framework::tracing`].

pub mod order_system;

pub use order_system::*;
