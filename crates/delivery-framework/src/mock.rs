//! # Mock Transport & Testing Guide
//!
//! [`MockTransport`] implements [`Publisher`], [`Requester`] and [`Channel`]
//! entirely in memory. You queue expectations with return values up front,
//! hand the mock to the code under test, and call [`MockTransport::verify`] at
//! the end. Every call is also recorded so tests can assert on what was sent.
//!
//! ## When to use the Mock vs the Broker
//!
//! | Feature | MockTransport | BrokerActor |
//! |---------|---------------|-------------|
//! | **Speed** | Instant (in-memory) | Fast (but involves tokio spawn) |
//! | **Determinism** | Fully deterministic | Subject to scheduler |
//! | **Queues** | None (expectations) | Real queues, redelivery, replies |
//! | **Use Case** | Settlement and dead-letter logic | Consumer loops, full system |
//! | **Error Injection** | Easy (`return_err`) | Hard (needs a closed broker) |
//!
//! ## Testing Strategies
//!
//! <details>
//! <summary><b>Pattern 0: Settlement Logic (Pure Mock)</b></summary>
//!
//! ```rust
//! use delivery_framework::mock::{MockCall, MockTransport};
//! use delivery_framework::DeliveryHandle;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut channel = MockTransport::new();
//!     channel.expect_nack(true).return_ok();
//!
//!     let handle = DeliveryHandle::new(1, false, Arc::new(channel.clone()));
//!     handle.nack(true).await.unwrap();
//!
//!     assert_eq!(channel.calls(), vec![MockCall::Nack(1, true)]);
//!     channel.verify();
//! }
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Pattern 1: Request Timeouts</b></summary>
//!
//! A send expectation can park the reply slot forever, which is the easiest
//! way to drive a requester into its timeout.
//!
//! ```rust
//! use delivery_framework::mock::MockTransport;
//! use delivery_framework::{RequestError, RequestFacade};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockTransport::new();
//!     mock.expect_send().never_reply();
//!
//!     let facade = RequestFacade::new(Arc::new(mock.clone()), "orders", Duration::from_millis(10));
//!     let result = facade.request::<Vec<String>, _>("fetch-orders", &()).await;
//!     assert!(matches!(result, Err(RequestError::Timeout { .. })));
//! }
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Pattern 2: Full System Integration Test</b></summary>
//!
//! Spawn a real [`BrokerActor`](crate::BrokerActor) with a
//! [`Consumer`](crate::Consumer) on top. See `tests/integration_test.rs`.
//! </details>

use crate::delivery::Reply;
use crate::error::BrokerError;
use crate::transport::{Channel, Publisher, Requester};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// A call observed by the mock, in order of arrival.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `(queue, pattern, payload)`
    Publish(String, String, Value),
    /// `(queue, pattern, payload)`
    Send(String, String, Value),
    Ack(u64),
    /// `(tag, requeue)`
    Nack(u64, bool),
    /// `(correlation_id, reply)`
    Reply(u64, Reply),
}

enum SendReply {
    Answer(Reply),
    Never,
}

enum Expectation {
    Publish {
        response: Result<(), BrokerError>,
    },
    Send {
        response: Result<SendReply, BrokerError>,
    },
    Ack {
        response: Result<(), BrokerError>,
    },
    Nack {
        requeue: bool,
        response: Result<(), BrokerError>,
    },
    Reply {
        response: Result<(), BrokerError>,
    },
}

#[derive(Default)]
struct State {
    expectations: VecDeque<Expectation>,
    calls: Vec<MockCall>,
    parked: Vec<oneshot::Sender<Reply>>,
}

/// An in-memory transport with expectation tracking.
///
/// Clones share expectations and the call log.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_publish(&mut self) -> UnitExpectationBuilder {
        UnitExpectationBuilder {
            state: self.state.clone(),
            build: |response| Expectation::Publish { response },
        }
    }

    pub fn expect_send(&mut self) -> SendExpectationBuilder {
        SendExpectationBuilder {
            state: self.state.clone(),
        }
    }

    pub fn expect_ack(&mut self) -> UnitExpectationBuilder {
        UnitExpectationBuilder {
            state: self.state.clone(),
            build: |response| Expectation::Ack { response },
        }
    }

    pub fn expect_nack(&mut self, requeue: bool) -> NackExpectationBuilder {
        NackExpectationBuilder {
            state: self.state.clone(),
            requeue,
        }
    }

    pub fn expect_reply(&mut self) -> UnitExpectationBuilder {
        UnitExpectationBuilder {
            state: self.state.clone(),
            build: |response| Expectation::Reply { response },
        }
    }

    /// All calls seen so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Published messages as `(queue, pattern, payload)`.
    pub fn published(&self) -> Vec<(String, String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Publish(queue, pattern, payload) => Some((queue, pattern, payload)),
                _ => None,
            })
            .collect()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let state = self.state.lock().unwrap();
        if !state.expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                state.expectations.len()
            );
        }
    }

    fn record(&self, call: MockCall) -> Option<Expectation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state.expectations.pop_front()
    }
}

#[async_trait]
impl Publisher for MockTransport {
    async fn publish(
        &self,
        queue: &str,
        pattern: &str,
        payload: Value,
    ) -> Result<(), BrokerError> {
        match self.record(MockCall::Publish(queue.into(), pattern.into(), payload)) {
            Some(Expectation::Publish { response }) => response,
            _ => panic!("Unexpected publish to {queue} or expectation mismatch"),
        }
    }
}

#[async_trait]
impl Requester for MockTransport {
    async fn send(
        &self,
        queue: &str,
        pattern: &str,
        payload: Value,
    ) -> Result<oneshot::Receiver<Reply>, BrokerError> {
        let response = match self.record(MockCall::Send(queue.into(), pattern.into(), payload)) {
            Some(Expectation::Send { response }) => response,
            _ => panic!("Unexpected send of {pattern} or expectation mismatch"),
        };
        let (reply_to, reply) = oneshot::channel();
        match response? {
            SendReply::Answer(answer) => {
                let _ = reply_to.send(answer);
            }
            SendReply::Never => self.state.lock().unwrap().parked.push(reply_to),
        }
        Ok(reply)
    }
}

#[async_trait]
impl Channel for MockTransport {
    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        match self.record(MockCall::Ack(tag)) {
            Some(Expectation::Ack { response }) => response,
            _ => panic!("Unexpected ack of {tag} or expectation mismatch"),
        }
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        match self.record(MockCall::Nack(tag, requeue)) {
            Some(Expectation::Nack {
                requeue: expected,
                response,
            }) if expected == requeue => response,
            _ => panic!("Unexpected nack of {tag} (requeue={requeue}) or expectation mismatch"),
        }
    }

    async fn reply(&self, correlation_id: u64, reply: Reply) -> Result<(), BrokerError> {
        match self.record(MockCall::Reply(correlation_id, reply)) {
            Some(Expectation::Reply { response }) => response,
            _ => panic!("Unexpected reply to {correlation_id} or expectation mismatch"),
        }
    }
}

/// Builder for expectations that answer with `()`.
pub struct UnitExpectationBuilder {
    state: Arc<Mutex<State>>,
    build: fn(Result<(), BrokerError>) -> Expectation,
}

impl UnitExpectationBuilder {
    pub fn return_ok(self) {
        self.push(Ok(()));
    }

    pub fn return_err(self, error: BrokerError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<(), BrokerError>) {
        let expectation = (self.build)(response);
        self.state.lock().unwrap().expectations.push_back(expectation);
    }
}

/// Builder for `nack` expectations; the requeue flag must match.
pub struct NackExpectationBuilder {
    state: Arc<Mutex<State>>,
    requeue: bool,
}

impl NackExpectationBuilder {
    pub fn return_ok(self) {
        self.push(Ok(()));
    }

    pub fn return_err(self, error: BrokerError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<(), BrokerError>) {
        self.state
            .lock()
            .unwrap()
            .expectations
            .push_back(Expectation::Nack {
                requeue: self.requeue,
                response,
            });
    }
}

/// Builder for `send` expectations.
pub struct SendExpectationBuilder {
    state: Arc<Mutex<State>>,
}

impl SendExpectationBuilder {
    /// The request is accepted and answered with `value`.
    pub fn reply_ok(self, value: Value) {
        self.push(Ok(SendReply::Answer(Ok(value))));
    }

    /// The request is accepted and rejected by the consumer.
    pub fn reply_err(self, message: impl Into<String>) {
        self.push(Ok(SendReply::Answer(Err(message.into()))));
    }

    /// The request is accepted but no reply ever arrives.
    pub fn never_reply(self) {
        self.push(Ok(SendReply::Never));
    }

    /// The broker refuses the request.
    pub fn return_err(self, error: BrokerError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<SendReply, BrokerError>) {
        self.state
            .lock()
            .unwrap()
            .expectations
            .push_back(Expectation::Send { response });
    }
}
