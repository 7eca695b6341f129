//! # Order Consumer
//!
//! Routes deliveries from the orders queue to the processing handlers and
//! picks the delivery mode per route:
//!
//! | Pattern | Handler | Mode |
//! |---------|---------|------|
//! | `order-placed` | [`OrderIntake`] | retry, then dead-letter |
//! | `fetch-orders` | [`OrderIntake::list`] | requeue on failure |
//! | `fetch-pokemon` | [`LookupClient`] | requeue on failure (optionally retry first) |
//!
//! An event that cannot be processed at all (its payload does not decode, or
//! nothing handles its pattern) is dead-lettered exactly as received and
//! acked. A request in the same state is nacked without requeue and its
//! requester gets the reason.

use crate::handlers::{LookupClient, OrderIntake};
use crate::model::{IntakeReceipt, LookupRequest, Order};
use async_trait::async_trait;
use delivery_framework::{
    AckController, Delivery, DeliveryHandle, DeliveryMode, Dispatch, Envelope, FallibleTask,
    RawItem, Reply,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub const ORDER_PLACED: &str = "order-placed";
pub const FETCH_ORDERS: &str = "fetch-orders";
pub const FETCH_LOOKUP: &str = "fetch-pokemon";

pub struct OrderConsumer {
    controller: AckController,
    intake: OrderIntake,
    lookup: LookupClient,
    lookup_mode: DeliveryMode,
}

impl OrderConsumer {
    pub fn new(
        controller: AckController,
        intake: OrderIntake,
        lookup: LookupClient,
        retry_lookups: bool,
    ) -> Self {
        let lookup_mode = if retry_lookups {
            DeliveryMode::RetryThenRequeue
        } else {
            DeliveryMode::RequeueOnFailure
        };
        Self {
            controller,
            intake,
            lookup,
            lookup_mode,
        }
    }

    async fn run<T>(&self, handle: DeliveryHandle, task: Result<T, String>, mode: DeliveryMode) -> Reply
    where
        T: FallibleTask,
        T::Output: Serialize,
    {
        match task {
            Ok(task) => self.controller.process(handle, &task, mode).await.into_reply(),
            Err(reason) => self
                .controller
                .discard::<T::Output>(handle, reason)
                .await
                .into_reply(),
        }
    }

    async fn place_order(&self, handle: DeliveryHandle, envelope: Envelope) -> Reply {
        match decode::<Order>(ORDER_PLACED, &envelope.payload) {
            Ok(order) => {
                let task = self.intake.intake_task(order, envelope.payload);
                self.controller
                    .process(handle, &task, DeliveryMode::RetryThenDeadLetter)
                    .await
                    .into_reply()
            }
            Err(reason) => self.unprocessable::<IntakeReceipt>(handle, envelope, reason).await,
        }
    }

    /// Dead-letter events, discard requests.
    async fn unprocessable<T: Serialize>(
        &self,
        handle: DeliveryHandle,
        envelope: Envelope,
        reason: String,
    ) -> Reply {
        if envelope.expects_reply() {
            return self.controller.discard::<T>(handle, reason).await.into_reply();
        }
        let item = RawItem::new(identity_of(&envelope), envelope.payload);
        self.controller
            .dead_letter::<T, _>(handle, &item, reason)
            .await
            .into_reply()
    }
}

#[async_trait]
impl Dispatch for OrderConsumer {
    async fn dispatch(&self, delivery: Delivery) -> Reply {
        let (envelope, handle) = delivery.into_parts();
        match envelope.pattern.as_str() {
            ORDER_PLACED => self.place_order(handle, envelope).await,
            FETCH_ORDERS => {
                let task = Ok(self.intake.list_task());
                self.run(handle, task, DeliveryMode::RequeueOnFailure).await
            }
            FETCH_LOOKUP => {
                let task = decode::<LookupRequest>(FETCH_LOOKUP, &envelope.payload)
                    .map(|request| self.lookup.task(request));
                self.run(handle, task, self.lookup_mode).await
            }
            other => {
                let reason = format!("No handler for pattern {other}");
                self.unprocessable::<()>(handle, envelope, reason).await
            }
        }
    }
}

fn decode<T: DeserializeOwned>(pattern: &str, payload: &Value) -> Result<T, String> {
    T::deserialize(payload).map_err(|e| format!("Malformed {pattern} payload: {e}"))
}

/// Dead-letter key for a payload that never decoded: its `email` if it has
/// one, otherwise the pattern it arrived on.
fn identity_of(envelope: &Envelope) -> String {
    envelope
        .payload
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or(&envelope.pattern)
        .to_string()
}
