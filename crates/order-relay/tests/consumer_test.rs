use delivery_framework::mock::{MockCall, MockTransport};
use delivery_framework::{
    AckController, DeadLetterRouter, Delivery, DeliveryHandle, Dispatch, Envelope, RetryPolicy,
    TaskExecutor,
};
use order_relay::consumer::OrderConsumer;
use order_relay::handlers::{LookupClient, OrderIntake, Sentinel, DEFAULT_LOOKUP_URL};
use order_relay::model::Order;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Real consumer and handlers, mocked transport.
///
/// `channel` receives acks and nacks, `dlq` receives dead-letter publishes.
struct Fixture {
    consumer: OrderConsumer,
    intake: OrderIntake,
    dead_letters: Arc<DeadLetterRouter>,
    channel: MockTransport,
    dlq: MockTransport,
}

fn fixture() -> Fixture {
    let channel = MockTransport::new();
    let dlq = MockTransport::new();
    let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
    let executor = TaskExecutor::new(policy, CancellationToken::new());
    let dead_letters = Arc::new(DeadLetterRouter::new(Arc::new(dlq.clone()), "dead_letter_queue"));
    let controller = AckController::new(executor, dead_letters.clone());
    let intake = OrderIntake::new(Sentinel::default());
    let lookup =
        LookupClient::new(DEFAULT_LOOKUP_URL, Sentinel::default(), Duration::from_secs(1)).unwrap();

    Fixture {
        consumer: OrderConsumer::new(controller, intake.clone(), lookup, false),
        intake,
        dead_letters,
        channel,
        dlq,
    }
}

/// A request/reply delivery.
fn delivery(channel: &MockTransport, tag: u64, pattern: &str, payload: Value) -> Delivery {
    Delivery {
        envelope: Envelope {
            pattern: pattern.to_string(),
            payload,
            correlation_id: Some(tag),
        },
        handle: DeliveryHandle::new(tag, false, Arc::new(channel.clone())),
    }
}

/// A fire-and-forget delivery.
fn event(channel: &MockTransport, tag: u64, pattern: &str, payload: Value) -> Delivery {
    Delivery {
        envelope: Envelope::event(pattern, payload),
        handle: DeliveryHandle::new(tag, false, Arc::new(channel.clone())),
    }
}

fn dead_lettered(payload: Value) -> Vec<(String, String, Value)> {
    vec![(
        "dead_letter_queue".to_string(),
        "dead_letter_queue".to_string(),
        payload,
    )]
}

#[tokio::test]
async fn test_order_placed_is_acked_and_stored() {
    let mut f = fixture();
    f.channel.expect_ack().return_ok();

    let reply = f
        .consumer
        .dispatch(event(&f.channel, 1, "order-placed", json!({"email": "ok@x.com"})))
        .await;

    assert_eq!(reply, Ok(json!({"message": "Order processed successfully"})));
    assert_eq!(f.intake.list().await, vec![Order::new("ok@x.com", "", 1)]);
    assert_eq!(f.channel.calls(), vec![MockCall::Ack(1)]);
    assert!(f.dlq.calls().is_empty());
    f.channel.verify();
}

#[tokio::test]
async fn test_failing_order_is_dead_lettered_and_acked() {
    let mut f = fixture();
    f.dlq.expect_publish().return_ok();
    f.channel.expect_ack().return_ok();

    let reply = f
        .consumer
        .dispatch(event(&f.channel, 2, "order-placed", json!({"email": "error@x.com"})))
        .await;

    assert_eq!(
        reply,
        Err("Failed to process error@x.com after 4 attempts: Simulated processing error".into())
    );
    // Defaults filled in while decoding are not forwarded.
    assert_eq!(f.dlq.published(), dead_lettered(json!({"email": "error@x.com"})));
    assert_eq!(f.channel.calls(), vec![MockCall::Ack(2)]);
    assert_eq!(f.dead_letters.retry_count("error@x.com"), 1);
    f.channel.verify();
    f.dlq.verify();
}

#[tokio::test]
async fn test_dead_lettered_order_keeps_unknown_fields() {
    let mut f = fixture();
    f.dlq.expect_publish().return_ok();
    f.channel.expect_ack().return_ok();
    let payload = json!({"email": "error@x.com", "note": "gift", "quantity": 2});

    f.consumer
        .dispatch(event(&f.channel, 7, "order-placed", payload.clone()))
        .await
        .unwrap_err();

    assert_eq!(f.dlq.published(), dead_lettered(payload));
    f.channel.verify();
    f.dlq.verify();
}

#[tokio::test]
async fn test_fetch_orders_replies_with_the_book() {
    let mut f = fixture();
    f.intake
        .process(&Order::new("a@x.com", "widget", 1))
        .await
        .unwrap();
    f.channel.expect_ack().return_ok();

    let reply = f.consumer.dispatch(delivery(&f.channel, 3, "fetch-orders", json!({}))).await;

    assert_eq!(
        reply,
        Ok(json!([{"email": "a@x.com", "product": "widget", "quantity": 1}]))
    );
    f.channel.verify();
}

#[tokio::test]
async fn test_sentinel_lookup_is_nacked_with_requeue() {
    let mut f = fixture();
    f.channel.expect_nack(true).return_ok();

    let reply = f
        .consumer
        .dispatch(delivery(&f.channel, 4, "fetch-pokemon", json!({"name": "error-mon"})))
        .await;

    assert_eq!(reply, Err("Simulated Pokémon error".into()));
    assert_eq!(f.channel.calls(), vec![MockCall::Nack(4, true)]);
    f.channel.verify();
}

#[tokio::test]
async fn test_unknown_request_pattern_is_discarded() {
    let mut f = fixture();
    f.channel.expect_nack(false).return_ok();

    let reply = f
        .consumer
        .dispatch(delivery(&f.channel, 5, "cancel-order", json!({})))
        .await;

    assert_eq!(
        reply,
        Err("Undeliverable message: No handler for pattern cancel-order".into())
    );
    f.channel.verify();
}

#[tokio::test]
async fn test_malformed_order_is_dead_lettered_and_acked() {
    let mut f = fixture();
    f.dlq.expect_publish().return_ok();
    f.channel.expect_ack().return_ok();
    let payload = json!({"name": "no email"});

    let reply = f
        .consumer
        .dispatch(event(&f.channel, 6, "order-placed", payload.clone()))
        .await;

    let message = reply.unwrap_err();
    assert!(message.starts_with("Undeliverable message: Malformed order-placed payload"));
    assert!(f.intake.list().await.is_empty());
    assert_eq!(f.dlq.published(), dead_lettered(payload));
    assert_eq!(f.channel.calls(), vec![MockCall::Ack(6)]);
    assert_eq!(f.dead_letters.retry_count("order-placed"), 1);
    f.channel.verify();
    f.dlq.verify();
}

#[tokio::test]
async fn test_unknown_event_pattern_is_dead_lettered() {
    let mut f = fixture();
    f.dlq.expect_publish().return_ok();
    f.channel.expect_ack().return_ok();
    let payload = json!({"email": "a@x.com"});

    f.consumer
        .dispatch(event(&f.channel, 8, "order-cancelled", payload.clone()))
        .await
        .unwrap_err();

    assert_eq!(f.dlq.published(), dead_lettered(payload));
    assert_eq!(f.dead_letters.retry_count("a@x.com"), 1);
    f.channel.verify();
    f.dlq.verify();
}

#[tokio::test]
async fn test_malformed_request_is_discarded() {
    let mut f = fixture();
    f.channel.expect_nack(false).return_ok();

    let reply = f
        .consumer
        .dispatch(delivery(&f.channel, 9, "fetch-pokemon", json!({"id": 25})))
        .await;

    let message = reply.unwrap_err();
    assert!(message.starts_with("Undeliverable message: Malformed fetch-pokemon payload"));
    assert!(f.dlq.calls().is_empty());
    f.channel.verify();
}
