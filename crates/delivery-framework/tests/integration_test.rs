use async_trait::async_trait;
use delivery_framework::{
    AckController, BrokerActor, BrokerClient, Consumer, DeadLetterRouter, Delivery, DeliveryMode,
    Dispatch, FallibleTask, RawItem, Reply, RequestError, RequestFacade, RetryPolicy, Subscriber,
    TaskError, TaskExecutor, WorkItem,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// --- Test work item ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Job {
    key: String,
}

impl WorkItem for Job {
    fn identity(&self) -> &str {
        &self.key
    }
}

struct JobTask {
    job: Job,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl FallibleTask for JobTask {
    type Item = Job;
    type Output = String;

    fn item(&self) -> &Job {
        &self.job
    }

    async fn attempt(&self) -> Result<String, TaskError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.job.key.as_str() {
            "flaky" if self.attempts.load(Ordering::SeqCst) < 3 => Err(TaskError::Status {
                code: 503,
                message: "unavailable".into(),
            }),
            key if key.starts_with("bad") => Err(TaskError::Failed(format!("cannot run {key}"))),
            key => Ok(format!("done {key}")),
        }
    }
}

// --- Test dispatcher ---

struct Jobs {
    controller: AckController,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl Dispatch for Jobs {
    async fn dispatch(&self, delivery: Delivery) -> Reply {
        let (envelope, handle) = delivery.into_parts();
        let mode = match envelope.pattern.as_str() {
            "run" => DeliveryMode::RetryThenDeadLetter,
            "ask" => DeliveryMode::RequeueOnFailure,
            other => {
                return self
                    .controller
                    .discard::<String>(handle, format!("No handler for pattern {other}"))
                    .await
                    .into_reply()
            }
        };
        let job: Job = match serde_json::from_value(envelope.payload.clone()) {
            Ok(job) => job,
            Err(e) if mode == DeliveryMode::RetryThenDeadLetter => {
                let item = RawItem::new(envelope.pattern, envelope.payload);
                return self
                    .controller
                    .dead_letter::<String, _>(handle, &item, e.to_string())
                    .await
                    .into_reply();
            }
            Err(e) => {
                return self
                    .controller
                    .discard::<String>(handle, e.to_string())
                    .await
                    .into_reply()
            }
        };
        let task = JobTask {
            job,
            attempts: self.attempts.clone(),
        };
        self.controller.process(handle, &task, mode).await.into_reply()
    }
}

struct Harness {
    broker: BrokerClient,
    facade: RequestFacade,
    dispatcher: Arc<Jobs>,
    shutdown: CancellationToken,
    consumer: JoinHandle<u64>,
}

async fn start(delivery_limit: Option<u32>) -> Harness {
    let (actor, broker) = BrokerActor::new(64, delivery_limit);
    tokio::spawn(actor.run());

    let shutdown = CancellationToken::new();
    let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
    let executor = TaskExecutor::new(policy, shutdown.clone());
    let router = DeadLetterRouter::new(Arc::new(broker.clone()), "dead_letter_queue");
    let dispatcher = Arc::new(Jobs {
        controller: AckController::new(executor, Arc::new(router)),
        attempts: Arc::new(AtomicU32::new(0)),
    });

    let deliveries = broker.subscribe("jobs").await.unwrap();
    let consumer = Consumer::new(
        "jobs",
        dispatcher.clone(),
        Arc::new(broker.clone()),
        shutdown.clone(),
    );
    let consumer = tokio::spawn(consumer.run(deliveries));
    let facade = RequestFacade::new(Arc::new(broker.clone()), "jobs", Duration::from_millis(500));

    Harness {
        broker,
        facade,
        dispatcher,
        shutdown,
        consumer,
    }
}

impl Harness {
    async fn stop(self) -> u64 {
        self.shutdown.cancel();
        let handled = self.consumer.await.unwrap();
        self.broker.shutdown().await;
        handled
    }
}

#[tokio::test]
async fn test_event_success_is_acked() {
    let harness = start(None).await;

    harness
        .facade
        .emit("run", &Job { key: "ok".into() })
        .await
        .unwrap();

    let dispatcher = harness.dispatcher.clone();
    for _ in 0..100 {
        if dispatcher.attempts.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Stopping drains the in-flight delivery.
    assert_eq!(harness.stop().await, 1);
    assert_eq!(dispatcher.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.controller.dead_letters().retry_count("ok"), 0);
}

#[tokio::test]
async fn test_exhausted_event_lands_on_dead_letter_queue() {
    let harness = start(None).await;
    let mut dead_letters = harness.broker.subscribe("dead_letter_queue").await.unwrap();

    harness
        .facade
        .emit("run", &Job { key: "bad-job".into() })
        .await
        .unwrap();

    let dead = tokio::time::timeout(Duration::from_secs(2), dead_letters.recv())
        .await
        .expect("dead letter in time")
        .expect("dead letter queue open");
    assert_eq!(dead.envelope.pattern, "dead_letter_queue");
    let job: Job = serde_json::from_value(dead.envelope.payload.clone()).unwrap();
    assert_eq!(job, Job { key: "bad-job".into() });
    dead.handle.ack().await.unwrap();

    // Direct call plus four executor attempts.
    assert_eq!(harness.dispatcher.attempts.load(Ordering::SeqCst), 5);
    assert_eq!(
        harness.dispatcher.controller.dead_letters().retry_count("bad-job"),
        1
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_request_reply_round_trip() {
    let harness = start(None).await;

    let reply: String = harness
        .facade
        .request("ask", &Job { key: "ok".into() })
        .await
        .unwrap();
    assert_eq!(reply, "done ok");

    let stats = harness.broker.stats().await.unwrap();
    assert_eq!(stats.acked, 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_failed_request_is_rejected_and_requeued() {
    let harness = start(Some(2)).await;

    let result = harness
        .facade
        .request::<String, _>("ask", &Job { key: "bad-ask".into() })
        .await;
    assert_eq!(
        result,
        Err(RequestError::Rejected("cannot run bad-ask".into()))
    );

    // Two requeues, then the broker drops the message.
    let broker = harness.broker.clone();
    let mut stats = broker.stats().await.unwrap();
    for _ in 0..100 {
        if stats.dropped == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        stats = broker.stats().await.unwrap();
    }
    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.nacked, 3);
    assert_eq!(stats.dropped, 1);
    assert_eq!(harness.dispatcher.attempts.load(Ordering::SeqCst), 3);
    harness.stop().await;
}

#[tokio::test]
async fn test_transient_failures_recover_within_budget() {
    let harness = start(None).await;

    harness
        .facade
        .emit("run", &Job { key: "flaky".into() })
        .await
        .unwrap();

    let broker = harness.broker.clone();
    let mut acked = 0;
    for _ in 0..100 {
        acked = broker.stats().await.unwrap().acked;
        if acked == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(acked, 1);
    assert_eq!(harness.dispatcher.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(
        harness.dispatcher.controller.dead_letters().retry_count("flaky"),
        0
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_unknown_pattern_is_discarded() {
    let harness = start(None).await;

    let result = harness
        .facade
        .request::<String, _>("nope", &Job { key: "ok".into() })
        .await;
    assert_eq!(
        result,
        Err(RequestError::Rejected(
            "Undeliverable message: No handler for pattern nope".into()
        ))
    );

    let stats = harness.broker.stats().await.unwrap();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.requeued, 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_undecodable_event_is_dead_lettered_as_received() {
    let harness = start(None).await;
    let mut dead_letters = harness.broker.subscribe("dead_letter_queue").await.unwrap();
    let payload = serde_json::json!({"id": 42, "note": "no key"});

    harness.facade.emit("run", &payload).await.unwrap();

    let dead = tokio::time::timeout(Duration::from_secs(2), dead_letters.recv())
        .await
        .expect("dead letter in time")
        .expect("dead letter queue open");
    assert_eq!(dead.envelope.payload, payload);
    dead.handle.ack().await.unwrap();

    assert_eq!(harness.dispatcher.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(harness.dispatcher.controller.dead_letters().retry_count("run"), 1);
    let stats = harness.broker.stats().await.unwrap();
    assert_eq!(stats.dropped, 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_concurrent_events_do_not_block_each_other() {
    let harness = start(None).await;
    let mut dead_letters = harness.broker.subscribe("dead_letter_queue").await.unwrap();

    for i in 0..5 {
        harness
            .facade
            .emit("run", &Job { key: format!("bad-{i}") })
            .await
            .unwrap();
    }
    for i in 0..5 {
        harness
            .facade
            .emit("run", &Job { key: format!("good-{i}") })
            .await
            .unwrap();
    }

    let mut keys = Vec::new();
    while keys.len() < 5 {
        let dead = tokio::time::timeout(Duration::from_secs(2), dead_letters.recv())
            .await
            .unwrap()
            .unwrap();
        let job: Job = serde_json::from_value(dead.envelope.payload.clone()).unwrap();
        keys.push(job.key);
        dead.handle.ack().await.unwrap();
    }
    keys.sort();
    assert_eq!(keys, vec!["bad-0", "bad-1", "bad-2", "bad-3", "bad-4"]);

    let snapshot = harness.dispatcher.controller.dead_letters().snapshot();
    assert_eq!(snapshot.len(), 5);
    assert!(snapshot.values().all(|count| *count == 1));
    harness.stop().await;
}

#[tokio::test]
async fn test_request_timeout_when_nobody_consumes() {
    let (actor, broker) = BrokerActor::new(8, None);
    tokio::spawn(actor.run());
    let facade = RequestFacade::new(Arc::new(broker.clone()), "idle", Duration::from_millis(20));

    let result = facade.request::<String, _>("ask", &Job { key: "ok".into() }).await;
    assert!(matches!(result, Err(RequestError::Timeout { .. })));
    broker.shutdown().await;
}
