use crate::clients::OrderProducer;
use crate::config::RelayConfig;
use crate::consumer::OrderConsumer;
use crate::error::RelayError;
use crate::handlers::{LookupClient, OrderIntake, Sentinel};
use delivery_framework::{
    AckController, BrokerActor, BrokerClient, BrokerStats, Consumer, DeadLetterRouter, RequestFacade,
    RetryPolicy, Subscriber, TaskExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The running relay: broker, consumer loop and producer.
///
/// # Example
///
/// ```ignore
/// let system = OrderSystem::start(RelayConfig::load()?).await?;
///
/// let accepted = system.producer.place_order(&Order::new("ok@x.com", "widget", 1)).await?;
/// let orders = system.producer.get_orders().await?;
///
/// system.shutdown().await?;
/// ```
pub struct OrderSystem {
    /// Producer-side API bound to the orders queue.
    pub producer: OrderProducer,

    broker: BrokerClient,
    intake: OrderIntake,
    dead_letters: Arc<DeadLetterRouter>,
    shutdown: CancellationToken,
    broker_handle: JoinHandle<()>,
    consumer_handle: JoinHandle<u64>,
}

impl OrderSystem {
    /// Spawn the broker and the consumer loop and wire the pipeline.
    pub async fn start(config: RelayConfig) -> Result<Self, RelayError> {
        let queue = config.broker.queue.clone();

        // 1. Broker
        let (broker_actor, broker) =
            BrokerActor::new(config.broker.buffer_size, config.broker.delivery_limit());
        let broker_handle = tokio::spawn(broker_actor.run());

        // 2. Pipeline
        let shutdown = CancellationToken::new();
        let executor = TaskExecutor::new(RetryPolicy::from(&config.retry), shutdown.clone());
        let dead_letters = Arc::new(DeadLetterRouter::new(
            Arc::new(broker.clone()),
            config.broker.dead_letter_queue.clone(),
        ));
        let controller = AckController::new(executor, dead_letters.clone());

        let intake = OrderIntake::new(Sentinel::new(&config.intake.sentinel));
        let lookup = LookupClient::new(
            config.lookup.url_template.clone(),
            Sentinel::new(&config.lookup.sentinel),
            Duration::from_millis(config.lookup.timeout_ms),
        )?;
        let dispatcher = OrderConsumer::new(
            controller,
            intake.clone(),
            lookup,
            config.lookup.retry_in_consumer,
        );

        // 3. Consumer
        let deliveries = broker.subscribe(&queue).await?;
        let consumer = Consumer::new(
            queue.clone(),
            Arc::new(dispatcher),
            Arc::new(broker.clone()),
            shutdown.clone(),
        );
        let consumer_handle = tokio::spawn(consumer.run(deliveries));

        // 4. Producer
        let facade = RequestFacade::new(Arc::new(broker.clone()), queue.clone(), config.request.timeout());
        let producer = OrderProducer::new(facade);

        info!(%queue, dead_letter_queue = %config.broker.dead_letter_queue, "Order system started");
        Ok(Self {
            producer,
            broker,
            intake,
            dead_letters,
            shutdown,
            broker_handle,
            consumer_handle,
        })
    }

    pub fn broker(&self) -> &BrokerClient {
        &self.broker
    }

    pub fn intake(&self) -> &OrderIntake {
        &self.intake
    }

    pub fn dead_letters(&self) -> &DeadLetterRouter {
        &self.dead_letters
    }

    /// Stop the consumer, wait for in-flight deliveries, then stop the broker.
    ///
    /// Returns the broker counters as they stood once the consumer had drained.
    pub async fn shutdown(self) -> Result<BrokerStats, RelayError> {
        info!("Shutting down order system");
        self.shutdown.cancel();
        let handled = self.consumer_handle.await?;

        let stats = self.broker.stats().await?;
        self.broker.shutdown().await;
        self.broker_handle.await?;

        info!(
            handled,
            acked = stats.acked,
            nacked = stats.nacked,
            dead_lettered = self.dead_letters.snapshot().values().sum::<u64>(),
            "Order system stopped"
        );
        Ok(stats)
    }
}
