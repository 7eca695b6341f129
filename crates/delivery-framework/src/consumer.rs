//! # Consumer Loop
//!
//! Pulls deliveries off a subscription and hands each one to a [`Dispatch`]
//! implementation on its own task, so a delivery sitting in a backoff wait
//! never blocks the ones behind it.
//!
//! When a delivery carries a correlation id, whatever the dispatcher returns
//! is sent back as the reply. Settlement is the dispatcher's business.
//!
//! The loop stops when the shutdown token fires or the subscription closes.
//! Deliveries already handed out are awaited before [`Consumer::run`] returns.

use crate::delivery::{Delivery, Reply};
use crate::transport::Channel;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Routes one delivery to its handler and settles it.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, delivery: Delivery) -> Reply;
}

pub struct Consumer<D> {
    name: String,
    dispatcher: Arc<D>,
    channel: Arc<dyn Channel>,
    shutdown: CancellationToken,
}

impl<D: Dispatch> Consumer<D> {
    pub fn new(
        name: impl Into<String>,
        dispatcher: Arc<D>,
        channel: Arc<dyn Channel>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            dispatcher,
            channel,
            shutdown,
        }
    }

    /// Consume until shutdown. Returns the number of deliveries handled.
    pub async fn run(self, mut deliveries: mpsc::UnboundedReceiver<Delivery>) -> u64 {
        info!(consumer = %self.name, "Consumer started");
        let mut in_flight = JoinSet::new();
        let mut handled = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = done {
                        error!(consumer = %self.name, error = %e, "Delivery task failed");
                    }
                }
                next = deliveries.recv() => match next {
                    Some(delivery) => {
                        handled += 1;
                        self.spawn(&mut in_flight, delivery);
                    }
                    None => break,
                },
            }
        }

        let draining = in_flight.len();
        if draining > 0 {
            debug!(consumer = %self.name, draining, "Waiting for in-flight deliveries");
        }
        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                error!(consumer = %self.name, error = %e, "Delivery task failed");
            }
        }

        info!(consumer = %self.name, handled, "Consumer stopped");
        handled
    }

    fn spawn(&self, in_flight: &mut JoinSet<()>, delivery: Delivery) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let channel = Arc::clone(&self.channel);
        let correlation_id = delivery.envelope.correlation_id;
        debug!(
            pattern = %delivery.envelope.pattern,
            tag = delivery.handle.tag(),
            redelivered = delivery.handle.redelivered(),
            "Received"
        );

        in_flight.spawn(async move {
            let reply = dispatcher.dispatch(delivery).await;
            if let Some(correlation_id) = correlation_id {
                if let Err(e) = channel.reply(correlation_id, reply).await {
                    warn!(correlation_id, error = %e, "Reply not delivered");
                }
            }
        });
    }
}
