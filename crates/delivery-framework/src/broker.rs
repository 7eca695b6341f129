//! # In-Process Broker
//!
//! `BrokerActor` is the server half of the broker: it owns every queue, the
//! set of unacknowledged deliveries and the reply slots of pending requests,
//! and processes [`BrokerRequest`]s one at a time. Because the actor is the
//! only owner of that state, nothing in here needs a lock.
//!
//! Semantics follow an AMQP broker with one consumer per queue:
//!
//! * Messages published before a consumer subscribes are buffered.
//! * Every hand-over gets a fresh delivery tag. The message stays in the
//!   unacked set until the tag is acked or nacked; settling an unknown (or
//!   already settled) tag fails with [`BrokerError::UnknownDeliveryTag`].
//! * `nack(requeue = true)` puts the message at the back of its queue, marked
//!   as redelivered. With a `delivery_limit`, a message that has already been
//!   requeued that many times is dropped instead.
//! * Replies are matched to requests by correlation id. A reply to a request
//!   whose caller gave up (or that was already answered) is discarded.

use crate::client::BrokerClient;
use crate::delivery::{Delivery, DeliveryHandle, Envelope, Reply};
use crate::error::BrokerError;
use crate::message::BrokerRequest;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Counters exposed through [`BrokerClient::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub requeued: u64,
    /// Messages removed without an ack: nacked without requeue, or over the delivery limit.
    pub dropped: u64,
}

#[derive(Debug)]
struct StoredMessage {
    queue: String,
    envelope: Envelope,
    redeliveries: u32,
}

pub struct BrokerActor {
    receiver: mpsc::Receiver<BrokerRequest>,
    // Weak so that the actor alone does not keep its channel open.
    sender: mpsc::WeakSender<BrokerRequest>,
    queues: HashMap<String, VecDeque<StoredMessage>>,
    consumers: HashMap<String, mpsc::UnboundedSender<Delivery>>,
    unacked: HashMap<u64, StoredMessage>,
    pending_replies: HashMap<u64, oneshot::Sender<Reply>>,
    next_tag: u64,
    next_correlation_id: u64,
    delivery_limit: Option<u32>,
    stats: BrokerStats,
}

impl BrokerActor {
    /// Creates a new `BrokerActor` and its associated `BrokerClient`.
    ///
    /// # Arguments
    ///
    /// * `buffer_size` - Capacity of the request channel. When it is full,
    ///   client calls wait for space.
    /// * `delivery_limit` - How many times a message may be requeued before
    ///   the broker drops it. `None` requeues forever.
    pub fn new(buffer_size: usize, delivery_limit: Option<u32>) -> (Self, BrokerClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            sender: sender.downgrade(),
            queues: HashMap::new(),
            consumers: HashMap::new(),
            unacked: HashMap::new(),
            pending_replies: HashMap::new(),
            next_tag: 1,
            next_correlation_id: 1,
            delivery_limit,
            stats: BrokerStats::default(),
        };
        (actor, BrokerClient::new(sender))
    }

    /// Runs the broker loop until every client is dropped or `Shutdown` arrives.
    pub async fn run(mut self) {
        info!(delivery_limit = ?self.delivery_limit, "Broker started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                BrokerRequest::Publish {
                    queue,
                    envelope,
                    respond_to,
                } => {
                    debug!(%queue, pattern = %envelope.pattern, "Publish");
                    self.enqueue(queue, envelope);
                    let _ = respond_to.send(Ok(()));
                }
                BrokerRequest::Send {
                    queue,
                    pattern,
                    payload,
                    reply_to,
                    respond_to,
                } => {
                    // Forget requests whose callers already gave up.
                    self.pending_replies.retain(|_, slot| !slot.is_closed());

                    let correlation_id = self.next_correlation_id;
                    self.next_correlation_id += 1;
                    debug!(%queue, %pattern, correlation_id, "Send");

                    self.pending_replies.insert(correlation_id, reply_to);
                    self.enqueue(
                        queue,
                        Envelope {
                            pattern,
                            payload,
                            correlation_id: Some(correlation_id),
                        },
                    );
                    let _ = respond_to.send(Ok(correlation_id));
                }
                BrokerRequest::Subscribe { queue, respond_to } => {
                    let taken = self
                        .consumers
                        .get(&queue)
                        .is_some_and(|consumer| !consumer.is_closed());
                    if taken {
                        warn!(%queue, "Subscribe rejected, queue already has a consumer");
                        let _ = respond_to.send(Err(BrokerError::AlreadySubscribed(queue)));
                        continue;
                    }
                    let (consumer, deliveries) = mpsc::unbounded_channel();
                    self.consumers.insert(queue.clone(), consumer);
                    info!(%queue, "Consumer subscribed");
                    let _ = respond_to.send(Ok(deliveries));
                    self.dispatch(&queue);
                }
                BrokerRequest::Ack { tag, respond_to } => {
                    let result = match self.unacked.remove(&tag) {
                        Some(message) => {
                            self.stats.acked += 1;
                            debug!(tag, queue = %message.queue, "Ack");
                            Ok(())
                        }
                        None => {
                            warn!(tag, "Ack for unknown delivery tag");
                            Err(BrokerError::UnknownDeliveryTag(tag))
                        }
                    };
                    let _ = respond_to.send(result);
                }
                BrokerRequest::Nack {
                    tag,
                    requeue,
                    respond_to,
                } => {
                    let result = match self.unacked.remove(&tag) {
                        Some(message) => {
                            self.stats.nacked += 1;
                            debug!(tag, queue = %message.queue, requeue, "Nack");
                            self.settle_rejected(message, requeue);
                            Ok(())
                        }
                        None => {
                            warn!(tag, "Nack for unknown delivery tag");
                            Err(BrokerError::UnknownDeliveryTag(tag))
                        }
                    };
                    let _ = respond_to.send(result);
                }
                BrokerRequest::Reply {
                    correlation_id,
                    reply,
                    respond_to,
                } => {
                    match self.pending_replies.remove(&correlation_id) {
                        Some(slot) => {
                            if slot.send(reply).is_err() {
                                debug!(correlation_id, "Requester gone, reply discarded");
                            }
                        }
                        None => debug!(correlation_id, "No pending request, reply discarded"),
                    }
                    let _ = respond_to.send(Ok(()));
                }
                BrokerRequest::Stats { respond_to } => {
                    let _ = respond_to.send(Ok(self.stats.clone()));
                }
                BrokerRequest::Shutdown => break,
            }
        }

        info!(
            unacked = self.unacked.len(),
            pending_replies = self.pending_replies.len(),
            "Broker shutdown"
        );
    }

    fn enqueue(&mut self, queue: String, envelope: Envelope) {
        self.stats.published += 1;
        self.queues
            .entry(queue.clone())
            .or_default()
            .push_back(StoredMessage {
                queue: queue.clone(),
                envelope,
                redeliveries: 0,
            });
        self.dispatch(&queue);
    }

    fn settle_rejected(&mut self, mut message: StoredMessage, requeue: bool) {
        if !requeue {
            self.stats.dropped += 1;
            self.forget_reply(&message.envelope);
            return;
        }
        if self
            .delivery_limit
            .is_some_and(|limit| message.redeliveries >= limit)
        {
            warn!(
                queue = %message.queue,
                pattern = %message.envelope.pattern,
                redeliveries = message.redeliveries,
                "Delivery limit reached, message dropped"
            );
            self.stats.dropped += 1;
            self.forget_reply(&message.envelope);
            return;
        }
        message.redeliveries += 1;
        self.stats.requeued += 1;
        let queue = message.queue.clone();
        self.queues.entry(queue.clone()).or_default().push_back(message);
        self.dispatch(&queue);
    }

    fn forget_reply(&mut self, envelope: &Envelope) {
        if let Some(correlation_id) = envelope.correlation_id {
            self.pending_replies.remove(&correlation_id);
        }
    }

    /// Hand queued messages of `queue` to its consumer, if it has one.
    fn dispatch(&mut self, queue: &str) {
        let Some(consumer) = self.consumers.get(queue).cloned() else {
            return;
        };
        let Some(sender) = self.sender.upgrade() else {
            return;
        };
        let channel = Arc::new(BrokerClient::new(sender));

        while let Some(message) = self.queues.get_mut(queue).and_then(VecDeque::pop_front) {
            let tag = self.next_tag;
            self.next_tag += 1;

            let delivery = Delivery {
                envelope: message.envelope.clone(),
                handle: DeliveryHandle::new(tag, message.redeliveries > 0, channel.clone()),
            };
            if consumer.send(delivery).is_err() {
                warn!(%queue, "Consumer gone, keeping message queued");
                self.consumers.remove(queue);
                if let Some(pending) = self.queues.get_mut(queue) {
                    pending.push_front(message);
                }
                return;
            }
            self.stats.delivered += 1;
            self.unacked.insert(tag, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Channel, Publisher, Requester, Subscriber};
    use serde_json::json;

    fn start(delivery_limit: Option<u32>) -> BrokerClient {
        let (actor, client) = BrokerActor::new(16, delivery_limit);
        tokio::spawn(actor.run());
        client
    }

    #[tokio::test]
    async fn buffers_until_a_consumer_subscribes() {
        let client = start(None);
        client
            .publish("orders", "order-placed", json!({"email": "a@x.com"}))
            .await
            .unwrap();

        let mut deliveries = client.subscribe("orders").await.unwrap();
        let delivery = deliveries.recv().await.unwrap();

        assert_eq!(delivery.envelope.pattern, "order-placed");
        assert_eq!(delivery.envelope.payload, json!({"email": "a@x.com"}));
        assert!(!delivery.handle.redelivered());
        delivery.handle.ack().await.unwrap();

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.acked, 1);
    }

    #[tokio::test]
    async fn second_consumer_is_rejected() {
        let client = start(None);
        let _first = client.subscribe("orders").await.unwrap();
        let second = client.subscribe("orders").await;
        assert_eq!(
            second.unwrap_err(),
            BrokerError::AlreadySubscribed("orders".into())
        );
    }

    #[tokio::test]
    async fn settling_a_tag_twice_fails() {
        let client = start(None);
        let mut deliveries = client.subscribe("orders").await.unwrap();
        client.publish("orders", "order-placed", json!({})).await.unwrap();

        let tag = deliveries.recv().await.unwrap().handle.tag();
        client.ack(tag).await.unwrap();
        assert_eq!(
            client.ack(tag).await.unwrap_err(),
            BrokerError::UnknownDeliveryTag(tag)
        );
        assert_eq!(
            client.nack(tag, true).await.unwrap_err(),
            BrokerError::UnknownDeliveryTag(tag)
        );
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers() {
        let client = start(None);
        let mut deliveries = client.subscribe("orders").await.unwrap();
        client.publish("orders", "order-placed", json!(1)).await.unwrap();

        let first = deliveries.recv().await.unwrap();
        let first_tag = first.handle.tag();
        first.handle.nack(true).await.unwrap();

        let second = deliveries.recv().await.unwrap();
        assert!(second.handle.redelivered());
        assert_ne!(second.handle.tag(), first_tag);
        assert_eq!(second.envelope.payload, json!(1));
        second.handle.ack().await.unwrap();

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.acked, 1);
    }

    #[tokio::test]
    async fn delivery_limit_drops_message() {
        let client = start(Some(1));
        let mut deliveries = client.subscribe("orders").await.unwrap();
        client.publish("orders", "order-placed", json!(1)).await.unwrap();

        deliveries.recv().await.unwrap().handle.nack(true).await.unwrap();
        deliveries.recv().await.unwrap().handle.nack(true).await.unwrap();

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.dropped, 1);
        assert!(deliveries.try_recv().is_err());
    }

    #[tokio::test]
    async fn reply_reaches_requester() {
        let client = start(None);
        let mut deliveries = client.subscribe("orders").await.unwrap();

        let reply = client.send("orders", "fetch-orders", json!({})).await.unwrap();
        let delivery = deliveries.recv().await.unwrap();
        let correlation_id = delivery.envelope.correlation_id.unwrap();
        delivery.handle.ack().await.unwrap();
        client.reply(correlation_id, Ok(json!(["a"]))).await.unwrap();

        assert_eq!(reply.await.unwrap(), Ok(json!(["a"])));
    }

    #[tokio::test]
    async fn reply_to_abandoned_request_is_discarded() {
        let client = start(None);
        let mut deliveries = client.subscribe("orders").await.unwrap();

        let reply = client.send("orders", "fetch-orders", json!({})).await.unwrap();
        drop(reply);

        let delivery = deliveries.recv().await.unwrap();
        let correlation_id = delivery.envelope.correlation_id.unwrap();
        client.reply(correlation_id, Ok(json!([]))).await.unwrap();
        // Answering twice is harmless as well.
        client.reply(correlation_id, Ok(json!([]))).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_request_closes_reply_slot() {
        let client = start(None);
        let mut deliveries = client.subscribe("orders").await.unwrap();

        let reply = client.send("orders", "fetch-pokemon", json!({"name": "x"})).await.unwrap();
        deliveries.recv().await.unwrap().handle.nack(false).await.unwrap();

        assert!(reply.await.is_err());
    }

    #[tokio::test]
    async fn shutdown_stops_broker_while_clients_live() {
        let (actor, client) = BrokerActor::new(4, None);
        let handle = tokio::spawn(actor.run());
        client.shutdown().await;
        handle.await.unwrap();
        assert_eq!(client.stats().await.unwrap_err(), BrokerError::BrokerClosed);
    }
}
