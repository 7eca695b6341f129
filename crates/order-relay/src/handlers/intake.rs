//! # Order Intake
//!
//! Owns the in-memory order book. Orders are only ever appended; the book
//! lives as long as the process.

use super::Sentinel;
use crate::model::{IntakeReceipt, Order, OrderQuery};
use async_trait::async_trait;
use delivery_framework::{FallibleTask, RawItem, TaskError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct OrderIntake {
    orders: Arc<RwLock<Vec<Order>>>,
    sentinel: Sentinel,
}

impl OrderIntake {
    pub fn new(sentinel: Sentinel) -> Self {
        Self {
            orders: Arc::new(RwLock::new(Vec::new())),
            sentinel,
        }
    }

    /// Store `order`, unless its email contains the sentinel.
    #[instrument(skip(self, order), fields(email = %order.email))]
    pub async fn process(&self, order: &Order) -> Result<IntakeReceipt, TaskError> {
        info!("Processing order");
        if self.sentinel.trips(&order.email) {
            return Err(TaskError::Failed("Simulated processing error".to_string()));
        }

        let mut orders = self.orders.write().await;
        orders.push(order.clone());
        debug!(size = orders.len(), "Order stored");
        Ok(IntakeReceipt::processed())
    }

    /// Snapshot of every order stored so far, in arrival order.
    pub async fn list(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }

    /// `payload` is the event as received; it is what gets dead-lettered.
    pub fn intake_task(&self, order: Order, payload: Value) -> IntakeTask {
        IntakeTask {
            intake: self.clone(),
            received: RawItem::new(order.email.clone(), payload),
            order,
        }
    }

    pub fn list_task(&self) -> ListOrdersTask {
        ListOrdersTask {
            intake: self.clone(),
            query: OrderQuery::default(),
        }
    }
}

/// `order-placed`: store one order.
pub struct IntakeTask {
    intake: OrderIntake,
    order: Order,
    received: RawItem,
}

#[async_trait]
impl FallibleTask for IntakeTask {
    type Item = RawItem;
    type Output = IntakeReceipt;

    fn item(&self) -> &RawItem {
        &self.received
    }

    async fn attempt(&self) -> Result<IntakeReceipt, TaskError> {
        self.intake.process(&self.order).await
    }
}

/// `fetch-orders`: read the order book.
pub struct ListOrdersTask {
    intake: OrderIntake,
    query: OrderQuery,
}

#[async_trait]
impl FallibleTask for ListOrdersTask {
    type Item = OrderQuery;
    type Output = Vec<Order>;

    fn item(&self) -> &OrderQuery {
        &self.query
    }

    async fn attempt(&self) -> Result<Vec<Order>, TaskError> {
        Ok(self.intake.list().await)
    }
}
