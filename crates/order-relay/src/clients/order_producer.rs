//! # Order Producer
//!
//! The API an inbound endpoint would call: place an order (fire-and-forget),
//! list orders, and look a name up (both request/reply).

use crate::consumer::{FETCH_LOOKUP, FETCH_ORDERS, ORDER_PLACED};
use crate::model::{Accepted, LookupRequest, Order, OrderQuery};
use delivery_framework::{RequestError, RequestFacade};
use serde_json::Value;
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct OrderProducer {
    facade: RequestFacade,
}

impl OrderProducer {
    pub fn new(facade: RequestFacade) -> Self {
        Self { facade }
    }

    /// Publish `order` and return without waiting for the consumer.
    #[instrument(skip(self, order), fields(email = %order.email))]
    pub async fn place_order(&self, order: &Order) -> Result<Accepted, RequestError> {
        debug!(?order, "place_order called");
        self.facade.emit(ORDER_PLACED, order).await?;
        info!("Order placed");
        Ok(Accepted::order_placed())
    }

    #[instrument(skip(self))]
    pub async fn get_orders(&self) -> Result<Vec<Order>, RequestError> {
        self.facade.request(FETCH_ORDERS, &OrderQuery::default()).await
    }

    #[instrument(skip(self))]
    pub async fn get_lookup(&self, name: &str) -> Result<Value, RequestError> {
        self.facade
            .request(FETCH_LOOKUP, &LookupRequest::new(name))
            .await
    }
}
