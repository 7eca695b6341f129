use delivery_framework::WorkItem;
use serde::{Deserialize, Serialize};

/// A customer order, published on `order-placed`.
///
/// The email doubles as the identity: it keys the dead-letter counter and is
/// where the intake looks for the failure sentinel. Optional fields get
/// defaults here, but a dead-lettered order is forwarded as it was received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub email: String,
    #[serde(default)]
    pub product: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl Order {
    pub fn new(email: impl Into<String>, product: impl Into<String>, quantity: u32) -> Self {
        Self {
            email: email.into(),
            product: product.into(),
            quantity,
        }
    }
}

/// Payload of the `fetch-orders` command. It carries nothing.
///
/// Listing never dead-letters, so the shared identity below never keys a
/// retry counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {}

impl WorkItem for OrderQuery {
    fn identity(&self) -> &str {
        "fetch-orders"
    }
}

/// Returned to the producer as soon as an order event is on the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    pub message: String,
}

impl Accepted {
    pub fn order_placed() -> Self {
        Self {
            message: "Order Placed!".to_string(),
        }
    }
}

/// What the intake reports for a stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeReceipt {
    pub message: String,
}

impl IntakeReceipt {
    pub fn processed() -> Self {
        Self {
            message: "Order processed successfully".to_string(),
        }
    }
}
