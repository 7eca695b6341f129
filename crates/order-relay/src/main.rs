//! # Order Relay Demo
//!
//! Starts the relay with [`RelayConfig::load`] and walks through the main
//! scenarios: a clean order, a failing order, the order listing and a lookup.
//!
//! ```bash
//! RUST_LOG=info RELAY__RETRY__BASE_DELAY_MS=200 cargo run -p order-relay
//! ```

use delivery_framework::tracing::setup_tracing;
use order_relay::config::RelayConfig;
use order_relay::lifecycle::OrderSystem;
use order_relay::model::Order;
use order_relay::RelayError;
use std::time::Duration;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    setup_tracing();

    let config = RelayConfig::load()?;
    info!(?config, "Starting order relay");
    let system = OrderSystem::start(config).await?;

    let span = tracing::info_span!("order_placement");
    async {
        for email in ["ok@x.com", "error@x.com"] {
            let order = Order::new(email, "widget", 1);
            match system.producer.place_order(&order).await {
                Ok(accepted) => info!(email, message = %accepted.message, "Accepted"),
                Err(e) => error!(email, error = %e, "Place order failed"),
            }
        }
    }
    .instrument(span)
    .await;

    // Give the intake a moment before listing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    match system.producer.get_orders().await {
        Ok(orders) => info!(count = orders.len(), ?orders, "Orders"),
        Err(e) => error!(error = %e, "Listing failed"),
    }

    let span = tracing::info_span!("lookup");
    async {
        for name in ["pikachu", "error-mon"] {
            match system.producer.get_lookup(name).await {
                Ok(body) => info!(name, id = %body["id"], "Lookup succeeded"),
                Err(e) => error!(name, error = %e, "Lookup failed"),
            }
        }
    }
    .instrument(span)
    .await;

    let stats = system.shutdown().await?;
    info!(?stats, "Application completed successfully");
    Ok(())
}
