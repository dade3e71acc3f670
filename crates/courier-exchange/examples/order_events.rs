//! Order events routed through a topic exchange
//!
//! ```bash
//! cargo run -p courier-exchange --example order_events
//! ```

use courier_config::{Config, ExchangeSettings};
use courier_exchange::metrics::ExchangeMetrics;
use courier_exchange::{Envelope, ExchangeRegistry, HandlerResult, Message};
use courier_observability::logging::create_exchange_span;
use courier_observability::prelude::*;
use serde_json::json;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::default();
    config.exchanges.push(ExchangeSettings::new("orders", "topic"));
    config.set_value("logging.level", "debug")?;

    let obs = Observability::from_courier_config(&config).await?;
    ExchangeMetrics::describe();

    let registry = ExchangeRegistry::from_config(&config)?;
    let orders = registry
        .get("orders")
        .ok_or_else(|| anyhow::anyhow!("orders exchange not declared"))?;

    orders.bind_queue("billing", "orders.*.created", |envelope: Envelope| async move {
        info!(order = %envelope.payload["id"], "Billing order");
        HandlerResult::Ok(())
    })?;

    orders.bind_queue("shipping", "orders.eu.*", |envelope: Envelope| async move {
        if envelope.payload["weight"].as_f64().unwrap_or_default() > 30.0 {
            anyhow::bail!("parcel too heavy for standard shipping");
        }
        info!(route = %envelope.route, "Shipping scheduled");
        HandlerResult::Ok(())
    })?;

    orders.subscribe("orders.*.*", |envelope: Envelope| async move {
        debug!(route = %envelope.route, id = %envelope.id, "Audit");
        HandlerResult::Ok(())
    })?;

    let span = create_exchange_span(orders.name(), orders.mode().as_str());
    orders
        .publish_all(vec![
            Message::new("orders.eu.created", json!({"id": 1, "weight": 2.5}))?,
            Message::new("orders.us.created", json!({"id": 2, "weight": 1.0}))?,
            Message::new("orders.eu.created", json!({"id": 3, "weight": 42.0}))?,
        ])
        .instrument(span)
        .await;

    info!(stats = ?orders.stats(), "Done");
    println!("{}", obs.render_metrics());
    obs.shutdown().await?;
    Ok(())
}
