use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Events emitted by the services after a successful state change.
///
/// Emission is fire-and-forget. A failed send never rolls back the write
/// that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Product events
    ProductCreated(Uuid),

    // BOM events
    BomCreated {
        bom_id: Uuid,
        product_id: Uuid,
        version: i32,
    },
    BomUpdated {
        bom_id: Uuid,
        product_id: Uuid,
    },
    BomActivated {
        bom_id: Uuid,
        product_id: Uuid,
    },
    BomCostRolledUp {
        bom_id: Uuid,
        total_cost: Decimal,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Used on paths where the write has already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("Event emission failed: {}", e);
            counter!("bomworks_events.dropped", 1);
        }
    }
}

/// Processes incoming events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::ProductCreated(product_id) => {
                info!("Product created: {}", product_id);
                counter!("bomworks_events.product_created", 1);
            }
            Event::BomCreated {
                bom_id,
                product_id,
                version,
            } => {
                info!(
                    "BOM created: bom_id={} product_id={} version={}",
                    bom_id, product_id, version
                );
                counter!("bomworks_events.bom_created", 1);
            }
            Event::BomUpdated { bom_id, product_id } => {
                info!("BOM updated: bom_id={} product_id={}", bom_id, product_id);
                counter!("bomworks_events.bom_updated", 1);
            }
            Event::BomActivated { bom_id, product_id } => {
                info!("BOM activated: bom_id={} product_id={}", bom_id, product_id);
                counter!("bomworks_events.bom_activated", 1);
            }
            Event::BomCostRolledUp { bom_id, total_cost } => {
                info!(
                    "BOM cost rolled up: bom_id={} total_cost={}",
                    bom_id, total_cost
                );
                counter!("bomworks_events.bom_cost_rolled_up", 1);
            }
            Event::Generic { message, .. } => {
                info!("Generic event: {}", message);
            }
        }
    }

    info!("Event processing loop stopped");
}
