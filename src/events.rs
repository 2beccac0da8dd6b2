use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::entities::order::OrderStatus;

/// Events emitted by the order services after a state change has been
/// durably committed. Consumers (the processing loop below, tests) never
/// see an event for work that later rolled back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderSubmitted {
        order_number: i64,
        customer_code: String,
        total: rust_decimal::Decimal,
        occurred_at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_number: i64,
        old_status: OrderStatus,
        new_status: OrderStatus,
        occurred_at: DateTime<Utc>,
    },
    OrderPostedToErp {
        order_number: i64,
        erp_document_no: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Event {
    pub fn order_submitted(order_number: i64, customer_code: &str, total: rust_decimal::Decimal) -> Self {
        Event::OrderSubmitted {
            order_number,
            customer_code: customer_code.to_string(),
            total,
            occurred_at: Utc::now(),
        }
    }

    pub fn order_status_changed(order_number: i64, old_status: OrderStatus, new_status: OrderStatus) -> Self {
        Event::OrderStatusChanged {
            order_number,
            old_status,
            new_status,
            occurred_at: Utc::now(),
        }
    }

    pub fn order_posted_to_erp(order_number: i64, erp_document_no: &str) -> Self {
        Event::OrderPostedToErp {
            order_number,
            erp_document_no: erp_document_no.to_string(),
            occurred_at: Utc::now(),
        }
    }
}

/// Cloneable sending half handed to every service.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Builds the channel both halves of the event pipeline hang off.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel for the lifetime of the process. Runs as a
/// dedicated tokio task spawned at startup; exits when every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    tracing::info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderSubmitted {
                order_number,
                customer_code,
                total,
                ..
            } => {
                tracing::info!(
                    order_number,
                    customer = %customer_code,
                    total = %total,
                    "Order submitted"
                );
            }
            Event::OrderStatusChanged {
                order_number,
                old_status,
                new_status,
                ..
            } => {
                tracing::info!(
                    order_number,
                    from = %old_status,
                    to = %new_status,
                    "Order status changed"
                );
            }
            Event::OrderPostedToErp {
                order_number,
                erp_document_no,
                ..
            } => {
                tracing::info!(
                    order_number,
                    erp_document = %erp_document_no,
                    "Order posted to ERP"
                );
            }
        }
        metrics::counter!("salesdesk_events.processed", 1);
    }
    tracing::info!("Event processing loop stopped");
}
