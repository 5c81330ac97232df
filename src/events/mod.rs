use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Events emitted by the reservation engine.
///
/// Emission happens after the originating transaction commits; a failed send
/// degrades to a warning log and never fails the caller's operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation_id: Uuid,
        reservation_number: String,
        product_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        reference_type: String,
        reference_id: Option<Uuid>,
    },
    ReservationReleased {
        reservation_id: Uuid,
        quantity: i32,
        fully_released: bool,
    },
    ReservationCancelled {
        reservation_id: Uuid,
        unreleased_quantity: i32,
        reason: String,
    },
    ReservationExpired {
        reservation_id: Uuid,
        unreleased_quantity: i32,
        expired_at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    LowStockWarning {
        product_id: Uuid,
        location_id: Uuid,
        available_quantity: i32,
        requested_quantity: i32,
    },
    /// Operational row and movement log diverged; reconciliation repaired it.
    MovementLogGap {
        reservation_id: Uuid,
        expected_released: i32,
        logged_released: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Send with the degraded-path policy applied: the caller's operation
    /// already succeeded, so a delivery failure is logged, not returned.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Event delivery failed; operation already committed");
        }
    }
}

/// Creates a connected sender/receiver pair with the given channel capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Consumer loop logging every event. Embedding applications that fan events
/// out to webhooks or queues replace this with their own consumer.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::MovementLogGap {
                reservation_id,
                expected_released,
                logged_released,
            } => {
                warn!(
                    reservation_id = %reservation_id,
                    expected_released = expected_released,
                    logged_released = logged_released,
                    "Movement log gap detected"
                );
            }
            Event::LowStockWarning {
                product_id,
                location_id,
                available_quantity,
                requested_quantity,
            } => {
                warn!(
                    product_id = %product_id,
                    location_id = %location_id,
                    available = available_quantity,
                    requested = requested_quantity,
                    "Low stock headroom"
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }
}
