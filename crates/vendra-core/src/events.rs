// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The event-subscriber surface.
//!
//! Every operation produces exactly one Initiated and one terminal
//! Completed event, restored purchases included - those have no caller
//! future, so the event surface is the only place they are observable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::operation::{FetchOutcome, OperationId};
use crate::purchase::PurchaseOutcome;

/// A notification published on the store's broadcast channel.
///
/// One tagged success-or-failure payload per operation kind; the outcome
/// types are the same ones the caller's future resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StoreEvent {
    /// An Initialize operation was created.
    InitializeInitiated {
        /// Operation identity.
        id: OperationId,
        /// Caller-supplied correlation token, if any.
        token: Option<Uuid>,
        /// Publication time.
        at: DateTime<Utc>,
    },
    /// An Initialize operation reached a terminal state.
    InitializeCompleted {
        /// Operation identity.
        id: OperationId,
        /// Caller-supplied correlation token, if any.
        token: Option<Uuid>,
        /// Success or classified failure.
        outcome: FetchOutcome,
        /// Publication time.
        at: DateTime<Utc>,
    },
    /// A Fetch operation was created.
    FetchInitiated {
        /// Operation identity.
        id: OperationId,
        /// Caller-supplied correlation token, if any.
        token: Option<Uuid>,
        /// Publication time.
        at: DateTime<Utc>,
    },
    /// A Fetch operation reached a terminal state.
    FetchCompleted {
        /// Operation identity.
        id: OperationId,
        /// Caller-supplied correlation token, if any.
        token: Option<Uuid>,
        /// Success or classified failure.
        outcome: FetchOutcome,
        /// Publication time.
        at: DateTime<Utc>,
    },
    /// A purchase operation was created - published before admission, so
    /// observers always see the Initiated/Completed pair in order.
    PurchaseInitiated {
        /// Operation identity.
        id: OperationId,
        /// Caller-supplied correlation token, if any.
        token: Option<Uuid>,
        /// The product being purchased.
        product_id: String,
        /// True for synthesized restored purchases.
        restored: bool,
        /// Publication time.
        at: DateTime<Utc>,
    },
    /// A purchase operation reached a terminal state.
    PurchaseCompleted {
        /// Operation identity.
        id: OperationId,
        /// Caller-supplied correlation token, if any.
        token: Option<Uuid>,
        /// The product that was being purchased.
        product_id: String,
        /// True for synthesized restored purchases.
        restored: bool,
        /// Result or classified failure - the same value the caller's
        /// future resolves to, when there is one.
        outcome: PurchaseOutcome,
        /// Publication time.
        at: DateTime<Utc>,
    },
}

impl StoreEvent {
    /// The id of the operation this event describes.
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::InitializeInitiated { id, .. }
            | Self::InitializeCompleted { id, .. }
            | Self::FetchInitiated { id, .. }
            | Self::FetchCompleted { id, .. }
            | Self::PurchaseInitiated { id, .. }
            | Self::PurchaseCompleted { id, .. } => *id,
        }
    }

    /// Whether this is a terminal (Completed) event.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            Self::InitializeCompleted { .. }
                | Self::FetchCompleted { .. }
                | Self::PurchaseCompleted { .. }
        )
    }
}

/// Publisher half of the event surface. Publishing never blocks the store
/// driver; a store with no subscribers is normal.
#[derive(Clone)]
pub(crate) struct EventPublisher {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventPublisher {
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        trace!(operation_id = %event.operation_id(), completed = event.is_completed(), "store event");
        // Err just means no subscriber is listening right now
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(4);
        publisher.publish(StoreEvent::InitializeInitiated {
            id: OperationId::new(OperationKind::Initialize, 1),
            token: None,
            at: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_pair() {
        let publisher = EventPublisher::new(4);
        let mut rx = publisher.subscribe();

        let id = OperationId::new(OperationKind::Purchase, 3);
        publisher.publish(StoreEvent::PurchaseInitiated {
            id,
            token: None,
            product_id: "sku1".to_string(),
            restored: true,
            at: Utc::now(),
        });
        publisher.publish(StoreEvent::PurchaseCompleted {
            id,
            token: None,
            product_id: "sku1".to_string(),
            restored: true,
            outcome: Err(crate::FailedPurchase::new(
                crate::PurchaseError::ReceiptNullOrEmpty,
            )),
            at: Utc::now(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.operation_id(), id);
        assert!(!first.is_completed());
        assert!(second.is_completed());
    }

    #[test]
    fn test_event_serializes() {
        let event = StoreEvent::FetchCompleted {
            id: OperationId::new(OperationKind::Fetch, 2),
            token: Some(Uuid::new_v4()),
            outcome: Err(crate::FetchError::NoProductsAvailable),
            at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("FetchCompleted"));
        assert!(json.contains("NoProductsAvailable"));
    }
}
