// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The client-facing store facade.
//!
//! [`StoreBuilder`] wires the three collaborators together and spawns the
//! driver task; [`Store`] is a cheap clonable handle. Every explicit call
//! resolves to a success or a typed error - never a hang: if the driver is
//! gone, the future resolves to the disposed error.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::catalog::{Catalog, ConfigProvider};
use crate::config::StoreOptions;
use crate::driver::{Command, Driver};
use crate::error::{FetchError, PurchaseError};
use crate::events::{EventPublisher, StoreEvent};
use crate::native::NativeBridge;
use crate::operation::FetchOutcome;
use crate::purchase::{FailedPurchase, PurchaseOutcome, PurchaseResult, ReceiptValidator};

/// Point-in-time view of the store published by the driver.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Whether the first orchestration run has succeeded.
    pub initialized: bool,
    /// Whether any operation is queued or running.
    pub busy: bool,
    /// The current catalog. Replaced wholesale, never mutated in place.
    pub catalog: Arc<Catalog>,
}

/// Builder for creating a [`Store`].
pub struct StoreBuilder {
    provider: Option<Arc<dyn ConfigProvider>>,
    validator: Option<Arc<dyn ReceiptValidator>>,
    bridge: Option<Arc<dyn NativeBridge>>,
    options: StoreOptions,
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("provider", &self.provider.as_ref().map(|_| "..."))
            .field("validator", &self.validator.as_ref().map(|_| "..."))
            .field("bridge", &self.bridge.as_ref().map(|_| "..."))
            .field("options", &self.options)
            .finish()
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            provider: None,
            validator: None,
            bridge: None,
            options: StoreOptions::default(),
        }
    }
}

impl StoreBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the product configuration provider (required).
    pub fn config_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the receipt validator (required).
    pub fn validator(mut self, validator: Arc<dyn ReceiptValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the native purchase capability (required).
    pub fn native_bridge(mut self, bridge: Arc<dyn NativeBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Override the default [`StoreOptions`].
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the store and spawn its driver task.
    ///
    /// Returns an error if a required collaborator is missing.
    pub fn build(self) -> Result<Store> {
        let provider = self
            .provider
            .ok_or_else(|| anyhow::anyhow!("config provider is required"))?;
        let validator = self
            .validator
            .ok_or_else(|| anyhow::anyhow!("receipt validator is required"))?;
        let bridge = self
            .bridge
            .ok_or_else(|| anyhow::anyhow!("native bridge is required"))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let events = EventPublisher::new(self.options.event_buffer);
        let (snapshot_tx, snapshot_rx) = watch::channel(StoreSnapshot {
            initialized: false,
            busy: false,
            catalog: Arc::new(Catalog::default()),
        });

        let driver = Driver::new(
            &self.options,
            provider,
            validator,
            bridge,
            command_rx,
            command_tx.clone(),
            events.clone(),
            snapshot_tx,
        );
        tokio::spawn(driver.run());

        info!(
            max_concurrent_purchases = self.options.max_concurrent_purchases,
            "store created"
        );
        Ok(Store {
            inner: Arc::new(StoreInner {
                commands: command_tx,
                events,
                snapshot: snapshot_rx,
            }),
        })
    }
}

struct StoreInner {
    commands: mpsc::UnboundedSender<Command>,
    events: EventPublisher,
    snapshot: watch::Receiver<StoreSnapshot>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        // Last facade handle gone: tear the driver down. Safe if dispose
        // already ran - the send just fails.
        let _ = self.commands.send(Command::Dispose { ack: None });
    }
}

/// Handle to a running store. Clonable; the driver is torn down when the
/// last clone is dropped or [`dispose`](Store::dispose) is called.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a new builder for configuring a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    // ========== Operations ==========

    /// Run the first orchestration: fetch configuration and initialize the
    /// native layer. Once a run has succeeded, later calls resolve
    /// immediately.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> FetchOutcome {
        self.initialize_inner(None).await
    }

    /// [`initialize`](Self::initialize) with a caller correlation token
    /// surfaced in the Initiated/Completed events.
    #[instrument(skip(self))]
    pub async fn initialize_with_token(&self, token: Uuid) -> FetchOutcome {
        self.initialize_inner(Some(token)).await
    }

    async fn initialize_inner(&self, token: Option<Uuid>) -> FetchOutcome {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Initialize {
                token,
                reply: Some(tx),
            })
            .map_err(|_| FetchError::StoreDisposed)?;
        rx.await.map_err(|_| FetchError::StoreDisposed)?
    }

    /// Refresh the catalog: fetch configuration and resolve products the
    /// catalog does not know yet.
    #[instrument(skip(self))]
    pub async fn fetch_additional_products(&self) -> FetchOutcome {
        self.fetch_inner(None).await
    }

    /// [`fetch_additional_products`](Self::fetch_additional_products) with
    /// a caller correlation token.
    #[instrument(skip(self))]
    pub async fn fetch_additional_products_with_token(&self, token: Uuid) -> FetchOutcome {
        self.fetch_inner(Some(token)).await
    }

    async fn fetch_inner(&self, token: Option<Uuid>) -> FetchOutcome {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::FetchAdditional {
                token,
                reply: Some(tx),
            })
            .map_err(|_| FetchError::StoreDisposed)?;
        rx.await.map_err(|_| FetchError::StoreDisposed)?
    }

    /// Purchase one product. The future resolves once the native purchase
    /// was processed, the receipt validated and the transaction confirmed -
    /// or with the typed error that stopped the pipeline.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn purchase(&self, product_id: &str) -> Result<PurchaseResult, FailedPurchase> {
        self.purchase_inner(product_id.to_string(), None).await
    }

    /// [`purchase`](Self::purchase) with a caller correlation token
    /// surfaced in the Initiated/Completed events.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn purchase_with_token(
        &self,
        product_id: &str,
        token: Uuid,
    ) -> Result<PurchaseResult, FailedPurchase> {
        self.purchase_inner(product_id.to_string(), Some(token))
            .await
    }

    async fn purchase_inner(&self, product_id: String, token: Option<Uuid>) -> PurchaseOutcome {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Purchase {
                token,
                product_id,
                reply: Some(tx),
            })
            .map_err(|_| FailedPurchase::new(PurchaseError::StoreDisposed))?;
        rx.await
            .map_err(|_| FailedPurchase::new(PurchaseError::StoreDisposed))?
    }

    // ========== Queries ==========

    /// Whether the first orchestration run has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.inner.snapshot.borrow().initialized
    }

    /// Whether any operation is queued or running.
    pub fn is_busy(&self) -> bool {
        self.inner.snapshot.borrow().busy
    }

    /// The current catalog snapshot.
    pub fn products(&self) -> Arc<Catalog> {
        Arc::clone(&self.inner.snapshot.borrow().catalog)
    }

    /// The full point-in-time view.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    // ========== Events ==========

    /// Subscribe to Initiated/Completed notifications, including the pairs
    /// produced by restored purchases that have no caller future.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    // ========== Teardown ==========

    /// Tear the store down: every queued and running operation is forced
    /// into a disposed terminal state and no further native calls are
    /// issued. Idempotent and safe to call while operations are in any
    /// state.
    #[instrument(skip(self))]
    pub async fn dispose(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .commands
            .send(Command::Dispose { ack: Some(tx) })
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.snapshot.borrow();
        f.debug_struct("Store")
            .field("initialized", &snapshot.initialized)
            .field("busy", &snapshot.busy)
            .field("products", &snapshot.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_missing_collaborators() {
        let result = StoreBuilder::new().build();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("config provider is required")
        );
    }

    #[test]
    fn test_builder_debug_hides_collaborators() {
        let builder = StoreBuilder::new();
        let debug_str = format!("{:?}", builder);
        assert!(debug_str.contains("StoreBuilder"));
        assert!(debug_str.contains("options"));
    }
}
