// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The store driver - the single owner context.
//!
//! All mutable store state lives on one spawned task. Facade calls,
//! collaborator continuations and native callbacks are marshaled here as
//! commands on one unbounded channel, so state transitions, event
//! publication and native confirm calls are never raced. Collaborator
//! calls (config provider, receipt validator) run on their own tasks and
//! report back as commands; a panic over there becomes a classified
//! failure here, never a stuck operation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{self, NativeCallbacks, NativeSignal};
use crate::catalog::{Catalog, CatalogConfig, ConfigProvider, ProductEntry};
use crate::config::StoreOptions;
use crate::error::{FetchError, PurchaseError};
use crate::events::{EventPublisher, StoreEvent};
use crate::native::{NativeBridge, NativePurchase};
use crate::operation::{
    CompletionState, ConfigOperation, ConfigPhase, FetchOutcome, OperationId, OperationKind,
};
use crate::purchase::{
    FailedPurchase, PurchaseOperation, PurchaseOutcome, PurchasePhase, PurchaseResult,
    ReceiptValidator, Transaction, ValidationResult,
};
use crate::queue::AdmissionQueue;
use crate::registry::OperationRegistry;
use crate::store::StoreSnapshot;

/// A unit of work marshaled onto the driver task.
pub(crate) enum Command {
    Initialize {
        token: Option<Uuid>,
        reply: Option<oneshot::Sender<FetchOutcome>>,
    },
    FetchAdditional {
        token: Option<Uuid>,
        reply: Option<oneshot::Sender<FetchOutcome>>,
    },
    Purchase {
        token: Option<Uuid>,
        product_id: String,
        reply: Option<oneshot::Sender<PurchaseOutcome>>,
    },
    ConfigReady {
        id: OperationId,
        result: Result<CatalogConfig, String>,
    },
    ValidationDone {
        id: OperationId,
        verdict: Result<Option<ValidationResult>, String>,
    },
    Native(NativeSignal),
    Dispose {
        ack: Option<oneshot::Sender<()>>,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialize { .. } => "Initialize",
            Self::FetchAdditional { .. } => "FetchAdditional",
            Self::Purchase { .. } => "Purchase",
            Self::ConfigReady { .. } => "ConfigReady",
            Self::ValidationDone { .. } => "ValidationDone",
            Self::Native(_) => "Native",
            Self::Dispose { .. } => "Dispose",
        };
        f.write_str(name)
    }
}

pub(crate) struct Driver {
    provider: Arc<dyn ConfigProvider>,
    validator: Arc<dyn ReceiptValidator>,
    bridge: Arc<dyn NativeBridge>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Clone handed to spawned continuations and the callback adapter.
    loopback: mpsc::UnboundedSender<Command>,
    registry: OperationRegistry,
    queue: AdmissionQueue,
    events: EventPublisher,
    snapshot: watch::Sender<StoreSnapshot>,
    catalog: Arc<Catalog>,
    /// First-orchestration-run marker: cleared by the first successful
    /// Initialize; later Initialize calls resolve immediately.
    initialized: bool,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: &StoreOptions,
        provider: Arc<dyn ConfigProvider>,
        validator: Arc<dyn ReceiptValidator>,
        bridge: Arc<dyn NativeBridge>,
        commands: mpsc::UnboundedReceiver<Command>,
        loopback: mpsc::UnboundedSender<Command>,
        events: EventPublisher,
        snapshot: watch::Sender<StoreSnapshot>,
    ) -> Self {
        Self {
            provider,
            validator,
            bridge,
            commands,
            loopback,
            registry: OperationRegistry::new(),
            queue: AdmissionQueue::new(options.max_concurrent_purchases),
            events,
            snapshot,
            catalog: Arc::new(Catalog::default()),
            initialized: false,
        }
    }

    /// Process commands until disposal (or until every handle is gone).
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Dispose { ack } => {
                    self.dispose();
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                    break;
                }
                command => self.handle(command).await,
            }
        }
        debug!("store driver stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Initialize { token, reply } => self.handle_initialize(token, reply).await,
            Command::FetchAdditional { token, reply } => self.handle_fetch(token, reply).await,
            Command::Purchase {
                token,
                product_id,
                reply,
            } => self.handle_purchase(token, product_id, reply).await,
            Command::ConfigReady { id, result } => self.handle_config_ready(id, result).await,
            Command::ValidationDone { id, verdict } => {
                self.handle_validation_done(id, verdict).await
            }
            Command::Native(signal) => self.handle_native(signal).await,
            Command::Dispose { .. } => unreachable!("dispose handled by run()"),
        }
    }

    // ========== Client requests ==========

    async fn handle_initialize(
        &mut self,
        token: Option<Uuid>,
        reply: Option<oneshot::Sender<FetchOutcome>>,
    ) {
        let id = self.registry.alloc(OperationKind::Initialize);
        self.events.publish(StoreEvent::InitializeInitiated {
            id,
            token,
            at: Utc::now(),
        });

        if self.initialized {
            // Already-completed operation: the first successful run cleared
            // the marker
            self.events.publish(StoreEvent::InitializeCompleted {
                id,
                token,
                outcome: Ok(()),
                at: Utc::now(),
            });
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        self.registry
            .insert_config(ConfigOperation::new(id, token, reply));
        if self.queue.submit(id) {
            self.start_ops(vec![id]).await;
        }
        self.push_snapshot();
    }

    async fn handle_fetch(
        &mut self,
        token: Option<Uuid>,
        reply: Option<oneshot::Sender<FetchOutcome>>,
    ) {
        let id = self.registry.alloc(OperationKind::Fetch);
        self.events.publish(StoreEvent::FetchInitiated {
            id,
            token,
            at: Utc::now(),
        });

        let mut to_start = self.submit_auto_initialize();
        self.registry
            .insert_config(ConfigOperation::new(id, token, reply));
        if self.queue.submit(id) {
            to_start.push(id);
        }
        self.start_ops(to_start).await;
    }

    async fn handle_purchase(
        &mut self,
        token: Option<Uuid>,
        product_id: String,
        reply: Option<oneshot::Sender<PurchaseOutcome>>,
    ) {
        let id = self.registry.alloc(OperationKind::Purchase);
        self.events.publish(StoreEvent::PurchaseInitiated {
            id,
            token,
            product_id: product_id.clone(),
            restored: false,
            at: Utc::now(),
        });

        if self.registry.has_pending_purchase_for(&product_id) {
            let failure = FailedPurchase::new(PurchaseError::ExistingPurchasePending {
                product_id: product_id.clone(),
            });
            self.events.publish(StoreEvent::PurchaseCompleted {
                id,
                token,
                product_id,
                restored: false,
                outcome: Err(failure.clone()),
                at: Utc::now(),
            });
            if let Some(reply) = reply {
                let _ = reply.send(Err(failure));
            }
            return;
        }

        let mut to_start = self.submit_auto_initialize();

        let mut op = match reply {
            Some(reply) => PurchaseOperation::explicit(id, token, product_id, reply),
            None => {
                // Facade always supplies a responder today; guard anyway so
                // a dropped caller cannot wedge the pipeline
                let (tx, _rx) = oneshot::channel();
                PurchaseOperation::explicit(id, token, product_id, tx)
            }
        };
        op.admitted = true;
        self.registry.insert_purchase(op);
        if self.queue.submit(id) {
            to_start.push(id);
        }
        self.start_ops(to_start).await;
    }

    /// Queue an internal Initialize ahead of a purchase or fetch issued
    /// against an uninitialized store. No caller future; events only.
    /// Returns the id when it was admitted and must be started now.
    fn submit_auto_initialize(&mut self) -> Vec<OperationId> {
        if self.initialized || self.registry.has_pending_initialize() {
            return Vec::new();
        }
        let id = self.registry.alloc(OperationKind::Initialize);
        info!(operation_id = %id, "store not initialized; auto-starting initialize");
        self.events.publish(StoreEvent::InitializeInitiated {
            id,
            token: None,
            at: Utc::now(),
        });
        self.registry
            .insert_config(ConfigOperation::new(id, None, None));
        if self.queue.submit(id) {
            vec![id]
        } else {
            Vec::new()
        }
    }

    // ========== Starting admitted operations ==========

    /// Start every admitted operation, folding in operations admitted
    /// because an earlier start failed synchronously.
    async fn start_ops(&mut self, ids: Vec<OperationId>) {
        let mut pending: VecDeque<OperationId> = ids.into();
        while let Some(id) = pending.pop_front() {
            let released = match id.kind() {
                OperationKind::Initialize | OperationKind::Fetch => self.start_config(id).await,
                OperationKind::Purchase => self.start_purchase(id).await,
            };
            pending.extend(released);
        }
        self.push_snapshot();
    }

    async fn start_config(&mut self, id: OperationId) -> Vec<OperationId> {
        if self.registry.config_mut(id).is_none() {
            warn!(operation_id = %id, "admitted config operation missing from registry");
            return self.queue.release(id);
        }

        if id.kind() == OperationKind::Initialize && self.initialized {
            // A queued Initialize behind the one that just succeeded
            return self.finish_config(id, Ok(()));
        }
        if id.kind() == OperationKind::Fetch && !self.initialized {
            return self.finish_config(
                id,
                Err(FetchError::Unknown {
                    detail: "store is not initialized".to_string(),
                }),
            );
        }

        if let Some(op) = self.registry.config_mut(id) {
            op.phase = ConfigPhase::AwaitingConfig;
        }
        debug!(operation_id = %id, "requesting product configuration");

        let provider = Arc::clone(&self.provider);
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let result = match tokio::spawn(async move { provider.get_config().await }).await {
                Ok(Ok(config)) => Ok(config),
                Ok(Err(error)) => Err(format!("{error:#}")),
                Err(join_error) => Err(format!("config provider panicked: {join_error}")),
            };
            let _ = loopback.send(Command::ConfigReady { id, result });
        });
        Vec::new()
    }

    async fn handle_config_ready(&mut self, id: OperationId, result: Result<CatalogConfig, String>) {
        let phase = self.registry.config_mut(id).map(|op| op.phase);
        if phase != Some(ConfigPhase::AwaitingConfig) {
            debug!(operation_id = %id, "stale config continuation ignored");
            return;
        }

        let config = match result {
            Err(detail) => {
                let released = self.finish_config(id, Err(FetchError::ConfigUnavailable { detail }));
                self.start_ops(released).await;
                return;
            }
            Ok(config) if config.is_empty() => {
                let released = self.finish_config(
                    id,
                    Err(FetchError::ConfigUnavailable {
                        detail: "configuration is empty".to_string(),
                    }),
                );
                self.start_ops(released).await;
                return;
            }
            Ok(config) => config,
        };

        if let Some(op) = self.registry.config_mut(id) {
            op.phase = ConfigPhase::AwaitingNative;
        }

        let request = match id.kind() {
            OperationKind::Initialize => {
                let callbacks = NativeCallbacks::new(self.loopback.clone());
                self.bridge.initialize(&config, callbacks).await
            }
            OperationKind::Fetch => {
                // Only products the catalog does not resolve yet
                let additions: Vec<ProductEntry> = config
                    .products
                    .iter()
                    .filter(|entry| !self.catalog.contains(&entry.product_id))
                    .cloned()
                    .collect();
                self.bridge.fetch_products(&additions).await
            }
            OperationKind::Purchase => unreachable!("config continuation for a purchase id"),
        };

        if let Err(error) = request {
            warn!(operation_id = %id, error = %format!("{error:#}"), "native request failed to start");
            let released = self.finish_config(
                id,
                Err(FetchError::Unknown {
                    detail: format!("{error:#}"),
                }),
            );
            self.start_ops(released).await;
        }
    }

    async fn start_purchase(&mut self, id: OperationId) -> Vec<OperationId> {
        let initialized = self.initialized;
        let catalog = Arc::clone(&self.catalog);

        let Some(op) = self.registry.purchase_mut(id) else {
            warn!(operation_id = %id, "admitted purchase missing from registry");
            return self.queue.release(id);
        };
        op.phase = PurchasePhase::Initiating;

        if !initialized {
            return self.finish_purchase(id, Err(FailedPurchase::new(PurchaseError::StoreNotInitialized)));
        }

        let purchasable = catalog
            .get(&op.product_id)
            .map(|product| product.purchasable)
            .unwrap_or(false);
        if !purchasable {
            let product_id = op.product_id.clone();
            return self.finish_purchase(
                id,
                Err(FailedPurchase::new(PurchaseError::ProductUnavailable {
                    product_id,
                })),
            );
        }

        // Await the callback before issuing the request, so a reply
        // delivered synchronously inside initiate_purchase still correlates
        op.phase = PurchasePhase::AwaitingNativeCallback;
        let product_id = op.product_id.clone();
        debug!(operation_id = %id, product_id = %product_id, "initiating native purchase");

        if let Err(error) = self.bridge.initiate_purchase(&product_id).await {
            warn!(operation_id = %id, error = %format!("{error:#}"), "native purchase failed to start");
            return self.finish_purchase(
                id,
                Err(FailedPurchase::new(PurchaseError::Unknown {
                    detail: format!("{error:#}"),
                })),
            );
        }
        Vec::new()
    }

    // ========== Native callbacks ==========

    async fn handle_native(&mut self, signal: NativeSignal) {
        match signal {
            NativeSignal::Initialized { catalog } => {
                let Some(id) = self.expect_active_config(OperationKind::Initialize, "initialized")
                else {
                    return;
                };
                self.catalog = Arc::new(Catalog::new(catalog.products));
                self.initialized = true;
                info!(operation_id = %id, products = self.catalog.len(), "store initialized");
                let released = self.finish_config(id, Ok(()));
                self.start_ops(released).await;
            }
            NativeSignal::InitializeFailed { failure } => {
                let Some(id) =
                    self.expect_active_config(OperationKind::Initialize, "initialize-failed")
                else {
                    return;
                };
                let released = self.finish_config(id, Err(adapter::fetch_error_from(&failure)));
                self.start_ops(released).await;
            }
            NativeSignal::FetchOk { catalog } => {
                let Some(id) = self.expect_active_config(OperationKind::Fetch, "fetch-ok") else {
                    return;
                };
                self.catalog = Arc::new(self.catalog.merged(catalog.products));
                info!(operation_id = %id, products = self.catalog.len(), "catalog refreshed");
                let released = self.finish_config(id, Ok(()));
                self.start_ops(released).await;
            }
            NativeSignal::FetchFailed { failure } => {
                let Some(id) = self.expect_active_config(OperationKind::Fetch, "fetch-failed")
                else {
                    return;
                };
                let released = self.finish_config(id, Err(adapter::fetch_error_from(&failure)));
                self.start_ops(released).await;
            }
            NativeSignal::PurchaseProcessed { purchase } => {
                self.handle_purchase_processed(purchase).await;
            }
            NativeSignal::PurchaseFailed {
                product_id,
                failure,
            } => {
                let error = adapter::purchase_error_from(&failure, &product_id);
                match self.registry.find_purchase_for_callback(&product_id) {
                    Some(id) => {
                        let released =
                            self.finish_purchase(id, Err(FailedPurchase::new(error)));
                        self.start_ops(released).await;
                    }
                    None => {
                        // A failure for a purchase this store never started:
                        // publish the Initiated/Completed pair and nothing else
                        info!(product_id = %product_id, "purchase-failed callback without owner");
                        let id = self.synthesize_restored(&product_id);
                        let released = self.finish_purchase(id, Err(FailedPurchase::new(error)));
                        self.start_ops(released).await;
                    }
                }
            }
        }
    }

    /// Resolve the currently active config operation of `kind`, or log the
    /// callback as unexpected. The admission queue guarantees at most one.
    fn expect_active_config(&mut self, kind: OperationKind, callback: &str) -> Option<OperationId> {
        match self.registry.active_config_mut() {
            Some(op) if op.id.kind() == kind && op.phase == ConfigPhase::AwaitingNative => {
                Some(op.id)
            }
            Some(op) => {
                warn!(
                    callback,
                    operation_id = %op.id,
                    phase = ?op.phase,
                    "native callback does not match the active operation"
                );
                None
            }
            None => {
                warn!(callback, "native callback with no operation outstanding");
                None
            }
        }
    }

    async fn handle_purchase_processed(&mut self, purchase: NativePurchase) {
        let id = match self.registry.find_purchase_for_callback(&purchase.product_id) {
            Some(id) => id,
            None => {
                info!(product_id = %purchase.product_id, "purchase event without owner; treating as restored");
                self.synthesize_restored(&purchase.product_id)
            }
        };

        let Some(op) = self.registry.purchase_mut(id) else {
            return;
        };
        let transaction = Transaction {
            product_id: purchase.product_id,
            transaction_id: purchase.transaction_id,
            storefront_id: purchase.storefront_id,
            receipt: purchase.receipt,
            restored: op.restored,
            captured_at: Utc::now(),
        };
        debug!(
            operation_id = %id,
            transaction_id = %transaction.transaction_id,
            receipt = %transaction.receipt_fingerprint(),
            restored = transaction.restored,
            "purchase processed; validating receipt"
        );
        op.transaction = Some(transaction);
        op.phase = PurchasePhase::Validating;

        let released = self.begin_validation(id);
        self.start_ops(released).await;
    }

    /// Register a restored-flag operation for a native purchase event no
    /// queued operation owns. It enters the pipeline at Validating and
    /// publishes events only.
    fn synthesize_restored(&mut self, product_id: &str) -> OperationId {
        let id = self.registry.alloc(OperationKind::Purchase);
        self.events.publish(StoreEvent::PurchaseInitiated {
            id,
            token: None,
            product_id: product_id.to_string(),
            restored: true,
            at: Utc::now(),
        });
        self.registry
            .insert_purchase(PurchaseOperation::restored(id, product_id.to_string()));
        id
    }

    // ========== Validation pipeline ==========

    fn begin_validation(&mut self, id: OperationId) -> Vec<OperationId> {
        let Some(op) = self.registry.purchase_mut(id) else {
            return Vec::new();
        };
        let Some(transaction) = op.transaction.clone() else {
            warn!(operation_id = %id, "validating purchase without a transaction");
            return Vec::new();
        };

        if transaction.receipt.is_empty() {
            return self.finish_purchase(
                id,
                Err(FailedPurchase::with_transaction(
                    PurchaseError::ReceiptNullOrEmpty,
                    transaction,
                )),
            );
        }

        let validator = Arc::clone(&self.validator);
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let verdict =
                match tokio::spawn(async move { validator.validate(&transaction).await }).await {
                    Ok(Ok(verdict)) => Ok(verdict),
                    Ok(Err(error)) => Err(format!("{error:#}")),
                    Err(join_error) => Err(format!("validator panicked: {join_error}")),
                };
            let _ = loopback.send(Command::ValidationDone { id, verdict });
        });
        Vec::new()
    }

    async fn handle_validation_done(
        &mut self,
        id: OperationId,
        verdict: Result<Option<ValidationResult>, String>,
    ) {
        let Some(op) = self.registry.purchase_mut(id) else {
            debug!(operation_id = %id, "validation verdict for a finished operation ignored");
            return;
        };
        if op.phase != PurchasePhase::Validating {
            debug!(operation_id = %id, phase = ?op.phase, "validation verdict out of phase ignored");
            return;
        }
        let Some(transaction) = op.transaction.clone() else {
            warn!(operation_id = %id, "validated purchase lost its transaction");
            return;
        };

        // Confirm on every terminal verdict except NotAvailable: a failed
        // receipt must not be redelivered as restored next session, while a
        // transient validator outage must leave the transaction pending
        let (confirm, verdict) = match verdict {
            Ok(None) | Ok(Some(ValidationResult::Ok)) => (true, Ok(ValidationResult::Ok)),
            Ok(Some(ValidationResult::Suppressed)) => (true, Ok(ValidationResult::Suppressed)),
            Ok(Some(ValidationResult::Failure)) => (
                true,
                Err(PurchaseError::ReceiptValidationFailed {
                    detail: "validator rejected the receipt".to_string(),
                }),
            ),
            Ok(Some(ValidationResult::NotAvailable)) => {
                (false, Err(PurchaseError::ReceiptValidationNotAvailable))
            }
            Err(detail) => (
                true,
                Err(PurchaseError::ReceiptValidationFailed { detail }),
            ),
        };

        if confirm {
            self.issue_confirm(id).await;
        }

        let outcome: PurchaseOutcome = match verdict {
            Ok(validation) => Ok(PurchaseResult {
                transaction,
                validation,
            }),
            Err(error) => Err(FailedPurchase::with_transaction(error, transaction)),
        };
        let released = self.finish_purchase(id, outcome);
        self.start_ops(released).await;
    }

    /// Issue the irreversible native acknowledgment, at most once per
    /// operation (and therefore per native transaction id).
    async fn issue_confirm(&mut self, id: OperationId) {
        let Some(op) = self.registry.purchase_mut(id) else {
            return;
        };
        if op.confirm_issued {
            return;
        }
        let Some(transaction) = op.transaction.clone() else {
            return;
        };
        op.confirm_issued = true;

        info!(
            operation_id = %id,
            transaction_id = %transaction.transaction_id,
            receipt = %transaction.receipt_fingerprint(),
            "confirming native transaction"
        );
        if let Err(error) = self.bridge.confirm_pending_purchase(&transaction).await {
            warn!(
                operation_id = %id,
                transaction_id = %transaction.transaction_id,
                error = %format!("{error:#}"),
                "confirm_pending_purchase failed"
            );
        }
    }

    // ========== Completion ==========

    fn finish_config(&mut self, id: OperationId, outcome: FetchOutcome) -> Vec<OperationId> {
        let Some(op) = self.registry.config_mut(id) else {
            return Vec::new();
        };
        op.phase = ConfigPhase::Terminal;
        let token = op.token;
        let completed = match &outcome {
            Ok(()) => op.completion.try_set_result(outcome.clone()),
            Err(_) => op.completion.try_set_failure(outcome.clone()),
        };
        if !completed {
            return Vec::new();
        }

        let event = match id.kind() {
            OperationKind::Initialize => StoreEvent::InitializeCompleted {
                id,
                token,
                outcome,
                at: Utc::now(),
            },
            _ => StoreEvent::FetchCompleted {
                id,
                token,
                outcome,
                at: Utc::now(),
            },
        };
        self.events.publish(event);

        self.registry.remove_config(id);
        let released = self.queue.release(id);
        self.push_snapshot();
        released
    }

    fn finish_purchase(&mut self, id: OperationId, outcome: PurchaseOutcome) -> Vec<OperationId> {
        let Some(op) = self.registry.purchase_mut(id) else {
            return Vec::new();
        };
        op.phase = PurchasePhase::Terminal;
        let state = match &outcome {
            Ok(_) => CompletionState::RanToCompletion,
            Err(failure) => PurchaseOperation::state_for(&failure.error),
        };
        let token = op.token;
        let product_id = op.product_id.clone();
        let restored = op.restored;
        let admitted = op.admitted;
        let completed = match state {
            CompletionState::RanToCompletion => op.completion.try_set_result(outcome.clone()),
            CompletionState::Canceled => op.completion.try_set_canceled(outcome.clone()),
            _ => op.completion.try_set_failure(outcome.clone()),
        };
        if !completed {
            return Vec::new();
        }

        self.events.publish(StoreEvent::PurchaseCompleted {
            id,
            token,
            product_id,
            restored,
            outcome,
            at: Utc::now(),
        });

        self.registry.remove_purchase(id);
        let released = if admitted {
            self.queue.release(id)
        } else {
            Vec::new()
        };
        self.push_snapshot();
        released
    }

    // ========== Teardown ==========

    /// Force every live operation terminal. No native call is issued from
    /// here or after here.
    fn dispose(&mut self) {
        let live = self.registry.live_ids();
        let waiting = self.queue.drain();
        info!(
            live = live.len(),
            waiting = waiting.len(),
            "store disposing"
        );

        for id in live {
            match id.kind() {
                OperationKind::Initialize | OperationKind::Fetch => {
                    self.finish_config(id, Err(FetchError::StoreDisposed));
                }
                OperationKind::Purchase => {
                    self.finish_purchase(
                        id,
                        Err(FailedPurchase::new(PurchaseError::StoreDisposed)),
                    );
                }
            }
        }
        self.push_snapshot();
    }

    fn push_snapshot(&mut self) {
        let snapshot = StoreSnapshot {
            initialized: self.initialized,
            busy: self.registry.is_busy(),
            catalog: Arc::clone(&self.catalog),
        };
        self.snapshot.send_replace(snapshot);
    }
}
