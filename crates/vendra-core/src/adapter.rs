// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Native callback adapter.
//!
//! The single entry point for native-layer callbacks. Each callback is
//! marshaled onto the store driver's command channel - the owner context -
//! so all state mutation stays single-threaded no matter which task the
//! native layer calls from, including synchronously inside a request call.
//!
//! Adapter methods never panic and never report errors back into the
//! native call stack; a callback arriving after disposal is logged and
//! dropped. Raw native status codes are translated into the public error
//! taxonomy here and nowhere else.

use tokio::sync::mpsc;
use tracing::debug;

use crate::driver::Command;
use crate::error::{FetchError, PurchaseError};
use crate::native::{NativeCatalog, NativeFailure, NativePurchase, NativeStatus};

/// A native callback, as marshaled to the driver.
#[derive(Debug)]
pub(crate) enum NativeSignal {
    Initialized { catalog: NativeCatalog },
    InitializeFailed { failure: NativeFailure },
    FetchOk { catalog: NativeCatalog },
    FetchFailed { failure: NativeFailure },
    PurchaseProcessed { purchase: NativePurchase },
    PurchaseFailed {
        product_id: String,
        failure: NativeFailure,
    },
}

/// Callback surface handed to the native bridge.
///
/// Cheap to clone; every method is synchronous, infallible and safe to
/// call from any task or from inside the request that triggered the reply.
#[derive(Clone)]
pub struct NativeCallbacks {
    tx: mpsc::UnboundedSender<Command>,
}

impl NativeCallbacks {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Store bring-up succeeded; `catalog` is the resolved product set.
    pub fn initialized(&self, catalog: NativeCatalog) {
        self.send(NativeSignal::Initialized { catalog });
    }

    /// Store bring-up failed.
    pub fn initialize_failed(&self, failure: NativeFailure) {
        self.send(NativeSignal::InitializeFailed { failure });
    }

    /// Additional products resolved; `catalog` carries only the additions.
    pub fn fetch_ok(&self, catalog: NativeCatalog) {
        self.send(NativeSignal::FetchOk { catalog });
    }

    /// Additional-product resolution failed.
    pub fn fetch_failed(&self, failure: NativeFailure) {
        self.send(NativeSignal::FetchFailed { failure });
    }

    /// A purchase completed on the native side - solicited or not. Events
    /// with no owning operation become restored purchases.
    pub fn purchase_processed(&self, purchase: NativePurchase) {
        self.send(NativeSignal::PurchaseProcessed { purchase });
    }

    /// A purchase failed on the native side.
    pub fn purchase_failed(&self, product_id: impl Into<String>, failure: NativeFailure) {
        self.send(NativeSignal::PurchaseFailed {
            product_id: product_id.into(),
            failure,
        });
    }

    fn send(&self, signal: NativeSignal) {
        if let Err(rejected) = self.tx.send(Command::Native(signal)) {
            // Store already disposed; the native layer keeps its own state
            debug!(signal = ?rejected.0, "native callback after disposal dropped");
        }
    }
}

impl std::fmt::Debug for NativeCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCallbacks").finish_non_exhaustive()
    }
}

/// Translate a native failure on the initialize/fetch path.
pub(crate) fn fetch_error_from(failure: &NativeFailure) -> FetchError {
    match failure.status {
        NativeStatus::PurchasingUnavailable => FetchError::PurchasingUnavailable,
        NativeStatus::NoProductsAvailable => FetchError::NoProductsAvailable,
        NativeStatus::AppNotKnown => FetchError::AppNotKnown,
        _ => FetchError::Unknown {
            detail: failure.detail(),
        },
    }
}

/// Translate a native failure on the purchase path.
pub(crate) fn purchase_error_from(failure: &NativeFailure, product_id: &str) -> PurchaseError {
    match failure.status {
        NativeStatus::UserCanceled => PurchaseError::UserCanceled,
        NativeStatus::PaymentDeclined => PurchaseError::PaymentDeclined,
        NativeStatus::DuplicateTransaction => PurchaseError::DuplicateTransaction,
        NativeStatus::SignatureInvalid => PurchaseError::SignatureInvalid,
        NativeStatus::ProductUnavailable => PurchaseError::ProductUnavailable {
            product_id: product_id.to_string(),
        },
        NativeStatus::PurchasingUnavailable => PurchaseError::PurchasingUnavailable,
        _ => PurchaseError::Unknown {
            detail: failure.detail(),
        },
    }
}
