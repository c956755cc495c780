// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Purchase data model and the receipt validator seam.
//!
//! A purchase moves `Created → Queued → Initiating → AwaitingNativeCallback
//! → Validating → Terminal`. The transaction is captured exactly once, when
//! the native purchase event is correlated, and is immutable afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::PurchaseError;
use crate::operation::{Completion, CompletionState, OperationId};

/// Outcome type a purchase future resolves to.
pub type PurchaseOutcome = Result<PurchaseResult, FailedPurchase>;

/// The data describing one native purchase event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Storefront product identifier.
    pub product_id: String,
    /// Native transaction identifier. Confirm is issued at most once per id.
    pub transaction_id: String,
    /// Storefront identifier, when the native layer reports one.
    pub storefront_id: Option<String>,
    /// Raw receipt payload as delivered by the native layer.
    #[serde(with = "receipt_encoding")]
    pub receipt: Vec<u8>,
    /// True when this transaction was replayed by the store rather than
    /// caused by an explicit purchase call.
    pub restored: bool,
    /// When the native purchase event was correlated.
    pub captured_at: DateTime<Utc>,
}

impl Transaction {
    /// Short sha256 fingerprint of the receipt payload, for log correlation
    /// without logging the payload itself.
    pub fn receipt_fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.receipt);
        let mut out = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

/// Base64 encoding for the raw receipt payload in serialized form.
mod receipt_encoding {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Verdict produced by the receipt validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    /// Receipt is valid; confirm the transaction and complete successfully.
    Ok,
    /// Receipt is invalid. The transaction is still confirmed so the store
    /// does not redeliver it as restored on a later session.
    Failure,
    /// No verdict could be produced (transient outage). The transaction is
    /// NOT confirmed and stays re-validatable on the native side.
    NotAvailable,
    /// Validation was deliberately skipped by the validator. Treated as
    /// success for confirmation, recorded distinctly in the result.
    Suppressed,
}

/// Terminal snapshot of a successful purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseResult {
    /// The confirmed transaction.
    pub transaction: Transaction,
    /// The verdict that led to confirmation.
    pub validation: ValidationResult,
}

/// Terminal snapshot of a failed or canceled purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{error}")]
pub struct FailedPurchase {
    /// The classified failure.
    pub error: PurchaseError,
    /// The transaction, when the native layer delivered one before the
    /// failure (validation-stage failures carry it; admission-stage
    /// failures do not).
    pub transaction: Option<Transaction>,
}

impl FailedPurchase {
    /// Failure with no captured transaction.
    pub fn new(error: PurchaseError) -> Self {
        Self {
            error,
            transaction: None,
        }
    }

    /// Failure carrying the captured transaction.
    pub fn with_transaction(error: PurchaseError, transaction: Transaction) -> Self {
        Self {
            error,
            transaction: Some(transaction),
        }
    }
}

/// External collaborator deciding whether a receipt is genuine.
///
/// `Ok(None)` means "no explicit verdict - treat as `Ok`". Errors are
/// treated like [`ValidationResult::Failure`] with the underlying cause
/// preserved in the failure detail.
#[async_trait]
pub trait ReceiptValidator: Send + Sync {
    /// Validate one transaction.
    async fn validate(&self, transaction: &Transaction) -> anyhow::Result<Option<ValidationResult>>;
}

/// Lifecycle phase of a purchase operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PurchasePhase {
    Queued,
    Initiating,
    AwaitingNativeCallback,
    Validating,
    Terminal,
}

/// One purchase attempt, explicit or restored.
pub(crate) struct PurchaseOperation {
    pub id: OperationId,
    pub token: Option<Uuid>,
    pub product_id: String,
    pub restored: bool,
    pub phase: PurchasePhase,
    pub transaction: Option<Transaction>,
    pub confirm_issued: bool,
    /// True when the operation went through queue admission and must
    /// release its slot on completion. Restored operations never do.
    pub admitted: bool,
    pub completion: Completion<PurchaseOutcome>,
}

impl PurchaseOperation {
    /// An explicit, caller-initiated purchase with a future to resolve.
    pub fn explicit(
        id: OperationId,
        token: Option<Uuid>,
        product_id: String,
        waiter: oneshot::Sender<PurchaseOutcome>,
    ) -> Self {
        Self {
            id,
            token,
            product_id,
            restored: false,
            phase: PurchasePhase::Queued,
            transaction: None,
            confirm_issued: false,
            admitted: false,
            completion: Completion::new(Some(waiter)),
        }
    }

    /// A synthesized operation for a native purchase event no queued
    /// operation owns. Enters the pipeline at Validating; publishes events
    /// only, there is no caller future.
    pub fn restored(id: OperationId, product_id: String) -> Self {
        Self {
            id,
            token: None,
            product_id,
            restored: true,
            phase: PurchasePhase::Validating,
            transaction: None,
            confirm_issued: false,
            admitted: false,
            completion: Completion::new(None),
        }
    }

    /// Correlation rule: a restored-flag operation claims any purchase
    /// callback; otherwise the callback's product id must match.
    pub fn matches_callback(&self, product_id: &str) -> bool {
        self.restored || self.product_id == product_id
    }

    /// Terminal completion state chosen for an error.
    pub fn state_for(error: &PurchaseError) -> CompletionState {
        if error.is_cancellation() {
            CompletionState::Canceled
        } else {
            CompletionState::Faulted
        }
    }
}
