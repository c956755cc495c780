// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The native capability seam.
//!
//! The host runtime's purchase subsystem is an opaque, callback-driven
//! service. Requests return quickly (a synchronous `Err` counts as a
//! failure to initiate); results arrive later through the
//! [`NativeCallbacks`](crate::adapter::NativeCallbacks) handle, possibly on
//! another task, possibly synchronously inside the request call. Both
//! orders are tolerated by the completion guard.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapter::NativeCallbacks;
use crate::catalog::{CatalogConfig, Product, ProductEntry};
use crate::purchase::Transaction;

/// Raw status codes surfaced by the native purchase layer. Translated into
/// the public error taxonomy at the adapter boundary, never shown to
/// callers directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeStatus {
    /// Request succeeded.
    Succeeded,
    /// The user dismissed the purchase dialog.
    UserCanceled,
    /// Payment provider declined the charge.
    PaymentDeclined,
    /// The storefront saw this transaction before.
    DuplicateTransaction,
    /// Request signature rejected by the storefront.
    SignatureInvalid,
    /// Product not purchasable or unknown to the storefront.
    ProductUnavailable,
    /// Purchasing disabled on this device or account.
    PurchasingUnavailable,
    /// None of the requested products resolved.
    NoProductsAvailable,
    /// The application is not registered with the storefront.
    AppNotKnown,
    /// Anything the native layer did not classify.
    Unknown,
}

/// Failure payload of a native `*-failed` callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeFailure {
    /// Raw native status code.
    pub status: NativeStatus,
    /// Free-form native error message, when one exists.
    pub message: Option<String>,
}

impl NativeFailure {
    /// Failure with a status code and no message.
    pub fn status(status: NativeStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    /// Best-effort human-readable detail for the unknown-error paths.
    pub fn detail(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => format!("{:?}", self.status),
        }
    }
}

/// Catalog payload of a successful initialize or fetch callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeCatalog {
    /// Products the native layer resolved.
    pub products: Vec<Product>,
}

/// Payload of a purchase-processed callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativePurchase {
    /// Storefront product identifier.
    pub product_id: String,
    /// Native transaction identifier.
    pub transaction_id: String,
    /// Storefront identifier, when reported.
    pub storefront_id: Option<String>,
    /// Raw receipt payload. May be empty; the pipeline fails such
    /// purchases without invoking the validator.
    pub receipt: Vec<u8>,
}

/// The native purchase capability.
///
/// One shared handle per store; only the currently running operation calls
/// the request methods. Implementations deliver results through the
/// `NativeCallbacks` handle received in [`initialize`](Self::initialize) -
/// the native layer promises to deliver callbacks one at a time, but on
/// whatever task it pleases.
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// Begin store bring-up for the configured products. The reply arrives
    /// as `initialized` or `initialize_failed`.
    async fn initialize(
        &self,
        config: &CatalogConfig,
        callbacks: NativeCallbacks,
    ) -> anyhow::Result<()>;

    /// Request resolution of additional products. The reply arrives as
    /// `fetch_ok` or `fetch_failed`.
    async fn fetch_products(&self, products: &[ProductEntry]) -> anyhow::Result<()>;

    /// Start the native purchase flow for one product. The reply arrives
    /// as `purchase_processed` or `purchase_failed` - or not at all for
    /// this operation, when the user triggers an unrelated purchase.
    async fn initiate_purchase(&self, product_id: &str) -> anyhow::Result<()>;

    /// Irreversibly acknowledge a processed transaction so the native
    /// layer stops redelivering it. Issued at most once per transaction.
    async fn confirm_pending_purchase(&self, transaction: &Transaction) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_detail_prefers_message() {
        let failure = NativeFailure {
            status: NativeStatus::Unknown,
            message: Some("0x803f6107".to_string()),
        };
        assert_eq!(failure.detail(), "0x803f6107");

        let bare = NativeFailure::status(NativeStatus::PaymentDeclined);
        assert_eq!(bare.detail(), "PaymentDeclined");
    }
}
