// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error taxonomy for store operations.
//!
//! Raw native status codes never leave the callback adapter; everything a
//! caller sees is one of the two enums below. Both are `Clone` with string
//! details so the same terminal error can resolve the caller's future and
//! ride the event surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors terminating an Initialize or Fetch operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FetchError {
    /// Native layer reported a failure not otherwise classified.
    #[error("store request failed: {detail}")]
    Unknown {
        /// Message carried over from the native layer or collaborator.
        detail: String,
    },

    /// The store was disposed before the operation reached a result.
    #[error("store was disposed before the operation completed")]
    StoreDisposed,

    /// The config provider failed or returned an empty configuration.
    #[error("product configuration unavailable: {detail}")]
    ConfigUnavailable {
        /// Underlying provider error, preserved as text.
        detail: String,
    },

    /// Purchasing is switched off on this device or account.
    #[error("purchasing is unavailable")]
    PurchasingUnavailable,

    /// The native layer resolved none of the requested products.
    #[error("no products available for the requested configuration")]
    NoProductsAvailable,

    /// The application is not known to the storefront.
    #[error("application is not known to the storefront")]
    AppNotKnown,
}

impl FetchError {
    /// Stable string code for host-side telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unknown { .. } => "UNKNOWN",
            Self::StoreDisposed => "STORE_DISPOSED",
            Self::ConfigUnavailable { .. } => "CONFIG_UNAVAILABLE",
            Self::PurchasingUnavailable => "PURCHASING_UNAVAILABLE",
            Self::NoProductsAvailable => "NO_PRODUCTS_AVAILABLE",
            Self::AppNotKnown => "APP_NOT_KNOWN",
        }
    }
}

/// Errors terminating a Purchase operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PurchaseError {
    /// Native layer reported a failure not otherwise classified.
    #[error("purchase failed: {detail}")]
    Unknown {
        /// Message carried over from the native layer or collaborator.
        detail: String,
    },

    /// The store was disposed before the purchase reached a result.
    #[error("store was disposed before the purchase completed")]
    StoreDisposed,

    /// The purchase was admitted but the store never initialized.
    #[error("store is not initialized")]
    StoreNotInitialized,

    /// Purchasing is switched off on this device or account.
    #[error("purchasing is unavailable")]
    PurchasingUnavailable,

    /// A purchase for the same product is already queued or running.
    #[error("a purchase for '{product_id}' is already pending")]
    ExistingPurchasePending {
        /// The product with the pending purchase.
        product_id: String,
    },

    /// The product is missing from the catalog or not marked purchasable.
    #[error("product '{product_id}' is not available for purchase")]
    ProductUnavailable {
        /// The requested product.
        product_id: String,
    },

    /// The storefront rejected the request signature.
    #[error("storefront rejected the request signature")]
    SignatureInvalid,

    /// The user dismissed the native purchase dialog.
    #[error("purchase canceled by user")]
    UserCanceled,

    /// The payment was declined by the payment provider.
    #[error("payment declined")]
    PaymentDeclined,

    /// The storefront reported the transaction as a duplicate.
    #[error("duplicate transaction")]
    DuplicateTransaction,

    /// The native purchase event carried no receipt payload.
    #[error("purchase event carried an empty receipt")]
    ReceiptNullOrEmpty,

    /// The receipt validator rejected the transaction.
    #[error("receipt validation failed: {detail}")]
    ReceiptValidationFailed {
        /// Validator verdict detail or wrapped validator error.
        detail: String,
    },

    /// The validator could not produce a verdict; the transaction stays
    /// pending on the native side so it can be re-validated later.
    #[error("receipt validation not available")]
    ReceiptValidationNotAvailable,
}

impl PurchaseError {
    /// Stable string code for host-side telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unknown { .. } => "UNKNOWN",
            Self::StoreDisposed => "STORE_DISPOSED",
            Self::StoreNotInitialized => "STORE_NOT_INITIALIZED",
            Self::PurchasingUnavailable => "PURCHASING_UNAVAILABLE",
            Self::ExistingPurchasePending { .. } => "EXISTING_PURCHASE_PENDING",
            Self::ProductUnavailable { .. } => "PRODUCT_UNAVAILABLE",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::UserCanceled => "USER_CANCELED",
            Self::PaymentDeclined => "PAYMENT_DECLINED",
            Self::DuplicateTransaction => "DUPLICATE_TRANSACTION",
            Self::ReceiptNullOrEmpty => "RECEIPT_NULL_OR_EMPTY",
            Self::ReceiptValidationFailed { .. } => "RECEIPT_VALIDATION_FAILED",
            Self::ReceiptValidationNotAvailable => "RECEIPT_VALIDATION_NOT_AVAILABLE",
        }
    }

    /// Whether this error terminates the operation as Canceled rather than
    /// Faulted. Only the native user-cancel signal does.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::UserCanceled)
    }
}
