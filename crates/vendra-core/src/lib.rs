// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vendra Core - Purchase Coordination Engine
//!
//! This crate adapts a callback-driven native in-app-purchase capability
//! into a future/event based client interface with explicit operation
//! sequencing, bounded purchase concurrency, and a validate-then-confirm
//! receipt protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Host Application                            │
//! │            initialize() / fetch_additional_products() / purchase()       │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                │ futures                                 ▲ broadcast events
//!                ▼                                         │
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Store (facade)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                │ commands (mpsc)
//!                ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Driver (single owner context)                       │
//! │        OperationRegistry · AdmissionQueue · validation pipeline          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!        │                      │                        ▲
//!        │ get_config()         │ initialize/fetch/      │ NativeCallbacks
//!        ▼                      │ purchase/confirm       │ (any task)
//! ┌──────────────┐              ▼                        │
//! │ConfigProvider│   ┌─────────────────────────────────────────┐
//! └──────────────┘   │         NativeBridge (opaque)           │
//! ┌──────────────┐   │   the host runtime's purchase plugin     │
//! │ReceiptValida-│   └─────────────────────────────────────────┘
//! │tor           │
//! └──────────────┘
//! ```
//!
//! Every client call becomes an operation with a store-unique id. The
//! admission queue allows one Initialize-or-Fetch at a time, never
//! overlapping a purchase's native call, and at most K concurrent
//! purchases (default 1) - everything else waits FIFO. Native callbacks
//! are marshaled onto the driver task by the adapter, so completion,
//! event publication and the irreversible confirm call are never raced.
//!
//! # Operation state machines
//!
//! ```text
//! Initialize / Fetch:
//!   Queued ──► AwaitingConfig ──► AwaitingNative ──► Terminal
//!
//! Purchase:
//!   Queued ──► Initiating ──► AwaitingNativeCallback ──► Validating ──► Terminal
//! ```
//!
//! # Receipt validation and confirmation
//!
//! | Verdict        | Confirm | Operation outcome                      |
//! |----------------|---------|----------------------------------------|
//! | `Ok` / none    | yes     | success                                |
//! | `Suppressed`   | yes     | success (recorded as suppressed)       |
//! | `Failure`      | yes     | `ReceiptValidationFailed`              |
//! | `NotAvailable` | no      | `ReceiptValidationNotAvailable`        |
//! | error/panic    | yes     | `ReceiptValidationFailed` (wrapped)    |
//!
//! Confirming on `Failure` keeps the native layer from redelivering a
//! permanently bad transaction as restored next session; withholding on
//! `NotAvailable` keeps a transiently unvalidated transaction pending so
//! it can be validated later. Confirm is issued at most once per
//! transaction.
//!
//! A native purchase event no queued operation owns (a purchase replayed
//! on app restart, or triggered outside this API) is synthesized into a
//! restored-flag operation: it runs the identical validation pipeline and
//! produces the same Initiated/Completed event pair, but resolves no
//! caller future.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vendra_core::Store;
//!
//! let store = Store::builder()
//!     .config_provider(provider)
//!     .validator(validator)
//!     .native_bridge(bridge)
//!     .build()?;
//!
//! store.initialize().await?;
//! let mut events = store.subscribe();
//!
//! let result = store.purchase("gold-pack").await?;
//! println!("validated: {:?}", result.validation);
//! ```
//!
//! # Modules
//!
//! - [`adapter`]: native callback entry point and error-code translation
//! - [`catalog`]: product catalog types and the config provider seam
//! - [`config`]: store tunables from environment variables
//! - [`error`]: the `FetchError` / `PurchaseError` taxonomy
//! - [`events`]: the Initiated/Completed broadcast surface
//! - [`native`]: the native capability seam
//! - [`operation`]: operation identity and completion states
//! - [`purchase`]: transactions, validation verdicts and the validator seam
//! - [`store`]: builder and client facade

#![deny(missing_docs)]

/// Native callback entry point and error-code translation.
pub mod adapter;

/// Product catalog types and the config provider seam.
pub mod catalog;

/// Store tunables loaded from environment variables.
pub mod config;

mod driver;

/// Error taxonomy for store operations.
pub mod error;

/// Initiated/Completed notifications on a broadcast channel.
pub mod events;

/// The native capability seam.
pub mod native;

/// Operation identity and completion states.
pub mod operation;

/// Purchase data model and the receipt validator seam.
pub mod purchase;

mod queue;
mod registry;

/// Store builder and client facade.
pub mod store;

pub use adapter::NativeCallbacks;
pub use catalog::{Catalog, CatalogConfig, ConfigProvider, Product, ProductEntry, ProductKind};
pub use config::{ConfigError, StoreOptions};
pub use error::{FetchError, PurchaseError};
pub use events::StoreEvent;
pub use native::{NativeBridge, NativeCatalog, NativeFailure, NativePurchase, NativeStatus};
pub use operation::{CompletionState, FetchOutcome, OperationId, OperationKind};
pub use purchase::{
    FailedPurchase, PurchaseOutcome, PurchaseResult, ReceiptValidator, Transaction,
    ValidationResult,
};
pub use store::{Store, StoreBuilder, StoreSnapshot};
