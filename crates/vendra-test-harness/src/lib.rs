// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scripted collaborators for driving `vendra-core` end-to-end in tests.
//!
//! - [`ScriptedBridge`]: a programmable native layer. Replies are scripted
//!   per request; a purchase with no scripted reply simply never calls
//!   back (for teardown tests). Unsolicited events can be injected to
//!   exercise the restored-purchase path, and every confirm call is
//!   recorded.
//! - [`ScriptedValidator`]: a queue of verdicts, errors and panics.
//! - [`StaticConfigProvider`]: a fixed, failing or empty configuration.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use vendra_core::{
    CatalogConfig, ConfigProvider, NativeBridge, NativeCallbacks, NativeCatalog, NativeFailure,
    NativePurchase, Product, ProductEntry, ProductKind, ReceiptValidator, Transaction,
    ValidationResult,
};

// ============================================================================
// Building blocks
// ============================================================================

/// A purchasable consumable product entry.
pub fn entry(product_id: &str) -> ProductEntry {
    ProductEntry {
        product_id: product_id.to_string(),
        kind: ProductKind::Consumable,
    }
}

/// A purchasable product record as the native layer would resolve it.
pub fn product(product_id: &str) -> Product {
    Product {
        product_id: product_id.to_string(),
        title: Some(format!("{product_id} (title)")),
        price_text: Some("$1.99".to_string()),
        kind: ProductKind::Consumable,
        purchasable: true,
    }
}

/// A product record the storefront refuses to sell.
pub fn unpurchasable(product_id: &str) -> Product {
    Product {
        purchasable: false,
        ..product(product_id)
    }
}

/// A native purchase event payload.
pub fn purchase_event(product_id: &str, transaction_id: &str, receipt: &[u8]) -> NativePurchase {
    NativePurchase {
        product_id: product_id.to_string(),
        transaction_id: transaction_id.to_string(),
        storefront_id: Some("storefront-test".to_string()),
        receipt: receipt.to_vec(),
    }
}

// ============================================================================
// Config provider
// ============================================================================

enum ProviderScript {
    Ok(CatalogConfig),
    Fail(String),
}

/// Config provider returning a fixed configuration, a failure, or an empty
/// configuration. Counts calls.
pub struct StaticConfigProvider {
    script: ProviderScript,
    calls: Mutex<usize>,
}

impl StaticConfigProvider {
    /// Provider that resolves the given entries.
    pub fn with_entries(entries: Vec<ProductEntry>) -> Self {
        Self {
            script: ProviderScript::Ok(CatalogConfig { products: entries }),
            calls: Mutex::new(0),
        }
    }

    /// Provider that fails every call.
    pub fn failing(message: &str) -> Self {
        Self {
            script: ProviderScript::Fail(message.to_string()),
            calls: Mutex::new(0),
        }
    }

    /// Provider that returns an empty (missing) configuration.
    pub fn empty() -> Self {
        Self::with_entries(Vec::new())
    }

    /// Number of `get_config` calls so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn get_config(&self) -> anyhow::Result<CatalogConfig> {
        *self.calls.lock().unwrap() += 1;
        match &self.script {
            ProviderScript::Ok(config) => Ok(config.clone()),
            ProviderScript::Fail(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

// ============================================================================
// Receipt validator
// ============================================================================

/// One scripted validator behavior.
pub enum Verdict {
    /// Return this validation result.
    Result(ValidationResult),
    /// Return "no explicit verdict".
    NoVerdict,
    /// Fail with this error message.
    Error(String),
    /// Panic inside the validator task.
    Panic,
}

/// Receipt validator driven by a queue of scripted verdicts. When the
/// queue is empty every receipt validates `Ok`. Records the transactions
/// it saw.
#[derive(Default)]
pub struct ScriptedValidator {
    verdicts: Mutex<VecDeque<Verdict>>,
    seen: Mutex<Vec<Transaction>>,
}

impl ScriptedValidator {
    /// Validator that approves everything.
    pub fn approving() -> Self {
        Self::default()
    }

    /// Queue the next verdict.
    pub fn script(&self, verdict: Verdict) {
        self.verdicts.lock().unwrap().push_back(verdict);
    }

    /// Transactions validated so far.
    pub fn seen(&self) -> Vec<Transaction> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptValidator for ScriptedValidator {
    async fn validate(&self, transaction: &Transaction) -> anyhow::Result<Option<ValidationResult>> {
        self.seen.lock().unwrap().push(transaction.clone());
        let scripted = self.verdicts.lock().unwrap().pop_front();
        match scripted {
            None | Some(Verdict::Result(ValidationResult::Ok)) => Ok(Some(ValidationResult::Ok)),
            Some(Verdict::Result(result)) => Ok(Some(result)),
            Some(Verdict::NoVerdict) => Ok(None),
            Some(Verdict::Error(message)) => Err(anyhow::anyhow!("{message}")),
            Some(Verdict::Panic) => panic!("scripted validator panic"),
        }
    }
}

// ============================================================================
// Native bridge
// ============================================================================

/// One scripted reply to an initialize or fetch request.
pub enum ConfigReply {
    /// Resolve these products.
    Ok(Vec<Product>),
    /// Fail with this native failure.
    Fail(NativeFailure),
}

/// One scripted reply to an initiate-purchase request.
pub enum PurchaseReply {
    /// Deliver a purchase-processed event with this transaction id and
    /// receipt payload.
    Processed {
        /// Native transaction id to report.
        transaction_id: String,
        /// Raw receipt payload to report (may be empty).
        receipt: Vec<u8>,
    },
    /// Deliver a purchase-failed event.
    Fail(NativeFailure),
    /// Never call back; the operation stays awaiting the native layer.
    Silent,
}

#[derive(Default)]
struct BridgeState {
    callbacks: Option<NativeCallbacks>,
    init_replies: VecDeque<ConfigReply>,
    fetch_replies: VecDeque<ConfigReply>,
    purchase_replies: HashMap<String, VecDeque<PurchaseReply>>,
    initiated: Vec<String>,
    confirmed: Vec<Transaction>,
}

/// A programmable native layer.
///
/// Replies are delivered through the [`NativeCallbacks`] handle inside the
/// request call - the marshaling in `vendra-core` makes that
/// indistinguishable from a later asynchronous delivery, which is exactly
/// the property the core has to tolerate. Unscripted initialize/fetch
/// requests succeed with products derived from the requested entries;
/// unscripted purchases never call back.
#[derive(Default)]
pub struct ScriptedBridge {
    state: Mutex<BridgeState>,
}

impl ScriptedBridge {
    /// Bridge with default (succeed-everything) behavior for config
    /// requests and silence for purchases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next initialize request.
    pub fn script_initialize(&self, reply: ConfigReply) {
        self.state.lock().unwrap().init_replies.push_back(reply);
    }

    /// Queue a reply for the next fetch request.
    pub fn script_fetch(&self, reply: ConfigReply) {
        self.state.lock().unwrap().fetch_replies.push_back(reply);
    }

    /// Queue a reply for the next purchase of `product_id`.
    pub fn script_purchase(&self, product_id: &str, reply: PurchaseReply) {
        self.state
            .lock()
            .unwrap()
            .purchase_replies
            .entry(product_id.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Inject an unsolicited purchase-processed event (a restored
    /// purchase). Panics if the store was never initialized.
    pub fn deliver_unsolicited(&self, purchase: NativePurchase) {
        let state = self.state.lock().unwrap();
        let callbacks = state
            .callbacks
            .as_ref()
            .expect("bridge not initialized; no callback handle");
        callbacks.purchase_processed(purchase);
    }

    /// Inject an unsolicited purchase-failed event.
    pub fn deliver_unsolicited_failure(&self, product_id: &str, failure: NativeFailure) {
        let state = self.state.lock().unwrap();
        let callbacks = state
            .callbacks
            .as_ref()
            .expect("bridge not initialized; no callback handle");
        callbacks.purchase_failed(product_id, failure);
    }

    /// Product ids passed to `initiate_purchase`, in call order.
    pub fn initiated(&self) -> Vec<String> {
        self.state.lock().unwrap().initiated.clone()
    }

    /// Transactions passed to `confirm_pending_purchase`, in call order.
    pub fn confirmed(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().confirmed.clone()
    }

    /// How many times a transaction id was confirmed.
    pub fn confirm_count(&self, transaction_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .confirmed
            .iter()
            .filter(|t| t.transaction_id == transaction_id)
            .count()
    }

    fn resolve_entries(entries: &[ProductEntry]) -> Vec<Product> {
        entries.iter().map(|e| product(&e.product_id)).collect()
    }
}

#[async_trait]
impl NativeBridge for ScriptedBridge {
    async fn initialize(
        &self,
        config: &CatalogConfig,
        callbacks: NativeCallbacks,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.callbacks = Some(callbacks.clone());
        let reply = state
            .init_replies
            .pop_front()
            .unwrap_or_else(|| ConfigReply::Ok(Self::resolve_entries(&config.products)));
        drop(state);

        match reply {
            ConfigReply::Ok(products) => callbacks.initialized(NativeCatalog { products }),
            ConfigReply::Fail(failure) => callbacks.initialize_failed(failure),
        }
        Ok(())
    }

    async fn fetch_products(&self, products: &[ProductEntry]) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let callbacks = state
            .callbacks
            .clone()
            .ok_or_else(|| anyhow::anyhow!("fetch before initialize"))?;
        let reply = state
            .fetch_replies
            .pop_front()
            .unwrap_or_else(|| ConfigReply::Ok(Self::resolve_entries(products)));
        drop(state);

        match reply {
            ConfigReply::Ok(products) => callbacks.fetch_ok(NativeCatalog { products }),
            ConfigReply::Fail(failure) => callbacks.fetch_failed(failure),
        }
        Ok(())
    }

    async fn initiate_purchase(&self, product_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.initiated.push(product_id.to_string());
        let callbacks = state
            .callbacks
            .clone()
            .ok_or_else(|| anyhow::anyhow!("purchase before initialize"))?;
        let reply = state
            .purchase_replies
            .get_mut(product_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(PurchaseReply::Silent);
        drop(state);

        match reply {
            PurchaseReply::Processed {
                transaction_id,
                receipt,
            } => {
                callbacks.purchase_processed(NativePurchase {
                    product_id: product_id.to_string(),
                    transaction_id,
                    storefront_id: Some("storefront-test".to_string()),
                    receipt,
                });
            }
            PurchaseReply::Fail(failure) => callbacks.purchase_failed(product_id, failure),
            PurchaseReply::Silent => {
                debug!(product_id, "no scripted reply; purchase left pending");
            }
        }
        Ok(())
    }

    async fn confirm_pending_purchase(&self, transaction: &Transaction) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .confirmed
            .push(transaction.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validator_defaults_to_ok() {
        let validator = ScriptedValidator::approving();
        let transaction = Transaction {
            product_id: "sku1".to_string(),
            transaction_id: "txn-1".to_string(),
            storefront_id: None,
            receipt: b"r".to_vec(),
            restored: false,
            captured_at: chrono_now(),
        };
        let verdict = validator.validate(&transaction).await.unwrap();
        assert_eq!(verdict, Some(ValidationResult::Ok));
        assert_eq!(validator.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failing() {
        let provider = StaticConfigProvider::failing("offline");
        assert!(provider.get_config().await.is_err());
        assert_eq!(provider.calls(), 1);
    }

    fn chrono_now() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}
