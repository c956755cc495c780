// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-store operation registry.
//!
//! Owned by the store driver and passed by reference - never static, so
//! two store instances can never share ids or admission state. Allocates
//! identities and answers "whose reply is this" for the callback adapter.

use crate::operation::{ConfigOperation, ConfigPhase, OperationId, OperationKind};
use crate::purchase::{PurchaseOperation, PurchasePhase};

/// Registry of live (non-terminal) operations for one store instance.
pub(crate) struct OperationRegistry {
    next_seq: u64,
    configs: Vec<ConfigOperation>,
    purchases: Vec<PurchaseOperation>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            configs: Vec::new(),
            purchases: Vec::new(),
        }
    }

    /// Allocate the next operation id. Ids increase monotonically across
    /// kinds and are never reused.
    pub fn alloc(&mut self, kind: OperationKind) -> OperationId {
        self.next_seq += 1;
        OperationId::new(kind, self.next_seq)
    }

    // ========== Config operations ==========

    pub fn insert_config(&mut self, op: ConfigOperation) {
        self.configs.push(op);
    }

    pub fn config_mut(&mut self, id: OperationId) -> Option<&mut ConfigOperation> {
        self.configs.iter_mut().find(|op| op.id == id)
    }

    /// The config operation currently past admission, if any. The queue
    /// guarantees there is at most one.
    pub fn active_config_mut(&mut self) -> Option<&mut ConfigOperation> {
        self.configs.iter_mut().find(|op| {
            matches!(
                op.phase,
                ConfigPhase::AwaitingConfig | ConfigPhase::AwaitingNative
            )
        })
    }

    pub fn remove_config(&mut self, id: OperationId) -> Option<ConfigOperation> {
        let index = self.configs.iter().position(|op| op.id == id)?;
        Some(self.configs.remove(index))
    }

    /// Whether an Initialize operation is already queued or running, so
    /// auto-initialization is not submitted twice.
    pub fn has_pending_initialize(&self) -> bool {
        self.configs
            .iter()
            .any(|op| op.id.kind() == OperationKind::Initialize)
    }

    // ========== Purchase operations ==========

    pub fn insert_purchase(&mut self, op: PurchaseOperation) {
        self.purchases.push(op);
    }

    pub fn purchase_mut(&mut self, id: OperationId) -> Option<&mut PurchaseOperation> {
        self.purchases.iter_mut().find(|op| op.id == id)
    }

    pub fn remove_purchase(&mut self, id: OperationId) -> Option<PurchaseOperation> {
        let index = self.purchases.iter().position(|op| op.id == id)?;
        Some(self.purchases.remove(index))
    }

    /// Correlate a native purchase callback to the operation that caused
    /// it: the first operation awaiting a native callback, in admission
    /// order, that claims the callback's product id (a restored-flag
    /// operation claims anything). `None` means the event was triggered
    /// outside this store and a restored operation must be synthesized.
    pub fn find_purchase_for_callback(&self, product_id: &str) -> Option<OperationId> {
        self.purchases
            .iter()
            .find(|op| {
                op.phase == PurchasePhase::AwaitingNativeCallback
                    && op.matches_callback(product_id)
            })
            .map(|op| op.id)
    }

    /// Whether a non-restored purchase for this product is already queued
    /// or running.
    pub fn has_pending_purchase_for(&self, product_id: &str) -> bool {
        self.purchases
            .iter()
            .any(|op| !op.restored && op.product_id == product_id)
    }

    /// Every live operation id, config operations first, used when the
    /// store is torn down.
    pub fn live_ids(&self) -> Vec<OperationId> {
        self.configs
            .iter()
            .map(|op| op.id)
            .chain(self.purchases.iter().map(|op| op.id))
            .collect()
    }

    /// A store with no live operations is idle.
    pub fn is_busy(&self) -> bool {
        !self.configs.is_empty() || !self.purchases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_ids_monotonic_across_kinds() {
        let mut registry = OperationRegistry::new();
        let a = registry.alloc(OperationKind::Initialize);
        let b = registry.alloc(OperationKind::Purchase);
        let c = registry.alloc(OperationKind::Fetch);
        assert_eq!(a.seq(), 1);
        assert_eq!(b.seq(), 2);
        assert_eq!(c.seq(), 3);
        assert_eq!(b.kind(), OperationKind::Purchase);
    }

    #[test]
    fn test_two_registries_do_not_share_ids() {
        let mut first = OperationRegistry::new();
        let mut second = OperationRegistry::new();
        first.alloc(OperationKind::Purchase);
        // A fresh registry starts over - ids are store-scoped, not global
        assert_eq!(second.alloc(OperationKind::Purchase).seq(), 1);
    }

    #[test]
    fn test_callback_correlation_order_and_rule() {
        let mut registry = OperationRegistry::new();

        let first = registry.alloc(OperationKind::Purchase);
        let (tx, _rx1) = oneshot::channel();
        let mut op = PurchaseOperation::explicit(first, None, "sku1".to_string(), tx);
        op.phase = PurchasePhase::AwaitingNativeCallback;
        registry.insert_purchase(op);

        let second = registry.alloc(OperationKind::Purchase);
        let (tx, _rx2) = oneshot::channel();
        let mut op = PurchaseOperation::explicit(second, None, "sku2".to_string(), tx);
        op.phase = PurchasePhase::AwaitingNativeCallback;
        registry.insert_purchase(op);

        // Product-id match picks the right owner regardless of order
        assert_eq!(registry.find_purchase_for_callback("sku2"), Some(second));
        assert_eq!(registry.find_purchase_for_callback("sku1"), Some(first));
        // No owner for an unknown product
        assert_eq!(registry.find_purchase_for_callback("sku9"), None);
    }

    #[test]
    fn test_queued_purchase_does_not_claim_callbacks() {
        let mut registry = OperationRegistry::new();
        let id = registry.alloc(OperationKind::Purchase);
        let (tx, _rx) = oneshot::channel();
        registry.insert_purchase(PurchaseOperation::explicit(
            id,
            None,
            "sku1".to_string(),
            tx,
        ));

        // Still Queued, not awaiting the native layer
        assert_eq!(registry.find_purchase_for_callback("sku1"), None);
        assert!(registry.has_pending_purchase_for("sku1"));
    }

    #[test]
    fn test_busy_reflects_live_operations() {
        let mut registry = OperationRegistry::new();
        assert!(!registry.is_busy());

        let id = registry.alloc(OperationKind::Initialize);
        registry.insert_config(ConfigOperation::new(id, None, None));
        assert!(registry.is_busy());

        registry.remove_config(id);
        assert!(!registry.is_busy());
    }
}
