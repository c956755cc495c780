// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation admission policy.
//!
//! One Initialize-or-Fetch at a time, never interleaved with a purchase's
//! native call; at most K purchases admitted concurrently; everything else
//! waits in submission order. The queue only tracks identities - operation
//! records live in the registry, and the driver performs the actual
//! starting.

use std::collections::VecDeque;

use tracing::debug;

use crate::operation::{OperationId, OperationKind};

/// Admission state for one store instance.
pub(crate) struct AdmissionQueue {
    max_purchases: usize,
    config_outstanding: Option<OperationId>,
    running_purchases: Vec<OperationId>,
    waiting: VecDeque<OperationId>,
}

impl AdmissionQueue {
    pub fn new(max_purchases: usize) -> Self {
        Self {
            max_purchases: max_purchases.max(1),
            config_outstanding: None,
            running_purchases: Vec::new(),
            waiting: VecDeque::new(),
        }
    }

    fn can_start(&self, kind: OperationKind) -> bool {
        match kind {
            // Config operations are mutually exclusive and must not overlap
            // a purchase's native call
            OperationKind::Initialize | OperationKind::Fetch => {
                self.config_outstanding.is_none() && self.running_purchases.is_empty()
            }
            OperationKind::Purchase => {
                self.config_outstanding.is_none()
                    && self.running_purchases.len() < self.max_purchases
            }
        }
    }

    fn mark_started(&mut self, id: OperationId) {
        match id.kind() {
            OperationKind::Initialize | OperationKind::Fetch => {
                debug_assert!(self.config_outstanding.is_none());
                self.config_outstanding = Some(id);
            }
            OperationKind::Purchase => self.running_purchases.push(id),
        }
    }

    /// Submit an operation. Returns `true` when it may start immediately;
    /// otherwise it joins the FIFO wait list.
    pub fn submit(&mut self, id: OperationId) -> bool {
        if self.can_start(id.kind()) {
            self.mark_started(id);
            true
        } else {
            debug!(operation_id = %id, "operation queued awaiting admission");
            self.waiting.push_back(id);
            false
        }
    }

    /// Release the slot held by a terminal operation and admit the next
    /// FIFO-eligible waiters. An ineligible entry does not block a later
    /// entry that still fits; order within a kind is preserved.
    pub fn release(&mut self, id: OperationId) -> Vec<OperationId> {
        if self.config_outstanding == Some(id) {
            self.config_outstanding = None;
        } else if let Some(index) = self.running_purchases.iter().position(|r| *r == id) {
            self.running_purchases.remove(index);
        } else if let Some(index) = self.waiting.iter().position(|w| *w == id) {
            // Completed while still waiting (disposal, duplicate guard)
            self.waiting.remove(index);
            return Vec::new();
        } else {
            // Restored operations never held a slot
            return Vec::new();
        }
        self.admit_eligible()
    }

    fn admit_eligible(&mut self) -> Vec<OperationId> {
        let mut started = Vec::new();
        let mut index = 0;
        while index < self.waiting.len() {
            let id = self.waiting[index];
            if self.can_start(id.kind()) {
                self.waiting.remove(index);
                self.mark_started(id);
                started.push(id);
            } else {
                index += 1;
            }
        }
        started
    }

    /// Tear-down: forget all admission state and hand back every waiting
    /// id so the driver can fail them.
    pub fn drain(&mut self) -> Vec<OperationId> {
        self.config_outstanding = None;
        self.running_purchases.clear();
        self.waiting.drain(..).collect()
    }

    #[cfg(test)]
    fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}
