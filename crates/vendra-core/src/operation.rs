// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation identity and the idempotent completion guard.
//!
//! Every client call (and every synthesized restored purchase) becomes an
//! operation with a store-unique id. Completion is guarded: the first
//! terminal transition wins, resolves the caller's future and reports
//! `true`; later attempts are observable no-ops. The guard is what makes
//! the pipeline safe against callbacks that arrive synchronously during a
//! native call as well as ones enqueued later.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::FetchError;

/// Outcome type an Initialize or Fetch future resolves to.
pub type FetchOutcome = Result<(), FetchError>;

/// The three operation kinds the store sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// First-time store bring-up: config fetch + native initialize.
    Initialize,
    /// Catalog refresh: config fetch + native fetch of additional products.
    Fetch,
    /// One purchase attempt, explicit or restored.
    Purchase,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialize => "initialize",
            Self::Fetch => "fetch",
            Self::Purchase => "purchase",
        };
        f.write_str(name)
    }
}

/// Store-unique operation identity: a monotonically increasing sequence
/// number tagged with the operation kind. Never reused; two store
/// instances allocate independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId {
    kind: OperationKind,
    seq: u64,
}

impl OperationId {
    pub(crate) fn new(kind: OperationKind, seq: u64) -> Self {
        Self { kind, seq }
    }

    /// The operation kind this id is tagged with.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The sequence number within the owning store.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.seq)
    }
}

/// Terminal-or-not completion state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionState {
    /// Not yet terminal.
    Pending,
    /// Completed successfully.
    RanToCompletion,
    /// Completed with an error.
    Faulted,
    /// Completed by user cancellation or store disposal.
    Canceled,
}

impl CompletionState {
    /// Whether the state is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Idempotent completion guard for one operation.
///
/// Holds the caller's oneshot responder (when the operation has a caller
/// future; restored purchases do not). The first `try_*` call transitions
/// to a terminal state, notifies the waiter and returns `true`. Every
/// later call returns `false` without observable effect.
pub(crate) struct Completion<O> {
    state: CompletionState,
    waiter: Option<oneshot::Sender<O>>,
}

impl<O> Completion<O> {
    pub fn new(waiter: Option<oneshot::Sender<O>>) -> Self {
        Self {
            state: CompletionState::Pending,
            waiter,
        }
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transition to `state` with `outcome`. First terminal transition
    /// wins. A dropped waiter (caller stopped awaiting) is not an error.
    pub fn try_complete(&mut self, state: CompletionState, outcome: O) -> bool {
        debug_assert!(state.is_terminal());
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(outcome);
        }
        true
    }

    pub fn try_set_result(&mut self, outcome: O) -> bool {
        self.try_complete(CompletionState::RanToCompletion, outcome)
    }

    pub fn try_set_failure(&mut self, outcome: O) -> bool {
        self.try_complete(CompletionState::Faulted, outcome)
    }

    pub fn try_set_canceled(&mut self, outcome: O) -> bool {
        self.try_complete(CompletionState::Canceled, outcome)
    }
}

/// Lifecycle phase of an Initialize or Fetch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPhase {
    Queued,
    AwaitingConfig,
    AwaitingNative,
    Terminal,
}

/// One Initialize or Fetch attempt.
pub(crate) struct ConfigOperation {
    pub id: OperationId,
    pub token: Option<Uuid>,
    pub phase: ConfigPhase,
    pub completion: Completion<FetchOutcome>,
}

impl ConfigOperation {
    pub fn new(id: OperationId, token: Option<Uuid>, waiter: Option<oneshot::Sender<FetchOutcome>>) -> Self {
        debug_assert!(matches!(
            id.kind(),
            OperationKind::Initialize | OperationKind::Fetch
        ));
        Self {
            id,
            token,
            phase: ConfigPhase::Queued,
            completion: Completion::new(waiter),
        }
    }
}
