use chrono::{DateTime, Utc};

use super::domain::{AdvanceId, AdvanceStatus, WorkerId};
use super::money::Money;
use super::repository::{RepositoryError, SourceError};

/// Input rejected before any state changed. Safe to correct and resubmit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("advance amount must be greater than zero (got {amount})")]
    NonPositiveAmount { amount: Money },
    #[error("advance amount {amount} exceeds the maximum of {max}")]
    ExceedsMaximum { amount: Money, max: Money },
    #[error("{field} is required")]
    MissingActor { field: &'static str },
    #[error("settlement belongs to worker {found}, not {expected}")]
    WorkerMismatch { expected: WorkerId, found: WorkerId },
    #[error("settlement window is stale: computed from {computed_from:?}, ledger is at {ledger_at:?}")]
    StaleWindow {
        computed_from: Option<DateTime<Utc>>,
        ledger_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("advance {advance_id} is already {current}; cannot mark it {attempted}")]
    InvalidStateTransition {
        advance_id: AdvanceId,
        current: AdvanceStatus,
        attempted: AdvanceStatus,
    },
    #[error("advance {0} not found")]
    AdvanceNotFound(AdvanceId),
    #[error("source feed unavailable for worker {worker_id}: {source}")]
    SourceUnavailable {
        worker_id: WorkerId,
        #[source]
        source: SourceError,
    },
    #[error("inconsistent settlement state for worker {worker_id}: {detail}")]
    InconsistentState { worker_id: WorkerId, detail: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SettlementError {
    /// Machine-readable tag used by the HTTP layer and batch reports.
    pub const fn kind(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "validation_error",
            SettlementError::InvalidStateTransition { .. } => "invalid_state_transition",
            SettlementError::AdvanceNotFound(_) => "not_found",
            SettlementError::SourceUnavailable { .. } => "source_unavailable",
            SettlementError::InconsistentState { .. } => "inconsistent_state",
            SettlementError::Repository(_) => "repository_error",
        }
    }
}
