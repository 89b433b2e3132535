//! Worker settlement engine.
//!
//! Aggregates unsettled service revenue and deductions since a worker's last payout into a
//! payable amount, governs cash-advance approvals, and keeps the append-only payout ledger
//! whose latest entry opens the next settlement window.

pub mod advances;
pub mod calculator;
pub mod clock;
pub mod domain;
pub mod error;
pub mod ledger;
pub(crate) mod locks;
pub mod money;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use advances::AdvanceWorkflow;
pub use calculator::{compute_settlement, in_window, SettlementCalculator, SettlementInputs};
pub use clock::{Clock, SystemClock};
pub use domain::{
    Advance, AdvanceId, AdvanceStatus, DeductionLine, Fine, FineStatus, PaymentMethod, PayoutId,
    PayoutLedgerEntry, Purchase, ServiceRecord, SettlementBreakdown, ShareLine, WorkerId,
};
pub use error::{SettlementError, ValidationError};
pub use ledger::{last_payout_time, payout_history, PayoutConfirmation};
pub use money::Money;
pub use policy::SettlementPolicy;
pub use repository::{
    AdvanceRepository, NotificationEvent, NotifyError, PayoutLedger, RepositoryError,
    SourceError, SourceFeeds, WorkerNotifier,
};
pub use router::settlement_router;
pub use service::{SettlementBatch, SettlementService, WorkerFailure};
pub use snapshot::{SnapshotFeeds, SnapshotImportError};
