use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Advance, AdvanceId, Fine, PayoutLedgerEntry, Purchase, ServiceRecord, WorkerId,
};
use super::money::Money;

/// Read-only feeds of revenue and deduction records owned by other subsystems.
///
/// `since` is exclusive. `None` means the worker has never been paid and every record is
/// in scope.
pub trait SourceFeeds: Send + Sync {
    fn fetch_services_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ServiceRecord>, SourceError>;

    fn fetch_purchases_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Purchase>, SourceError>;

    fn fetch_active_fines_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Fine>, SourceError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("{feed} feed unavailable: {reason}")]
    Unavailable { feed: &'static str, reason: String },
}

/// Storage for cash advances. The approval workflow is the only writer.
pub trait AdvanceRepository: Send + Sync {
    fn insert(&self, advance: Advance) -> Result<Advance, RepositoryError>;
    fn update(&self, advance: Advance) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AdvanceId) -> Result<Option<Advance>, RepositoryError>;
    fn pending(&self) -> Result<Vec<Advance>, RepositoryError>;
    fn for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Advance>, RepositoryError>;
    /// Approved advances whose approval happened strictly after `since`.
    fn approved_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Advance>, RepositoryError>;
}

/// Append-only payout log. Implementations must make `append` durable before returning.
pub trait PayoutLedger: Send + Sync {
    fn append(&self, entry: PayoutLedgerEntry) -> Result<(), RepositoryError>;
    fn entries_for(&self, worker_id: &WorkerId) -> Result<Vec<PayoutLedgerEntry>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound worker notifications (push, e-mail). Delivery is best effort.
pub trait WorkerNotifier: Send + Sync {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    AdvanceApproved {
        worker_id: WorkerId,
        advance_id: AdvanceId,
        amount: Money,
    },
    AdvanceRejected {
        worker_id: WorkerId,
        advance_id: AdvanceId,
        amount: Money,
    },
    PayoutRegistered {
        worker_id: WorkerId,
        amount: Money,
        paid_at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn worker_id(&self) -> &WorkerId {
        match self {
            NotificationEvent::AdvanceApproved { worker_id, .. }
            | NotificationEvent::AdvanceRejected { worker_id, .. }
            | NotificationEvent::PayoutRegistered { worker_id, .. } => worker_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
