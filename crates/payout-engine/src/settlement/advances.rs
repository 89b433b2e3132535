use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::clock::Clock;
use super::domain::{Advance, AdvanceId, AdvanceStatus, WorkerId};
use super::error::{SettlementError, ValidationError};
use super::ledger;
use super::locks::{acquire, WorkerLocks};
use super::money::Money;
use super::policy::SettlementPolicy;
use super::repository::{AdvanceRepository, NotificationEvent, PayoutLedger, WorkerNotifier};

/// Cash-advance approval workflow: `pending -> approved | rejected`, nothing else.
pub struct AdvanceWorkflow<A, N> {
    repository: Arc<A>,
    notifier: Arc<N>,
    ledger: Arc<dyn PayoutLedger>,
    locks: Arc<WorkerLocks>,
    clock: Arc<dyn Clock>,
    max_advance: Money,
}

impl<A, N> AdvanceWorkflow<A, N>
where
    A: AdvanceRepository + 'static,
    N: WorkerNotifier + 'static,
{
    pub(crate) fn new(
        repository: Arc<A>,
        notifier: Arc<N>,
        ledger: Arc<dyn PayoutLedger>,
        locks: Arc<WorkerLocks>,
        clock: Arc<dyn Clock>,
        policy: &SettlementPolicy,
    ) -> Self {
        Self {
            repository,
            notifier,
            ledger,
            locks,
            clock,
            max_advance: policy.max_advance,
        }
    }

    pub fn submit(
        &self,
        worker_id: WorkerId,
        amount: Money,
        reason: Option<String>,
    ) -> Result<Advance, SettlementError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount { amount }.into());
        }
        if amount > self.max_advance {
            return Err(ValidationError::ExceedsMaximum {
                amount,
                max: self.max_advance,
            }
            .into());
        }

        let advance = Advance {
            id: AdvanceId::generate(),
            worker_id,
            amount,
            requested_at: self.clock.now(),
            status: AdvanceStatus::Pending,
            resolved_at: None,
            resolved_by: None,
            reason: reason.filter(|reason| !reason.trim().is_empty()),
        };

        let stored = self.repository.insert(advance)?;
        info!(advance_id = %stored.id, worker_id = %stored.worker_id, amount = %stored.amount, "advance submitted");
        Ok(stored)
    }

    pub fn approve(
        &self,
        advance_id: &AdvanceId,
        approver: &str,
    ) -> Result<Advance, SettlementError> {
        let approved = self.resolve(advance_id, approver, AdvanceStatus::Approved)?;
        self.dispatch(NotificationEvent::AdvanceApproved {
            worker_id: approved.worker_id.clone(),
            advance_id: approved.id.clone(),
            amount: approved.amount,
        });
        Ok(approved)
    }

    pub fn reject(
        &self,
        advance_id: &AdvanceId,
        approver: &str,
    ) -> Result<Advance, SettlementError> {
        let rejected = self.resolve(advance_id, approver, AdvanceStatus::Rejected)?;
        self.dispatch(NotificationEvent::AdvanceRejected {
            worker_id: rejected.worker_id.clone(),
            advance_id: rejected.id.clone(),
            amount: rejected.amount,
        });
        Ok(rejected)
    }

    /// Review queue, oldest request first.
    pub fn list_pending(&self) -> Result<Vec<Advance>, SettlementError> {
        let mut pending = self.repository.pending()?;
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(pending)
    }

    pub fn advances_for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Advance>, SettlementError> {
        let mut advances = self.repository.for_worker(worker_id)?;
        advances.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(advances)
    }

    /// Approved advances resolved strictly after `window_start`, the same window rule the
    /// calculator applies.
    pub fn approved_since(
        &self,
        worker_id: &WorkerId,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<Vec<Advance>, SettlementError> {
        let advances = self.repository.approved_since(worker_id, window_start)?;
        Ok(advances
            .into_iter()
            .filter(|advance| {
                advance
                    .approved_at()
                    .is_some_and(|at| super::calculator::in_window(at, window_start))
            })
            .collect())
    }

    pub fn approved_total_since(
        &self,
        worker_id: &WorkerId,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<Money, SettlementError> {
        let advances = self.approved_since(worker_id, window_start)?;
        Money::checked_sum(advances.iter().map(|advance| advance.amount)).ok_or_else(|| {
            SettlementError::InconsistentState {
                worker_id: worker_id.clone(),
                detail: "approved advances overflow the supported amount range".to_string(),
            }
        })
    }

    fn resolve(
        &self,
        advance_id: &AdvanceId,
        approver: &str,
        target: AdvanceStatus,
    ) -> Result<Advance, SettlementError> {
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(ValidationError::MissingActor { field: "approver" }.into());
        }

        let worker_id = self.load(advance_id)?.worker_id;
        let handle = self.locks.handle(&worker_id);
        let _guard = acquire(&handle);

        // Re-read under the lock; a concurrent resolution may have won the race.
        let mut advance = self.load(advance_id)?;
        if !advance.is_pending() {
            return Err(SettlementError::InvalidStateTransition {
                advance_id: advance.id,
                current: advance.status,
                attempted: target,
            });
        }

        let resolved_at = self.clock.now();
        if target == AdvanceStatus::Approved {
            // An approval stamped at or before the last payout would fall outside every
            // open window and never be deducted.
            let last_payout = ledger::last_payout_time(self.ledger.as_ref(), &advance.worker_id)?;
            if last_payout.is_some_and(|paid_at| resolved_at <= paid_at) {
                let err = SettlementError::InconsistentState {
                    worker_id: advance.worker_id.clone(),
                    detail: format!(
                        "approval time {resolved_at} does not advance past the last payout"
                    ),
                };
                error!(advance_id = %advance.id, error = %err, "refusing to approve advance");
                return Err(err);
            }
        }

        advance.status = target;
        advance.resolved_at = Some(resolved_at);
        advance.resolved_by = Some(approver.to_string());
        self.repository.update(advance.clone())?;

        info!(
            advance_id = %advance.id,
            worker_id = %advance.worker_id,
            status = advance.status.label(),
            resolved_by = approver,
            "advance resolved"
        );
        Ok(advance)
    }

    fn load(&self, advance_id: &AdvanceId) -> Result<Advance, SettlementError> {
        self.repository
            .fetch(advance_id)?
            .ok_or_else(|| SettlementError::AdvanceNotFound(advance_id.clone()))
    }

    fn dispatch(&self, event: NotificationEvent) {
        if let Err(err) = self.notifier.notify(event.clone()) {
            warn!(worker_id = %event.worker_id(), error = %err, "worker notification failed");
        }
    }
}
