use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::advances::AdvanceWorkflow;
use super::calculator::{SettlementCalculator, SettlementInputs};
use super::clock::{Clock, SystemClock};
use super::domain::{Advance, AdvanceId, PayoutLedgerEntry, SettlementBreakdown, WorkerId};
use super::error::{SettlementError, ValidationError};
use super::ledger::{self, PayoutConfirmation};
use super::locks::{acquire, WorkerLocks};
use super::money::Money;
use super::policy::SettlementPolicy;
use super::repository::{
    AdvanceRepository, NotificationEvent, PayoutLedger, SourceError, SourceFeeds, WorkerNotifier,
};

/// Facade over the advance workflow, the calculator and the payout ledger.
pub struct SettlementService<F, A, L, N> {
    feeds: Arc<F>,
    ledger: Arc<L>,
    notifier: Arc<N>,
    advances: AdvanceWorkflow<A, N>,
    calculator: SettlementCalculator,
    locks: Arc<WorkerLocks>,
    clock: Arc<dyn Clock>,
}

impl<F, A, L, N> SettlementService<F, A, L, N>
where
    F: SourceFeeds + 'static,
    A: AdvanceRepository + 'static,
    L: PayoutLedger + 'static,
    N: WorkerNotifier + 'static,
{
    pub fn new(
        feeds: Arc<F>,
        advances: Arc<A>,
        ledger: Arc<L>,
        notifier: Arc<N>,
        policy: SettlementPolicy,
    ) -> Self {
        Self::with_clock(feeds, advances, ledger, notifier, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        feeds: Arc<F>,
        advances: Arc<A>,
        ledger: Arc<L>,
        notifier: Arc<N>,
        policy: SettlementPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = Arc::new(WorkerLocks::new());
        let payout_ledger: Arc<dyn PayoutLedger> = ledger.clone();
        let advances = AdvanceWorkflow::new(
            advances,
            notifier.clone(),
            payout_ledger,
            locks.clone(),
            clock.clone(),
            &policy,
        );

        Self {
            feeds,
            ledger,
            notifier,
            advances,
            calculator: SettlementCalculator::new(policy),
            locks,
            clock,
        }
    }

    pub fn policy(&self) -> &SettlementPolicy {
        self.calculator.policy()
    }

    pub fn advances(&self) -> &AdvanceWorkflow<A, N> {
        &self.advances
    }

    pub fn submit_advance(
        &self,
        worker_id: WorkerId,
        amount: Money,
        reason: Option<String>,
    ) -> Result<Advance, SettlementError> {
        self.advances.submit(worker_id, amount, reason)
    }

    pub fn approve_advance(
        &self,
        advance_id: &AdvanceId,
        approver: &str,
    ) -> Result<Advance, SettlementError> {
        self.advances.approve(advance_id, approver)
    }

    pub fn reject_advance(
        &self,
        advance_id: &AdvanceId,
        approver: &str,
    ) -> Result<Advance, SettlementError> {
        self.advances.reject(advance_id, approver)
    }

    pub fn list_pending_advances(&self) -> Result<Vec<Advance>, SettlementError> {
        self.advances.list_pending()
    }

    pub fn advances_for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Advance>, SettlementError> {
        self.advances.advances_for_worker(worker_id)
    }

    pub fn last_payout_time(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Option<DateTime<Utc>>, SettlementError> {
        Ok(ledger::last_payout_time(self.ledger.as_ref(), worker_id)?)
    }

    pub fn payout_history(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Vec<PayoutLedgerEntry>, SettlementError> {
        Ok(ledger::payout_history(self.ledger.as_ref(), worker_id)?)
    }

    /// Read-only preview of the worker's open window. Fails closed when any feed is down.
    pub fn compute_settlement(
        &self,
        worker_id: &WorkerId,
    ) -> Result<SettlementBreakdown, SettlementError> {
        let window_start = self.last_payout_time(worker_id)?;
        self.compute_for_window(worker_id, window_start)
    }

    /// Previews every worker. A worker whose feeds fail or whose data is inconsistent is
    /// reported in `failures` and left out; the rest of the batch still settles.
    pub fn settle_all(&self, workers: &[WorkerId]) -> SettlementBatch {
        let mut batch = SettlementBatch::default();

        for worker_id in workers {
            batch.record(worker_id, self.compute_settlement(worker_id));
        }

        debug!(
            settled = batch.settlements.len(),
            failed = batch.failures.len(),
            "settlement batch computed"
        );
        batch
    }

    /// Appends a payout for an already computed breakdown. The breakdown must have been
    /// computed against the ledger's current window start.
    pub fn register_payout(
        &self,
        worker_id: &WorkerId,
        breakdown: SettlementBreakdown,
        confirmation: PayoutConfirmation,
    ) -> Result<PayoutLedgerEntry, SettlementError> {
        validate_confirmation(&confirmation)?;
        let handle = self.locks.handle(worker_id);
        let _guard = acquire(&handle);

        let window_start = self.last_payout_time(worker_id)?;
        if breakdown.window_start != window_start {
            return Err(ValidationError::StaleWindow {
                computed_from: breakdown.window_start,
                ledger_at: window_start,
            }
            .into());
        }
        self.append_locked(worker_id, window_start, breakdown, confirmation)
    }

    /// Recomputes the open window and registers it in one step, under the worker lock.
    pub fn confirm_payout(
        &self,
        worker_id: &WorkerId,
        confirmation: PayoutConfirmation,
    ) -> Result<PayoutLedgerEntry, SettlementError> {
        validate_confirmation(&confirmation)?;
        let handle = self.locks.handle(worker_id);
        let _guard = acquire(&handle);

        let window_start = self.last_payout_time(worker_id)?;
        let breakdown = self.compute_for_window(worker_id, window_start)?;
        self.append_locked(worker_id, window_start, breakdown, confirmation)
    }

    /// Preview against an explicit window start instead of the ledger's. Used to settle
    /// exported snapshots, where the caller decides the window.
    pub fn compute_for_window(
        &self,
        worker_id: &WorkerId,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<SettlementBreakdown, SettlementError> {
        let unavailable = |source: SourceError| SettlementError::SourceUnavailable {
            worker_id: worker_id.clone(),
            source,
        };

        let services = self
            .feeds
            .fetch_services_since(worker_id, window_start)
            .map_err(unavailable)?;
        let purchases = self
            .feeds
            .fetch_purchases_since(worker_id, window_start)
            .map_err(unavailable)?;
        let fines = self
            .feeds
            .fetch_active_fines_since(worker_id, window_start)
            .map_err(unavailable)?;
        let approved_advances = self
            .advances
            .approved_since(worker_id, window_start)
            .map_err(|err| match err {
                SettlementError::Repository(repo) => unavailable(SourceError::Unavailable {
                    feed: "advances",
                    reason: repo.to_string(),
                }),
                other => other,
            })?;

        self.calculator.compute(
            worker_id,
            window_start,
            SettlementInputs {
                services: &services,
                purchases: &purchases,
                fines: &fines,
                approved_advances: &approved_advances,
            },
        )
    }

    fn append_locked(
        &self,
        worker_id: &WorkerId,
        window_start: Option<DateTime<Utc>>,
        breakdown: SettlementBreakdown,
        confirmation: PayoutConfirmation,
    ) -> Result<PayoutLedgerEntry, SettlementError> {
        if &breakdown.worker_id != worker_id {
            return Err(ValidationError::WorkerMismatch {
                expected: worker_id.clone(),
                found: breakdown.worker_id,
            }
            .into());
        }
        if !breakdown.is_consistent() {
            let err = SettlementError::InconsistentState {
                worker_id: worker_id.clone(),
                detail: "breakdown totals do not match its category lines".to_string(),
            };
            error!(worker_id = %worker_id, error = %err, "refusing to register payout");
            return Err(err);
        }

        let paid_at = self.clock.now();
        if window_start.is_some_and(|last| paid_at <= last) {
            let err = SettlementError::InconsistentState {
                worker_id: worker_id.clone(),
                detail: format!("payout time {paid_at} does not advance past the last payout"),
            };
            error!(worker_id = %worker_id, error = %err, "refusing to register payout");
            return Err(err);
        }

        let entry = ledger::ledger_entry(breakdown, confirmation, paid_at);
        self.ledger.append(entry.clone())?;
        info!(
            payout_id = %entry.id.0,
            worker_id = %entry.worker_id,
            amount = %entry.amount,
            method = entry.method.label(),
            "payout registered"
        );

        if let Err(err) = self.notifier.notify(NotificationEvent::PayoutRegistered {
            worker_id: entry.worker_id.clone(),
            amount: entry.amount,
            paid_at: entry.paid_at,
        }) {
            warn!(worker_id = %entry.worker_id, error = %err, "worker notification failed");
        }

        Ok(entry)
    }
}

fn validate_confirmation(confirmation: &PayoutConfirmation) -> Result<(), ValidationError> {
    if confirmation.performed_by.trim().is_empty() {
        return Err(ValidationError::MissingActor {
            field: "performed_by",
        });
    }
    Ok(())
}

/// Result of previewing many workers at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementBatch {
    pub settlements: Vec<SettlementBreakdown>,
    pub failures: Vec<WorkerFailure>,
    pub total_payable: Money,
}

impl SettlementBatch {
    /// Adds one worker's outcome. A settlement that would overflow the batch total is
    /// reported as inconsistent instead of being added.
    pub fn record(
        &mut self,
        worker_id: &WorkerId,
        outcome: Result<SettlementBreakdown, SettlementError>,
    ) {
        let outcome = outcome.and_then(|breakdown| {
            let total = self
                .total_payable
                .checked_add(breakdown.total_payable)
                .ok_or_else(|| SettlementError::InconsistentState {
                    worker_id: worker_id.clone(),
                    detail: "batch total overflows the supported amount range".to_string(),
                })?;
            Ok((breakdown, total))
        });

        match outcome {
            Ok((breakdown, total)) => {
                self.total_payable = total;
                self.settlements.push(breakdown);
            }
            Err(err) => {
                match &err {
                    SettlementError::InconsistentState { .. } => {
                        error!(worker_id = %worker_id, error = %err, "settlement halted on inconsistent state")
                    }
                    _ => warn!(worker_id = %worker_id, error = %err, "worker excluded from settlement batch"),
                }
                self.failures.push(WorkerFailure {
                    worker_id: worker_id.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerFailure {
    pub worker_id: WorkerId,
    pub kind: &'static str,
    pub message: String,
}
