use chrono::{DateTime, Utc};

use super::domain::{PaymentMethod, PayoutId, PayoutLedgerEntry, SettlementBreakdown, WorkerId};
use super::repository::{PayoutLedger, RepositoryError};

/// Latest `paid_at` for the worker. This is the only source of a settlement window start.
pub fn last_payout_time<L>(
    ledger: &L,
    worker_id: &WorkerId,
) -> Result<Option<DateTime<Utc>>, RepositoryError>
where
    L: PayoutLedger + ?Sized,
{
    let entries = ledger.entries_for(worker_id)?;
    Ok(entries.iter().map(|entry| entry.paid_at).max())
}

/// Payouts for the worker, oldest first.
pub fn payout_history<L>(
    ledger: &L,
    worker_id: &WorkerId,
) -> Result<Vec<PayoutLedgerEntry>, RepositoryError>
where
    L: PayoutLedger + ?Sized,
{
    let mut entries = ledger.entries_for(worker_id)?;
    entries.sort_by(|a, b| a.paid_at.cmp(&b.paid_at));
    Ok(entries)
}

/// Details supplied by the admin confirming a payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutConfirmation {
    pub performed_by: String,
    pub method: PaymentMethod,
    pub notes: Option<String>,
}

pub(crate) fn ledger_entry(
    breakdown: SettlementBreakdown,
    confirmation: PayoutConfirmation,
    paid_at: DateTime<Utc>,
) -> PayoutLedgerEntry {
    PayoutLedgerEntry {
        id: PayoutId::generate(),
        worker_id: breakdown.worker_id.clone(),
        paid_at,
        amount: breakdown.total_payable,
        breakdown,
        method: confirmation.method,
        performed_by: confirmation.performed_by,
        notes: confirmation.notes.filter(|notes| !notes.trim().is_empty()),
    }
}
