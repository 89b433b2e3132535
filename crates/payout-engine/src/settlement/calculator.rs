//! Pure settlement computation.
//!
//! Every record is filtered to the open window (strictly after the last payout), then
//! reduced into revenue shares and full deductions. No I/O happens here, so the same inputs
//! always produce the same breakdown. Arithmetic is checked: amounts too large to total are
//! reported as inconsistent state rather than panicking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::domain::{
    Advance, DeductionLine, Fine, FineStatus, Purchase, ServiceRecord, SettlementBreakdown,
    ShareLine, WorkerId,
};
use super::error::SettlementError;
use super::money::Money;
use super::policy::SettlementPolicy;

/// Already-fetched source records for one worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementInputs<'a> {
    pub services: &'a [ServiceRecord],
    pub purchases: &'a [Purchase],
    pub fines: &'a [Fine],
    pub approved_advances: &'a [Advance],
}

/// Stateless calculator bound to a share policy.
#[derive(Debug, Clone)]
pub struct SettlementCalculator {
    policy: SettlementPolicy,
}

impl SettlementCalculator {
    pub fn new(policy: SettlementPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SettlementPolicy {
        &self.policy
    }

    pub fn compute(
        &self,
        worker_id: &WorkerId,
        window_start: Option<DateTime<Utc>>,
        inputs: SettlementInputs<'_>,
    ) -> Result<SettlementBreakdown, SettlementError> {
        compute_settlement(worker_id, window_start, inputs, &self.policy)
    }
}

/// Window membership: strictly after `window_start`, or everything when the worker has
/// never been paid.
pub fn in_window(timestamp: DateTime<Utc>, window_start: Option<DateTime<Utc>>) -> bool {
    window_start.map_or(true, |start| timestamp > start)
}

pub fn compute_settlement(
    worker_id: &WorkerId,
    window_start: Option<DateTime<Utc>>,
    inputs: SettlementInputs<'_>,
    policy: &SettlementPolicy,
) -> Result<SettlementBreakdown, SettlementError> {
    let guard = InputGuard { worker_id };

    let services: Vec<&ServiceRecord> = inputs
        .services
        .iter()
        .filter(|service| in_window(service.completed_at, window_start))
        .collect();
    for service in &services {
        guard.owner(&service.worker_id)?;
        guard.non_negative("service base amount", service.base_amount)?;
        guard.non_negative("service add-on amount", service.add_on_amount)?;
        guard.non_negative("service extended time amount", service.extended_time_amount)?;
    }

    let purchases: Vec<&Purchase> = inputs
        .purchases
        .iter()
        .filter(|purchase| in_window(purchase.occurred_at, window_start))
        .collect();
    for purchase in &purchases {
        guard.owner(&purchase.worker_id)?;
        guard.non_negative("purchase amount", purchase.total_amount)?;
    }

    let fines: Vec<&Fine> = inputs
        .fines
        .iter()
        .filter(|fine| fine.status == FineStatus::Active)
        .filter(|fine| in_window(fine.created_at, window_start))
        .collect();
    for fine in &fines {
        guard.owner(&fine.worker_id)?;
        guard.non_negative("fine amount", fine.amount)?;
    }

    let advances: Vec<&Advance> = inputs
        .approved_advances
        .iter()
        .filter(|advance| {
            advance
                .approved_at()
                .is_some_and(|approved_at| in_window(approved_at, window_start))
        })
        .collect();
    for advance in &advances {
        guard.owner(&advance.worker_id)?;
        guard.non_negative("advance amount", advance.amount)?;
    }

    let service_revenue = guard.sum(
        "service revenue",
        services
            .iter()
            .flat_map(|service| [service.base_amount, service.extended_time_amount]),
    )?;
    let services_line = share_line(&guard, services.len(), service_revenue, policy.service_share)?;

    let add_on_count = services
        .iter()
        .filter(|service| service.add_on_amount.is_positive())
        .count();
    let add_on_revenue = guard.sum(
        "add-on revenue",
        services.iter().map(|service| service.add_on_amount),
    )?;
    let add_ons_line = share_line(&guard, add_on_count, add_on_revenue, policy.add_on_share)?;

    let (in_service, out_of_service): (Vec<&Purchase>, Vec<&Purchase>) =
        purchases.into_iter().partition(|purchase| purchase.during_service);
    let consumption_revenue = guard.sum(
        "consumption revenue",
        in_service.iter().map(|purchase| purchase.total_amount),
    )?;
    let consumption_line = share_line(
        &guard,
        in_service.len(),
        consumption_revenue,
        policy.consumption_share,
    )?;

    let out_of_service_line = DeductionLine {
        count: out_of_service.len(),
        amount: guard.sum(
            "out-of-service purchases",
            out_of_service.iter().map(|purchase| purchase.total_amount),
        )?,
    };
    let fines_line = DeductionLine {
        count: fines.len(),
        amount: guard.sum("active fines", fines.iter().map(|fine| fine.amount))?,
    };
    let advances_line = DeductionLine {
        count: advances.len(),
        amount: guard.sum("approved advances", advances.iter().map(|advance| advance.amount))?,
    };

    let service_reported_consumption = guard.sum(
        "service reported consumption",
        services
            .iter()
            .map(|service| service.in_service_consumption_amount),
    )?;

    let subtotal = guard.sum(
        "subtotal",
        [services_line.share, add_ons_line.share, consumption_line.share],
    )?;
    if subtotal.is_negative() {
        return Err(guard.inconsistent(format!("computed subtotal {subtotal} is negative")));
    }
    let deductions = guard.sum(
        "deductions",
        [
            out_of_service_line.amount,
            fines_line.amount,
            advances_line.amount,
        ],
    )?;
    let total_payable = subtotal
        .checked_sub(deductions)
        .ok_or_else(|| guard.overflow("payable total"))?
        .clamp_non_negative();

    Ok(SettlementBreakdown {
        worker_id: worker_id.clone(),
        window_start,
        services: services_line,
        add_ons: add_ons_line,
        consumption: consumption_line,
        out_of_service_purchases: out_of_service_line,
        active_fines: fines_line,
        advances: advances_line,
        service_reported_consumption,
        subtotal,
        deductions,
        total_payable,
    })
}

fn share_line(
    guard: &InputGuard<'_>,
    count: usize,
    revenue: Money,
    rate: Decimal,
) -> Result<ShareLine, SettlementError> {
    let share = revenue
        .checked_share(rate)
        .ok_or_else(|| guard.overflow("share"))?;
    Ok(ShareLine {
        count,
        revenue,
        rate,
        share,
    })
}

struct InputGuard<'a> {
    worker_id: &'a WorkerId,
}

impl InputGuard<'_> {
    fn owner(&self, owner: &WorkerId) -> Result<(), SettlementError> {
        if owner == self.worker_id {
            Ok(())
        } else {
            Err(self.inconsistent(format!("received a record owned by worker {owner}")))
        }
    }

    fn non_negative(&self, field: &str, amount: Money) -> Result<(), SettlementError> {
        if amount.is_negative() {
            Err(self.inconsistent(format!("{field} {amount} is negative")))
        } else {
            Ok(())
        }
    }

    fn sum<I>(&self, what: &str, amounts: I) -> Result<Money, SettlementError>
    where
        I: IntoIterator<Item = Money>,
    {
        Money::checked_sum(amounts).ok_or_else(|| self.overflow(what))
    }

    fn overflow(&self, what: &str) -> SettlementError {
        self.inconsistent(format!("{what} overflows the supported amount range"))
    }

    fn inconsistent(&self, detail: String) -> SettlementError {
        SettlementError::InconsistentState {
            worker_id: self.worker_id.clone(),
            detail,
        }
    }
}
