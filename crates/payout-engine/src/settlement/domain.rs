use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;

/// Identifier of a staffed worker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdvanceId(pub String);

impl AdvanceId {
    pub fn generate() -> Self {
        Self(format!("adv-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for AdvanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutId(pub String);

impl PayoutId {
    pub fn generate() -> Self {
        Self(format!("pay-{}", Uuid::new_v4()))
    }
}

/// Completed service as reported by the service-tracking subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub worker_id: WorkerId,
    pub base_amount: Money,
    pub add_on_amount: Money,
    /// Consumption as captured on the service itself. Shown for reference only; settlement
    /// credits consumption from in-service purchases.
    pub in_service_consumption_amount: Money,
    pub extended_time_amount: Money,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub worker_id: WorkerId,
    pub total_amount: Money,
    pub during_service: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineStatus {
    Active,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub worker_id: WorkerId,
    pub amount: Money,
    pub status: FineStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceStatus {
    Pending,
    Approved,
    Rejected,
}

impl AdvanceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AdvanceStatus::Pending => "pending",
            AdvanceStatus::Approved => "approved",
            AdvanceStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AdvanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cash advance request. Starts `Pending` and resolves exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    pub id: AdvanceId,
    pub worker_id: WorkerId,
    pub amount: Money,
    pub requested_at: DateTime<Utc>,
    pub status: AdvanceStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub reason: Option<String>,
}

impl Advance {
    pub fn is_pending(&self) -> bool {
        self.status == AdvanceStatus::Pending
    }

    /// Timestamp used for settlement windowing: the moment the advance was approved.
    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            AdvanceStatus::Approved => self.resolved_at,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Other,
}

impl PaymentMethod {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Other => "other",
        }
    }
}

/// Revenue category credited to the worker at a fixed rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLine {
    pub count: usize,
    pub revenue: Money,
    pub rate: Decimal,
    pub share: Money,
}

/// Deduction category charged in full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionLine {
    pub count: usize,
    pub amount: Money,
}

/// Full settlement for one worker over one window. Carries every category so the payable
/// amount can be reconstructed and audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
    pub worker_id: WorkerId,
    pub window_start: Option<DateTime<Utc>>,
    pub services: ShareLine,
    pub add_ons: ShareLine,
    pub consumption: ShareLine,
    pub out_of_service_purchases: DeductionLine,
    pub active_fines: DeductionLine,
    pub advances: DeductionLine,
    pub service_reported_consumption: Money,
    pub subtotal: Money,
    pub deductions: Money,
    pub total_payable: Money,
}

impl SettlementBreakdown {
    /// Re-derives subtotal, deductions and payable from the category lines.
    pub fn is_consistent(&self) -> bool {
        let subtotal =
            Money::checked_sum([self.services.share, self.add_ons.share, self.consumption.share]);
        let deductions = Money::checked_sum([
            self.out_of_service_purchases.amount,
            self.active_fines.amount,
            self.advances.amount,
        ]);
        let shares_match = [&self.services, &self.add_ons, &self.consumption]
            .iter()
            .all(|line| line.revenue.checked_share(line.rate) == Some(line.share));
        let payable = self
            .subtotal
            .checked_sub(self.deductions)
            .map(Money::clamp_non_negative);

        shares_match
            && subtotal == Some(self.subtotal)
            && deductions == Some(self.deductions)
            && !self.subtotal.is_negative()
            && payable == Some(self.total_payable)
    }
}

/// Append-only record of an executed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLedgerEntry {
    pub id: PayoutId,
    pub worker_id: WorkerId,
    pub paid_at: DateTime<Utc>,
    pub amount: Money,
    pub breakdown: SettlementBreakdown,
    pub method: PaymentMethod,
    pub performed_by: String,
    pub notes: Option<String>,
}
