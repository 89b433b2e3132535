//! CSV snapshots of the service, purchase and fine feeds.
//!
//! The admin console can export its records as CSV; loading a directory of exports gives an
//! in-memory [`SourceFeeds`] that the settlement engine can preview against.

use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use super::calculator::in_window;
use super::domain::{Fine, FineStatus, Purchase, ServiceRecord, WorkerId};
use super::money::Money;
use super::repository::{SourceError, SourceFeeds};

pub const SERVICES_FILE: &str = "services.csv";
pub const PURCHASES_FILE: &str = "purchases.csv";
pub const FINES_FILE: &str = "fines.csv";

#[derive(Debug)]
pub enum SnapshotImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow {
        file: &'static str,
        row: usize,
        reason: String,
    },
}

impl fmt::Display for SnapshotImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotImportError::Io(err) => write!(f, "failed to read snapshot: {}", err),
            SnapshotImportError::Csv(err) => write!(f, "invalid snapshot CSV data: {}", err),
            SnapshotImportError::InvalidRow { file, row, reason } => {
                write!(f, "{} row {}: {}", file, row, reason)
            }
        }
    }
}

impl std::error::Error for SnapshotImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotImportError::Io(err) => Some(err),
            SnapshotImportError::Csv(err) => Some(err),
            SnapshotImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for SnapshotImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for SnapshotImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Source feeds backed by records loaded up front.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFeeds {
    services: Vec<ServiceRecord>,
    purchases: Vec<Purchase>,
    fines: Vec<Fine>,
}

impl SnapshotFeeds {
    pub fn new(services: Vec<ServiceRecord>, purchases: Vec<Purchase>, fines: Vec<Fine>) -> Self {
        Self {
            services,
            purchases,
            fines,
        }
    }

    /// Loads `services.csv`, `purchases.csv` and `fines.csv` from `dir`. A missing file is
    /// an empty feed.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, SnapshotImportError> {
        let dir = dir.as_ref();
        let services = match open_optional(&dir.join(SERVICES_FILE))? {
            Some(file) => parse_services(file)?,
            None => Vec::new(),
        };
        let purchases = match open_optional(&dir.join(PURCHASES_FILE))? {
            Some(file) => parse_purchases(file)?,
            None => Vec::new(),
        };
        let fines = match open_optional(&dir.join(FINES_FILE))? {
            Some(file) => parse_fines(file)?,
            None => Vec::new(),
        };
        Ok(Self::new(services, purchases, fines))
    }

    /// Every worker that appears in any feed, sorted and deduplicated.
    pub fn workers(&self) -> Vec<WorkerId> {
        let mut workers: Vec<WorkerId> = self
            .services
            .iter()
            .map(|record| record.worker_id.clone())
            .chain(self.purchases.iter().map(|record| record.worker_id.clone()))
            .chain(self.fines.iter().map(|record| record.worker_id.clone()))
            .collect();
        workers.sort();
        workers.dedup();
        workers
    }
}

impl SourceFeeds for SnapshotFeeds {
    fn fetch_services_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ServiceRecord>, SourceError> {
        Ok(self
            .services
            .iter()
            .filter(|record| &record.worker_id == worker_id && in_window(record.completed_at, since))
            .cloned()
            .collect())
    }

    fn fetch_purchases_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Purchase>, SourceError> {
        Ok(self
            .purchases
            .iter()
            .filter(|record| &record.worker_id == worker_id && in_window(record.occurred_at, since))
            .cloned()
            .collect())
    }

    fn fetch_active_fines_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Fine>, SourceError> {
        Ok(self
            .fines
            .iter()
            .filter(|record| {
                &record.worker_id == worker_id
                    && record.status == FineStatus::Active
                    && in_window(record.created_at, since)
            })
            .cloned()
            .collect())
    }
}

fn open_optional(path: &Path) -> Result<Option<std::fs::File>, SnapshotImportError> {
    match std::fs::File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

pub fn parse_services<R: Read>(input: R) -> Result<Vec<ServiceRecord>, SnapshotImportError> {
    let mut records = Vec::new();
    for (index, row) in reader(input).deserialize::<ServiceRow>().enumerate() {
        let row = row?;
        let at = RowContext::new(SERVICES_FILE, index);
        records.push(ServiceRecord {
            worker_id: at.worker(row.worker_id)?,
            base_amount: at.money("base_amount", row.base_amount.as_deref())?,
            add_on_amount: at.money("add_on_amount", row.add_on_amount.as_deref())?,
            in_service_consumption_amount: at.money(
                "in_service_consumption_amount",
                row.in_service_consumption_amount.as_deref(),
            )?,
            extended_time_amount: at
                .money("extended_time_amount", row.extended_time_amount.as_deref())?,
            completed_at: at.timestamp("completed_at", &row.completed_at)?,
        });
    }
    Ok(records)
}

pub fn parse_purchases<R: Read>(input: R) -> Result<Vec<Purchase>, SnapshotImportError> {
    let mut records = Vec::new();
    for (index, row) in reader(input).deserialize::<PurchaseRow>().enumerate() {
        let row = row?;
        let at = RowContext::new(PURCHASES_FILE, index);
        records.push(Purchase {
            worker_id: at.worker(row.worker_id)?,
            total_amount: at.money("total_amount", row.total_amount.as_deref())?,
            during_service: at.flag("during_service", &row.during_service)?,
            occurred_at: at.timestamp("occurred_at", &row.occurred_at)?,
        });
    }
    Ok(records)
}

pub fn parse_fines<R: Read>(input: R) -> Result<Vec<Fine>, SnapshotImportError> {
    let mut records = Vec::new();
    for (index, row) in reader(input).deserialize::<FineRow>().enumerate() {
        let row = row?;
        let at = RowContext::new(FINES_FILE, index);
        records.push(Fine {
            worker_id: at.worker(row.worker_id)?,
            amount: at.money("amount", row.amount.as_deref())?,
            status: at.fine_status(&row.status)?,
            created_at: at.timestamp("created_at", &row.created_at)?,
        });
    }
    Ok(records)
}

#[derive(Debug, Deserialize)]
struct ServiceRow {
    worker_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    base_amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    add_on_amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    in_service_consumption_amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    extended_time_amount: Option<String>,
    completed_at: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseRow {
    worker_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    total_amount: Option<String>,
    during_service: String,
    occurred_at: String,
}

#[derive(Debug, Deserialize)]
struct FineRow {
    worker_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    amount: Option<String>,
    status: String,
    created_at: String,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

struct RowContext {
    file: &'static str,
    row: usize,
}

impl RowContext {
    // Header is line 1, so the first data row is line 2.
    fn new(file: &'static str, index: usize) -> Self {
        Self {
            file,
            row: index + 2,
        }
    }

    fn invalid(&self, reason: String) -> SnapshotImportError {
        SnapshotImportError::InvalidRow {
            file: self.file,
            row: self.row,
            reason,
        }
    }

    fn worker(&self, raw: String) -> Result<WorkerId, SnapshotImportError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(self.invalid("worker_id is empty".to_string()));
        }
        Ok(WorkerId::new(trimmed))
    }

    fn money(&self, field: &str, raw: Option<&str>) -> Result<Money, SnapshotImportError> {
        match raw {
            None => Ok(Money::ZERO),
            Some(value) => {
                let amount = value.parse::<Money>().map_err(|err| {
                    self.invalid(format!("{field} '{value}' is not a decimal ({err})"))
                })?;
                if amount > Money::MAX_RECORD_AMOUNT {
                    return Err(self.invalid(format!(
                        "{field} {amount} exceeds the largest accepted amount {}",
                        Money::MAX_RECORD_AMOUNT
                    )));
                }
                Ok(amount)
            }
        }
    }

    fn flag(&self, field: &str, raw: &str) -> Result<bool, SnapshotImportError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(self.invalid(format!("{field} '{other}' is not a boolean"))),
        }
    }

    fn fine_status(&self, raw: &str) -> Result<FineStatus, SnapshotImportError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(FineStatus::Active),
            "paid" => Ok(FineStatus::Paid),
            "cancelled" | "canceled" => Ok(FineStatus::Cancelled),
            other => Err(self.invalid(format!("status '{other}' is not a fine status"))),
        }
    }

    fn timestamp(&self, field: &str, raw: &str) -> Result<DateTime<Utc>, SnapshotImportError> {
        parse_timestamp(raw)
            .ok_or_else(|| self.invalid(format!("{field} '{raw}' is not an RFC 3339 timestamp")))
    }
}

/// Accepts RFC 3339 timestamps, or bare `YYYY-MM-DD` dates taken as midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
