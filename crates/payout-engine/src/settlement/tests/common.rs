use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::settlement::calculator::in_window;
use crate::settlement::clock::Clock;
use crate::settlement::domain::{
    Advance, AdvanceId, AdvanceStatus, Fine, FineStatus, PaymentMethod, PayoutLedgerEntry,
    Purchase, ServiceRecord, WorkerId,
};
use crate::settlement::ledger::PayoutConfirmation;
use crate::settlement::money::Money;
use crate::settlement::policy::SettlementPolicy;
use crate::settlement::repository::{
    AdvanceRepository, NotificationEvent, NotifyError, PayoutLedger, RepositoryError,
    SourceError, SourceFeeds, WorkerNotifier,
};
use crate::settlement::service::SettlementService;

pub(super) fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub(super) fn start() -> DateTime<Utc> {
    ts("2025-03-01T10:00:00Z")
}

pub(super) fn worker() -> WorkerId {
    WorkerId::new("modelo-ana")
}

pub(super) fn other_worker() -> WorkerId {
    WorkerId::new("modelo-bea")
}

pub(super) fn service(base: i64, add_on: i64, extended: i64, at: DateTime<Utc>) -> ServiceRecord {
    service_for(&worker(), base, add_on, extended, at)
}

pub(super) fn service_for(
    worker_id: &WorkerId,
    base: i64,
    add_on: i64,
    extended: i64,
    at: DateTime<Utc>,
) -> ServiceRecord {
    ServiceRecord {
        worker_id: worker_id.clone(),
        base_amount: Money::from(base),
        add_on_amount: Money::from(add_on),
        in_service_consumption_amount: Money::ZERO,
        extended_time_amount: Money::from(extended),
        completed_at: at,
    }
}

pub(super) fn purchase(amount: i64, during_service: bool, at: DateTime<Utc>) -> Purchase {
    Purchase {
        worker_id: worker(),
        total_amount: Money::from(amount),
        during_service,
        occurred_at: at,
    }
}

pub(super) fn fine(amount: i64, status: FineStatus, at: DateTime<Utc>) -> Fine {
    Fine {
        worker_id: worker(),
        amount: Money::from(amount),
        status,
        created_at: at,
    }
}

pub(super) fn advance(amount: i64, status: AdvanceStatus, resolved_at: DateTime<Utc>) -> Advance {
    Advance {
        id: AdvanceId::generate(),
        worker_id: worker(),
        amount: Money::from(amount),
        requested_at: resolved_at - Duration::hours(1),
        status,
        resolved_at: Some(resolved_at),
        resolved_by: Some("admin1".to_string()),
        reason: None,
    }
}

pub(super) fn confirmation() -> PayoutConfirmation {
    PayoutConfirmation {
        performed_by: "admin1".to_string(),
        method: PaymentMethod::Cash,
        notes: Some("weekly close".to_string()),
    }
}

/// Clock pinned to a settable instant.
pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default)]
pub(super) struct MemoryFeeds {
    services: Mutex<Vec<ServiceRecord>>,
    purchases: Mutex<Vec<Purchase>>,
    fines: Mutex<Vec<Fine>>,
    failing: Mutex<HashSet<WorkerId>>,
}

impl MemoryFeeds {
    pub(super) fn add_service(&self, record: ServiceRecord) {
        self.services.lock().expect("feed mutex poisoned").push(record);
    }

    pub(super) fn add_purchase(&self, record: Purchase) {
        self.purchases.lock().expect("feed mutex poisoned").push(record);
    }

    pub(super) fn add_fine(&self, record: Fine) {
        self.fines.lock().expect("feed mutex poisoned").push(record);
    }

    pub(super) fn fail_for(&self, worker_id: &WorkerId) {
        self.failing
            .lock()
            .expect("feed mutex poisoned")
            .insert(worker_id.clone());
    }

    fn check(&self, feed: &'static str, worker_id: &WorkerId) -> Result<(), SourceError> {
        if self.failing.lock().expect("feed mutex poisoned").contains(worker_id) {
            return Err(SourceError::Unavailable {
                feed,
                reason: "backend timeout".to_string(),
            });
        }
        Ok(())
    }
}

impl SourceFeeds for MemoryFeeds {
    fn fetch_services_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ServiceRecord>, SourceError> {
        self.check("services", worker_id)?;
        Ok(self
            .services
            .lock()
            .expect("feed mutex poisoned")
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
        self.check("purchases", worker_id)?;
        Ok(self
            .purchases
            .lock()
            .expect("feed mutex poisoned")
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
        self.check("fines", worker_id)?;
        Ok(self
            .fines
            .lock()
            .expect("feed mutex poisoned")
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

#[derive(Default)]
pub(super) struct MemoryAdvances {
    records: Mutex<HashMap<AdvanceId, Advance>>,
    unavailable: AtomicBool,
}

impl MemoryAdvances {
    pub(super) fn go_offline(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn online(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("database offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AdvanceRepository for MemoryAdvances {
    fn insert(&self, advance: Advance) -> Result<Advance, RepositoryError> {
        self.online()?;
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&advance.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(advance.id.clone(), advance.clone());
        Ok(advance)
    }

    fn update(&self, advance: Advance) -> Result<(), RepositoryError> {
        self.online()?;
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(advance.id.clone(), advance);
        Ok(())
    }

    fn fetch(&self, id: &AdvanceId) -> Result<Option<Advance>, RepositoryError> {
        self.online()?;
        Ok(self
            .records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned())
    }

    fn pending(&self) -> Result<Vec<Advance>, RepositoryError> {
        self.online()?;
        Ok(self
            .records
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .filter(|advance| advance.is_pending())
            .cloned()
            .collect())
    }

    fn for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Advance>, RepositoryError> {
        self.online()?;
        Ok(self
            .records
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .filter(|advance| &advance.worker_id == worker_id)
            .cloned()
            .collect())
    }

    fn approved_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Advance>, RepositoryError> {
        self.online()?;
        Ok(self
            .records
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .filter(|advance| {
                &advance.worker_id == worker_id
                    && advance
                        .approved_at()
                        .is_some_and(|at| in_window(at, since))
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryLedger {
    entries: Mutex<Vec<PayoutLedgerEntry>>,
}

impl MemoryLedger {
    pub(super) fn all(&self) -> Vec<PayoutLedgerEntry> {
        self.entries.lock().expect("ledger mutex poisoned").clone()
    }
}

impl PayoutLedger for MemoryLedger {
    fn append(&self, entry: PayoutLedgerEntry) -> Result<(), RepositoryError> {
        self.entries
            .lock()
            .expect("ledger mutex poisoned")
            .push(entry);
        Ok(())
    }

    fn entries_for(&self, worker_id: &WorkerId) -> Result<Vec<PayoutLedgerEntry>, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .expect("ledger mutex poisoned")
            .iter()
            .filter(|entry| &entry.worker_id == worker_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn break_transport(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl WorkerNotifier for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("push gateway down".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) type TestService =
    SettlementService<MemoryFeeds, MemoryAdvances, MemoryLedger, RecordingNotifier>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) feeds: Arc<MemoryFeeds>,
    pub(super) advances: Arc<MemoryAdvances>,
    pub(super) ledger: Arc<MemoryLedger>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn harness() -> Harness {
    let feeds = Arc::new(MemoryFeeds::default());
    let advances = Arc::new(MemoryAdvances::default());
    let ledger = Arc::new(MemoryLedger::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(FixedClock::new(start()));
    let service = Arc::new(SettlementService::with_clock(
        feeds.clone(),
        advances.clone(),
        ledger.clone(),
        notifier.clone(),
        SettlementPolicy::default(),
        clock.clone(),
    ));

    Harness {
        service,
        feeds,
        advances,
        ledger,
        notifier,
        clock,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
