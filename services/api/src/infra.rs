use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use payout_engine::settlement::snapshot::parse_timestamp;
use payout_engine::settlement::{
    in_window, Advance, AdvanceId, AdvanceRepository, Fine, FineStatus, NotificationEvent,
    NotifyError, PayoutLedger, PayoutLedgerEntry, Purchase, RepositoryError, ServiceRecord,
    SourceError, SourceFeeds, WorkerId, WorkerNotifier,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAdvanceRepository {
    records: Arc<Mutex<HashMap<AdvanceId, Advance>>>,
}

impl AdvanceRepository for InMemoryAdvanceRepository {
    fn insert(&self, advance: Advance) -> Result<Advance, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&advance.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(advance.id.clone(), advance.clone());
        Ok(advance)
    }

    fn update(&self, advance: Advance) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&advance.id) {
            guard.insert(advance.id.clone(), advance);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &AdvanceId) -> Result<Option<Advance>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn pending(&self) -> Result<Vec<Advance>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|advance| advance.is_pending())
            .cloned()
            .collect())
    }

    fn for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Advance>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
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
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
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

#[derive(Default, Clone)]
pub(crate) struct InMemoryPayoutLedger {
    entries: Arc<Mutex<Vec<PayoutLedgerEntry>>>,
}

impl PayoutLedger for InMemoryPayoutLedger {
    fn append(&self, entry: PayoutLedgerEntry) -> Result<(), RepositoryError> {
        let mut guard = self.entries.lock().expect("ledger mutex poisoned");
        if guard.iter().any(|existing| existing.id == entry.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(entry);
        Ok(())
    }

    fn entries_for(&self, worker_id: &WorkerId) -> Result<Vec<PayoutLedgerEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("ledger mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| &entry.worker_id == worker_id)
            .cloned()
            .collect())
    }
}

impl InMemoryPayoutLedger {
    pub(crate) fn all(&self) -> Vec<PayoutLedgerEntry> {
        self.entries.lock().expect("ledger mutex poisoned").clone()
    }
}

/// Source feeds that accept records while the process runs.
#[derive(Default, Clone)]
pub(crate) struct InMemorySourceFeeds {
    services: Arc<Mutex<Vec<ServiceRecord>>>,
    purchases: Arc<Mutex<Vec<Purchase>>>,
    fines: Arc<Mutex<Vec<Fine>>>,
}

impl InMemorySourceFeeds {
    pub(crate) fn record_service(&self, record: ServiceRecord) {
        self.services.lock().expect("feed mutex poisoned").push(record);
    }

    pub(crate) fn record_purchase(&self, record: Purchase) {
        self.purchases.lock().expect("feed mutex poisoned").push(record);
    }

    pub(crate) fn record_fine(&self, record: Fine) {
        self.fines.lock().expect("feed mutex poisoned").push(record);
    }
}

impl SourceFeeds for InMemorySourceFeeds {
    fn fetch_services_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ServiceRecord>, SourceError> {
        let guard = self.services.lock().expect("feed mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| {
                &record.worker_id == worker_id && in_window(record.completed_at, since)
            })
            .cloned()
            .collect())
    }

    fn fetch_purchases_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Purchase>, SourceError> {
        let guard = self.purchases.lock().expect("feed mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| {
                &record.worker_id == worker_id && in_window(record.occurred_at, since)
            })
            .cloned()
            .collect())
    }

    fn fetch_active_fines_since(
        &self,
        worker_id: &WorkerId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Fine>, SourceError> {
        let guard = self.fines.lock().expect("feed mutex poisoned");
        Ok(guard
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

/// Notifier that writes every event to the log instead of a push gateway.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier;

impl WorkerNotifier for LoggingNotifier {
    fn notify(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(&event).map_err(|err| NotifyError::Transport(err.to_string()))?;
        info!(worker_id = %event.worker_id(), %payload, "worker notification");
        Ok(())
    }
}

pub(crate) fn parse_window_start(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw)
        .ok_or_else(|| format!("failed to parse '{raw}' as an RFC 3339 timestamp or YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use payout_engine::settlement::Money;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_window_start(raw).expect("valid timestamp")
    }

    #[test]
    fn parse_window_start_reports_bad_input() {
        assert!(parse_window_start("2025-03-01T10:00:00Z").is_ok());
        let err = parse_window_start("last tuesday").expect_err("rejected");
        assert!(err.contains("last tuesday"));
    }

    #[test]
    fn in_memory_feeds_apply_strict_window() {
        let feeds = InMemorySourceFeeds::default();
        let worker = WorkerId::new("modelo-ana");
        let boundary = at("2025-03-01T10:00:00Z");
        for completed_at in [boundary, at("2025-03-01T10:00:01Z")] {
            feeds.record_service(ServiceRecord {
                worker_id: worker.clone(),
                base_amount: Money::from(1_000),
                add_on_amount: Money::ZERO,
                in_service_consumption_amount: Money::ZERO,
                extended_time_amount: Money::ZERO,
                completed_at,
            });
        }

        let all = feeds
            .fetch_services_since(&worker, None)
            .expect("services");
        let after = feeds
            .fetch_services_since(&worker, Some(boundary))
            .expect("services");

        assert_eq!(all.len(), 2);
        assert_eq!(after.len(), 1);
        assert!(after[0].completed_at > boundary);
    }

    #[test]
    fn update_of_unknown_advance_is_not_found() {
        let repository = InMemoryAdvanceRepository::default();
        let advance = Advance {
            id: AdvanceId::generate(),
            worker_id: WorkerId::new("modelo-ana"),
            amount: Money::from(500),
            requested_at: at("2025-03-01"),
            status: payout_engine::settlement::AdvanceStatus::Pending,
            resolved_at: None,
            resolved_by: None,
            reason: None,
        };

        assert!(matches!(
            repository.update(advance),
            Err(RepositoryError::NotFound)
        ));
    }
}
