use crate::infra::{
    InMemoryAdvanceRepository, InMemoryPayoutLedger, InMemorySourceFeeds, LoggingNotifier,
};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use payout_engine::config::AppConfig;
use payout_engine::error::AppError;
use payout_engine::settlement::{
    Clock, Fine, FineStatus, Money, PaymentMethod, PayoutConfirmation, PayoutLedgerEntry,
    Purchase, ServiceRecord, SettlementBatch, SettlementBreakdown, SettlementPolicy,
    SettlementService, SnapshotFeeds, SourceFeeds, WorkerId,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Args, Debug)]
pub(crate) struct SettleArgs {
    /// Directory holding services.csv, purchases.csv and fines.csv
    #[arg(long)]
    pub(crate) data_dir: PathBuf,
    /// Worker to settle (repeatable). Defaults to every worker found in the snapshots.
    #[arg(long = "worker")]
    pub(crate) workers: Vec<String>,
    /// Only count records strictly after this instant (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_window_start)]
    pub(crate) window_start: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Admin recorded as approver and payout performer
    #[arg(long, default_value = "admin")]
    pub(crate) admin: String,
    /// Start of the simulated week (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_window_start)]
    pub(crate) start: Option<DateTime<Utc>>,
}

pub(crate) fn run_settle(args: SettleArgs) -> Result<(), AppError> {
    let SettleArgs {
        data_dir,
        workers,
        window_start,
    } = args;

    let config = AppConfig::load()?;
    let feeds = Arc::new(SnapshotFeeds::from_dir(&data_dir)?);
    let workers = if workers.is_empty() {
        feeds.workers()
    } else {
        workers.into_iter().map(WorkerId::new).collect()
    };

    println!("Settlement preview from {}", data_dir.display());
    match window_start {
        Some(start) => println!("Window: records after {}", start.to_rfc3339()),
        None => println!("Window: all records"),
    }

    let batch = settle_snapshot(feeds, &workers, window_start, &config.settlement);
    render_batch(&batch);
    Ok(())
}

/// Settles each worker straight from the snapshot feeds. Snapshots carry no advances or
/// payouts, so the caller's window start is used as is.
pub(crate) fn settle_snapshot<F: SourceFeeds + 'static>(
    feeds: Arc<F>,
    workers: &[WorkerId],
    window_start: Option<DateTime<Utc>>,
    policy: &SettlementPolicy,
) -> SettlementBatch {
    let service = SettlementService::new(
        feeds,
        Arc::new(InMemoryAdvanceRepository::default()),
        Arc::new(InMemoryPayoutLedger::default()),
        Arc::new(LoggingNotifier),
        policy.clone(),
    );
    let mut batch = SettlementBatch::default();

    for worker_id in workers {
        batch.record(worker_id, service.compute_for_window(worker_id, window_start));
    }
    batch
}

/// Clock the demo moves by hand between the week's steps.
struct DemoClock {
    now: Mutex<DateTime<Utc>>,
}

impl DemoClock {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }
}

impl Clock for DemoClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { admin, start } = args;
    let start = start.unwrap_or_else(Utc::now);

    let clock = Arc::new(DemoClock::new(start));
    let feeds = InMemorySourceFeeds::default();
    let ledger = Arc::new(InMemoryPayoutLedger::default());
    let service = SettlementService::with_clock(
        Arc::new(feeds.clone()),
        Arc::new(InMemoryAdvanceRepository::default()),
        ledger.clone(),
        Arc::new(LoggingNotifier),
        SettlementPolicy::default(),
        clock.clone(),
    );

    let ana = WorkerId::new("modelo-ana");
    let bea = WorkerId::new("modelo-bea");
    let caro = WorkerId::new("modelo-caro");
    let dani = WorkerId::new("modelo-dani");
    let workers = vec![ana.clone(), bea.clone(), caro.clone(), dani.clone()];

    let during_week = start + Duration::hours(2);
    for worker_id in &workers {
        feeds.record_service(service_record(worker_id, 100_000, during_week));
    }
    feeds.record_purchase(purchase(&bea, 20_000, false, during_week));
    feeds.record_purchase(purchase(&caro, 20_000, false, during_week));
    feeds.record_fine(fine(&caro, 40_000, during_week));

    println!("Payout engine demo");
    println!("Week starting {}", start.to_rfc3339());

    println!("\nCash advances");
    let advance =
        service.submit_advance(dani.clone(), Money::from(30_000), Some("rent".to_string()))?;
    println!(
        "- {} requested {} ({})",
        advance.worker_id, advance.amount, advance.id
    );
    let approved = service.approve_advance(&advance.id, &admin)?;
    println!("- {} by {}", approved.status, admin);
    match service.approve_advance(&advance.id, &admin) {
        Ok(_) => println!("- second approval unexpectedly accepted"),
        Err(err) => println!("- second approval refused: {err}"),
    }
    match service.submit_advance(dani.clone(), Money::from(80_000), None) {
        Ok(_) => println!("- oversized advance unexpectedly accepted"),
        Err(err) => println!("- oversized request refused: {err}"),
    }

    println!("\nSettlement preview");
    let batch = service.settle_all(&workers);
    render_batch(&batch);
    let stale_preview = service.compute_settlement(&ana)?;

    clock.set(start + Duration::days(6));
    println!("\nPayouts");
    let confirmation = PayoutConfirmation {
        performed_by: admin.clone(),
        method: PaymentMethod::Cash,
        notes: Some("weekly close".to_string()),
    };
    for worker_id in &workers {
        let entry = service.confirm_payout(worker_id, confirmation.clone())?;
        println!(
            "- {} paid {} via {}",
            entry.worker_id,
            entry.amount,
            entry.method.label()
        );
    }

    let paid_at = clock.now();
    feeds.record_service(service_record(&ana, 10_000, paid_at));
    feeds.record_service(service_record(
        &ana,
        20_000,
        paid_at + Duration::milliseconds(1),
    ));

    println!("\nNext window for {}", ana);
    let next = service.compute_settlement(&ana)?;
    println!(
        "- {} service(s) after {} (the one at the payout instant belongs to the closed week)",
        next.services.count,
        paid_at.to_rfc3339()
    );
    render_breakdown(&next);

    clock.set(paid_at + Duration::hours(1));
    match service.register_payout(&ana, stale_preview, confirmation) {
        Ok(_) => println!("- stale breakdown unexpectedly paid"),
        Err(err) => println!("- paying the old preview again is refused: {err}"),
    }

    println!("\nPayout ledger");
    render_ledger(&ledger.all());
    Ok(())
}

fn service_record(worker_id: &WorkerId, base: i64, at: DateTime<Utc>) -> ServiceRecord {
    ServiceRecord {
        worker_id: worker_id.clone(),
        base_amount: Money::from(base),
        add_on_amount: Money::ZERO,
        in_service_consumption_amount: Money::ZERO,
        extended_time_amount: Money::ZERO,
        completed_at: at,
    }
}

fn purchase(worker_id: &WorkerId, amount: i64, during_service: bool, at: DateTime<Utc>) -> Purchase {
    Purchase {
        worker_id: worker_id.clone(),
        total_amount: Money::from(amount),
        during_service,
        occurred_at: at,
    }
}

fn fine(worker_id: &WorkerId, amount: i64, at: DateTime<Utc>) -> Fine {
    Fine {
        worker_id: worker_id.clone(),
        amount: Money::from(amount),
        status: FineStatus::Active,
        created_at: at,
    }
}

fn render_batch(batch: &SettlementBatch) {
    for breakdown in &batch.settlements {
        render_breakdown(breakdown);
    }
    if !batch.failures.is_empty() {
        println!("Excluded workers:");
        for failure in &batch.failures {
            println!(
                "  - {} [{}]: {}",
                failure.worker_id, failure.kind, failure.message
            );
        }
    }
    println!(
        "Total payable across {} worker(s): {}",
        batch.settlements.len(),
        batch.total_payable
    );
}

fn render_breakdown(breakdown: &SettlementBreakdown) {
    println!("{}", breakdown.worker_id);
    println!(
        "  services    {:>3} | revenue {} x {} = {}",
        breakdown.services.count,
        breakdown.services.revenue,
        breakdown.services.rate,
        breakdown.services.share
    );
    println!(
        "  add-ons     {:>3} | revenue {} x {} = {}",
        breakdown.add_ons.count,
        breakdown.add_ons.revenue,
        breakdown.add_ons.rate,
        breakdown.add_ons.share
    );
    println!(
        "  consumption {:>3} | revenue {} x {} = {}",
        breakdown.consumption.count,
        breakdown.consumption.revenue,
        breakdown.consumption.rate,
        breakdown.consumption.share
    );
    println!(
        "  deductions: purchases {} | fines {} | advances {}",
        breakdown.out_of_service_purchases.amount,
        breakdown.active_fines.amount,
        breakdown.advances.amount
    );
    println!(
        "  subtotal {} - deductions {} => payable {}",
        breakdown.subtotal, breakdown.deductions, breakdown.total_payable
    );
}

fn render_ledger(entries: &[PayoutLedgerEntry]) {
    if entries.is_empty() {
        println!("(no payouts recorded)");
        return;
    }
    for entry in entries {
        println!(
            "- {} | {} | {} | {} by {}",
            entry.paid_at.to_rfc3339(),
            entry.worker_id,
            entry.amount,
            entry.method.label(),
            entry.performed_by
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::parse_window_start;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_window_start(raw).expect("valid timestamp")
    }

    #[test]
    fn snapshot_settlement_honours_window_start() {
        let ana = WorkerId::new("modelo-ana");
        let feeds = Arc::new(SnapshotFeeds::new(
            vec![
                service_record(&ana, 100_000, at("2025-03-01T10:00:00Z")),
                service_record(&ana, 40_000, at("2025-03-05T10:00:00Z")),
            ],
            vec![purchase(&ana, 20_000, false, at("2025-03-05T11:00:00Z"))],
            Vec::new(),
        ));

        let all = settle_snapshot(
            feeds.clone(),
            &feeds.workers(),
            None,
            &SettlementPolicy::default(),
        );
        assert_eq!(all.total_payable, Money::from(50_000));

        let windowed = settle_snapshot(
            feeds,
            &[ana],
            Some(at("2025-03-01T10:00:00Z")),
            &SettlementPolicy::default(),
        );
        assert_eq!(windowed.settlements.len(), 1);
        assert_eq!(windowed.total_payable, Money::ZERO);
        assert_eq!(windowed.settlements[0].subtotal, Money::from(20_000));
    }

    #[test]
    fn snapshot_settlement_reports_inconsistent_workers() {
        let ana = WorkerId::new("modelo-ana");
        let feeds = Arc::new(SnapshotFeeds::new(
            vec![service_record(&ana, -5, at("2025-03-01"))],
            Vec::new(),
            Vec::new(),
        ));

        let batch = settle_snapshot(feeds, &[ana], None, &SettlementPolicy::default());
        assert!(batch.settlements.is_empty());
        assert_eq!(batch.failures[0].kind, "inconsistent_state");
    }

    #[test]
    fn demo_runs_end_to_end() {
        run_demo(DemoArgs {
            admin: "admin".to_string(),
            start: None,
        })
        .expect("demo completes");
    }
}
