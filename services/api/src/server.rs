use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAdvanceRepository, InMemoryPayoutLedger, LoggingNotifier};
use crate::routes::with_settlement_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use payout_engine::config::AppConfig;
use payout_engine::error::AppError;
use payout_engine::settlement::{SettlementService, SnapshotFeeds};
use payout_engine::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let feeds = match args.data_dir.take() {
        Some(dir) => {
            let feeds = SnapshotFeeds::from_dir(&dir)?;
            info!(data_dir = %dir.display(), workers = feeds.workers().len(), "loaded source snapshots");
            feeds
        }
        None => SnapshotFeeds::default(),
    };

    let settlement_service = Arc::new(SettlementService::new(
        Arc::new(feeds),
        Arc::new(InMemoryAdvanceRepository::default()),
        Arc::new(InMemoryPayoutLedger::default()),
        Arc::new(LoggingNotifier),
        config.settlement.clone(),
    ));

    let app = with_settlement_routes(settlement_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, max_advance = %config.settlement.max_advance, "payout engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
