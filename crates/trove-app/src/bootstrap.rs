//! Boot sequence: configuration, logging, record store, fleet, loops, and the
//! HTTP listener, then an orderly shutdown on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use trove_api::{ApiServer, ApiState};
use trove_config::{AppConfig, FleetIntervals};
use trove_data::{FleetStore, PgFleetStore};
use trove_fleet::{BackendRegistry, FleetManager, FleetSettings, FleetState, TrackerIngest};
use trove_store::ContentStore;
use trove_telemetry::{GlobalContextGuard, LoggingConfig, Metrics, build_sha};
use trove_tracker::{ClientSettings, JsonFileSessionCache, MetadataClient};

use crate::error::{AppError, AppResult};

const MAX_DB_CONNECTIONS: u32 = 10;
const TRACKER_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const TRACKER_TIMEOUT: Duration = Duration::from_secs(30);
const LOOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Entry point for the service boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, the record store, the fleet,
/// or the HTTP listener cannot be brought up.
pub async fn run_app() -> AppResult<()> {
    let config = AppConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
    trove_telemetry::init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: config.logging.format,
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");
    info!(bind_addr = %config.bind_addr, "fleet service bootstrap starting");

    let pool = PgPoolOptions::new()
        .max_connections(MAX_DB_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .map_err(|err| AppError::database("pool.connect", err))?;
    let store: Arc<dyn FleetStore> = Arc::new(
        PgFleetStore::new(pool)
            .await
            .map_err(|err| AppError::data("pg_fleet_store.new", err))?,
    );

    let state = FleetState::load(store.as_ref(), &backend_registry())
        .await
        .map_err(|err| AppError::fleet("fleet_state.load", err))?;
    info!(workers = state.len(), "fleet loaded");

    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let content = ContentStore::new(&config.store_dir);
    let manager = Arc::new(FleetManager::new(
        Arc::clone(&store),
        Arc::new(state),
        content.clone(),
        metrics.clone(),
        fleet_settings(&config.fleet),
    ));
    let ingest = build_ingest(&config, Arc::clone(&store), content, metrics.clone()).await?;
    let ingest = Arc::new(ingest);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loops = manager.spawn_loops(&shutdown_rx);
    info!(loops = loops.len(), "fleet loops started");

    let api = ApiServer::new(ApiState::new(Arc::clone(&manager), ingest, metrics));
    let serve_result = api.serve(config.bind_addr, shutdown_signal()).await;

    if shutdown_tx.send(true).is_err() {
        warn!("fleet loops stopped before shutdown was signalled");
    }
    join_loops(loops).await;
    info!("fleet service stopped");

    serve_result.map_err(|err| AppError::api_server("api.serve", err))
}

/// Registry with every worker backend this build supports.
#[must_use]
pub fn backend_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(trove_transmission::BACKEND_TAG, trove_transmission::connect);
    registry
}

/// Map configured loop periods onto the fleet manager's settings.
#[must_use]
pub const fn fleet_settings(intervals: &FleetIntervals) -> FleetSettings {
    FleetSettings {
        update_interval: intervals.update_interval,
        full_update_interval: intervals.full_update_interval,
        queue_pop_interval: intervals.queue_pop_interval,
        update_pool_size: intervals.update_pool_size,
        interactive_pool_size: intervals.interactive_pool_size,
    }
}

/// Tracker ingest with the configured tracker registered, if any.
///
/// # Errors
///
/// Returns an error when the tracker client cannot be built.
pub async fn build_ingest(
    config: &AppConfig,
    store: Arc<dyn FleetStore>,
    content: ContentStore,
    metrics: Metrics,
) -> AppResult<TrackerIngest> {
    let ingest = TrackerIngest::new(store, content, metrics);
    let Some(tracker) = &config.tracker else {
        info!("no tracker configured; tracker ingest disabled");
        return Ok(ingest);
    };
    let settings = ClientSettings {
        base_url: tracker.base_url.clone(),
        username: tracker.username.clone(),
        password: tracker.password.clone(),
        rate_limit: tracker.rate_limit,
        rate_window: tracker.rate_window,
        retry_limit: tracker.retry_limit,
        retry_backoff: TRACKER_RETRY_BACKOFF,
        timeout: TRACKER_TIMEOUT,
    };
    let cache = Arc::new(JsonFileSessionCache::new(config.session_cache_path()));
    let client = MetadataClient::new(settings, cache)
        .await
        .map_err(|err| AppError::tracker("metadata_client.new", err))?;
    info!(tracker = %tracker.name, base_url = %tracker.base_url, "tracker registered");
    Ok(ingest.with_tracker(tracker.name.clone(), Arc::new(client)))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn join_loops(loops: Vec<JoinHandle<()>>) {
    for handle in loops {
        match tokio::time::timeout(LOOP_SHUTDOWN_GRACE, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "fleet loop join failed"),
            Err(_) => warn!("fleet loop did not stop within the grace period"),
        }
    }
}
