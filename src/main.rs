use std::sync::Arc;
use std::time::Instant;

use actix_web::web;
use anyhow::{Context, Result};
use ecovolt_api::api::handlers::AppState;
use ecovolt_api::api::ApiServer;
use ecovolt_api::catalog::cache::CacheStore;
use ecovolt_api::catalog::fetcher::CatalogFetcher;
use ecovolt_api::catalog::query::QueryService;
use ecovolt_api::catalog::scheduler::RefreshScheduler;
use ecovolt_api::catalog::upstream::{ProductSource, UpstreamClient};
use ecovolt_api::config::AppConfig;
use ecovolt_api::util::env as env_util;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // --- logging -------------------------------------------------------------
    env_util::init_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .init();

    // --- configuration -------------------------------------------------------
    let config = AppConfig::from_env().context("invalid configuration")?;
    info!(
        upstream = %config.upstream.base_url,
        ttl_secs = config.cache_ttl.as_secs(),
        refresh_secs = config.scheduler.period.as_secs(),
        categories = config.categories.len(),
        "configuration loaded"
    );

    // --- core wiring ---------------------------------------------------------
    let client = Arc::new(
        UpstreamClient::new(&config.upstream).context("upstream client init failed")?,
    );
    let source: Arc<dyn ProductSource> = client;
    let cache = Arc::new(CacheStore::new(config.cache_ttl, config.categories.clone()));
    let fetcher = CatalogFetcher::new(source.clone(), config.fetch.clone());
    let scheduler = Arc::new(RefreshScheduler::new(
        cache.clone(),
        fetcher,
        source.clone(),
        config.scheduler.clone(),
    ));
    let query = QueryService::new(cache.clone(), source.clone(), config.query.clone());

    // --- background refresh task --------------------------------------------
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let refresh_task = tokio::spawn(scheduler.clone().run(shutdown_tx.subscribe()));

    // --- HTTP API ------------------------------------------------------------
    let state = web::Data::new(AppState {
        cache,
        scheduler,
        query,
        source,
        cache_ttl_minutes: config.cache_ttl.as_secs() / 60,
        refresh_period_minutes: config.scheduler.period.as_secs() / 60,
        started_at: Instant::now(),
    });
    let server = ApiServer::new(&config.http);

    // actix installs its own signal handling; when the server returns we are
    // shutting down and only need to reap the refresh loop.
    let result = server.run(state).await;

    let _ = shutdown_tx.send(());
    if let Err(e) = refresh_task.await {
        error!(error = %e, "refresh task join error");
    }

    info!("all tasks stopped, goodbye");
    result
}
