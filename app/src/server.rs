//! ABOUTME: Builds shared state and runs the web and obs servers side by side
//! ABOUTME: Also owns the background sweeper for cache files, reset tokens and rate limit entries

use sb_config::Config;
use sb_core::Result;
use sb_db::{CacheMetrics, Db, FileCache, PasswordResetRepository};
use sb_obs::{Metrics, ObsState};
use sb_web::{middleware::ratelimit::RateLimiter, AppState};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

/// Everything both servers need, built once from config
pub struct Services {
    pub db: Db,
    pub web: AppState,
    pub obs: ObsState,
    pub cache: FileCache,
}

impl Services {
    pub async fn build(config: Config) -> Result<Self> {
        let db = Db::connect(&config.database.path, config.database.pool_size).await?;
        db.health_check().await?;

        let cache_metrics = CacheMetrics::new();
        let cache = FileCache::new(
            &config.cache.dir,
            Duration::from_secs(config.cache.default_ttl_secs),
            config.cache.memory_capacity,
        )?
        .with_metrics(cache_metrics.clone())
        .with_enabled(config.cache.enabled);

        let metrics = Arc::new(Metrics::new());
        metrics.register_cache(&cache_metrics)?;

        let mut obs = ObsState::new().with_db(db.clone());
        obs.metrics = metrics.clone();

        let web = AppState::new(db.clone(), config, cache.clone(), metrics)?;
        Ok(Self { db, web, obs, cache })
    }
}

/// One sweep: expired cache files, spent or stale reset tokens, idle rate limit clients
pub async fn sweep_once(cache: &FileCache, db: &Db, limiter: &RateLimiter) {
    let removed = cache.cleanup_expired().await;
    let pruned = limiter.prune();
    match PasswordResetRepository::new(db.pool()).purge_stale().await {
        Ok(purged) => debug!(removed, purged, pruned, "Sweep finished"),
        Err(e) => warn!("Failed to purge reset tokens: {}", e),
    }
}

/// Run `sweep_once` forever on a fixed interval
pub fn spawn_sweeper(
    cache: FileCache,
    db: Db,
    limiter: RateLimiter,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        // the first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&cache, &db, &limiter).await;
        }
    })
}

/// Serve until either server stops
pub async fn serve(config: Config) -> Result<()> {
    let web_addr = format!("{}:{}", config.server.host, config.server.port);
    let obs_addr = format!("{}:{}", config.server.host, config.server.obs_port);
    let sweep_every = Duration::from_secs(config.cache.sweep_interval_secs);

    info!(
        web = %web_addr,
        obs = %obs_addr,
        db_path = %config.database.path,
        cache_dir = %config.cache.dir,
        "Starting stanbase"
    );

    let services = Services::build(config).await?;
    let sweeper = spawn_sweeper(
        services.cache.clone(),
        services.db.clone(),
        services.web.rate_limiter.clone(),
        sweep_every,
    );
    services.obs.readiness.set_ready(true);

    let result = tokio::select! {
        r = sb_obs::start_server(&obs_addr, services.obs.clone()) => {
            error!("Observability server exited");
            r
        }
        r = sb_web::start_server(&web_addr, services.web.clone()) => {
            error!("Web server exited");
            r
        }
    };

    sweeper.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweep_prunes_idle_rate_limit_clients() {
        let dir = TempDir::new().expect("temp dir");
        let db = Db::new(&dir.path().join("sweep.db").to_string_lossy())
            .await
            .expect("db");
        let cache = FileCache::new(dir.path().join("cache"), Duration::from_secs(60), 8)
            .expect("cache");
        let limiter = RateLimiter::new(3, Duration::ZERO);
        limiter.check("203.0.113.7");

        sweep_once(&cache, &db, &limiter).await;
        assert_eq!(limiter.tracked(), 0);
    }
}
