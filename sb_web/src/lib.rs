//! ABOUTME: Web layer with server-rendered pages, dashboard, admin and JSON API
//! ABOUTME: Wires application state, middleware and route scopes into one actix App

use actix_files::Files;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sb_config::Config;
use sb_core::Result;
use sb_db::{CacheInvalidator, CachedQueries, Db, FileCache};
use sb_notify::{Mailer, Notifier, RetryWrapper, TelegramNotifier};
use sb_obs::{Metrics, RequestMetrics};
use std::sync::Arc;

pub mod auth;
pub mod csrf;
pub mod error;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod views;

use middleware::ratelimit::{RateLimit, RateLimitConfig, RateLimiter};

/// Largest accepted urlencoded form body
const FORM_LIMIT_BYTES: usize = 256 * 1024;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub queries: CachedQueries,
    pub invalidator: CacheInvalidator,
    /// Feedback forwarding channel
    pub telegram: Arc<dyn Notifier>,
    pub mailer: Mailer,
    pub metrics: Arc<Metrics>,
    /// Shared across workers so the budget is per process, not per thread
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(db: Db, config: Config, cache: FileCache, metrics: Arc<Metrics>) -> Result<Self> {
        let mailer = Mailer::from_config(&config.mail)?;
        let telegram: Arc<dyn Notifier> =
            Arc::new(RetryWrapper::new(TelegramNotifier::new(config.telegram.clone())));
        let limits = RateLimitConfig::from(&config.server.rate_limit);

        Ok(Self {
            queries: CachedQueries::new(db.pool().clone(), cache.clone()),
            invalidator: CacheInvalidator::new(cache),
            db,
            config: Arc::new(config),
            telegram,
            mailer,
            metrics,
            rate_limiter: RateLimiter::new(limits.requests_per_window, limits.window_duration),
        })
    }

    /// Limiter layer for abuse-prone endpoints
    pub fn rate_limit(&self) -> RateLimit {
        RateLimit::shared(
            RateLimitConfig::from(&self.config.server.rate_limit),
            self.rate_limiter.clone(),
        )
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.security.jwt_secret
    }
}

/// Create the main web application service factory
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let limit = state.rate_limit();
    let static_dir = state.config.server.static_dir.clone();
    let metrics = state.metrics.clone();

    App::new()
        .app_data(web::Data::new(state))
        .app_data(web::FormConfig::default().limit(FORM_LIMIT_BYTES))
        // innermost first: sessions load after headers, metrics and access logs
        .wrap(middleware::auth::LoadUser)
        .wrap(middleware::security_headers())
        .wrap(RequestMetrics::new(metrics))
        .wrap(Logger::default())
        .service(Files::new("/static", static_dir))
        .service(web::scope("/api/v1").configure(|cfg| routes::api::configure(cfg, &limit)))
        .service(web::scope("/admin").configure(routes::admin::configure))
        .service(web::scope("/dashboard").configure(routes::dashboard::configure))
        .configure(routes::dashboard::configure_notifications)
        .configure(|cfg| routes::auth::configure(cfg, &limit))
        .configure(routes::public::configure)
        .default_service(web::route().to(routes::public::not_found))
}

/// Start the web server
pub async fn start_server(bind_addr: &str, state: AppState) -> Result<()> {
    tracing::info!("Starting web server on {}", bind_addr);

    HttpServer::new(move || create_app(state.clone()))
        .bind(bind_addr)
        .map_err(|e| sb_core::Error::Config(format!("Failed to bind web server: {}", e)))?
        .run()
        .await
        .map_err(|e| sb_core::Error::Config(format!("Web server error: {}", e)))?;

    Ok(())
}


#[cfg(test)]
mod tests;
