//! ABOUTME: Probe and metrics endpoints served on the separate observability port
//! ABOUTME: Also owns the Prometheus registry and the per-request metrics middleware

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    middleware::Logger,
    web, App, Error, HttpResponse, HttpServer,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use sb_core::{Error as CoreError, MonotonicTimer, Result as CoreResult};
use sb_db::{CacheMetrics, Db};
use serde_json::json;
use std::{
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tracing::{debug, error, info, warn};

const LATENCY_BUCKETS: [f64; 6] = [0.005, 0.025, 0.1, 0.5, 1.0, 2.5];

/// Closed until the binary has finished building its state
#[derive(Debug, Clone, Default)]
pub struct ReadinessGate(Arc<AtomicBool>);

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    /// `2xx`, `4xx`, ...
    pub status: String,
}

/// Shared Prometheus registry with the HTTP series the web app reports
#[derive(Debug)]
pub struct Metrics {
    registry: Mutex<Registry>,
    requests: Counter,
    responses: Family<ResponseLabels, Counter>,
    latency: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let requests = Counter::default();
        let responses = Family::<ResponseLabels, Counter>::default();
        let latency = Histogram::new(LATENCY_BUCKETS.into_iter());

        let mut registry = Registry::default();
        registry.register("http_requests", "Requests served", requests.clone());
        registry.register(
            "http_responses",
            "Responses by status class",
            responses.clone(),
        );
        registry.register(
            "http_request_duration_seconds",
            "Time spent producing a response",
            latency.clone(),
        );

        Self {
            registry: Mutex::new(registry),
            requests,
            responses,
            latency,
        }
    }

    fn registry(&self) -> CoreResult<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|e| CoreError::Config(format!("Metrics registry poisoned: {}", e)))
    }

    /// Put the file cache counters on this registry
    pub fn register_cache(&self, cache: &CacheMetrics) -> CoreResult<()> {
        cache.register(&mut *self.registry()?);
        Ok(())
    }

    pub fn record_response(&self, status: u16, duration_secs: f64) {
        let class = format!("{}xx", status / 100);
        self.requests.inc();
        self.responses
            .get_or_create(&ResponseLabels { status: class })
            .inc();
        self.latency.observe(duration_secs);
    }

    /// OpenMetrics text for `/metrics`
    pub fn encode(&self) -> CoreResult<String> {
        let registry = self.registry()?;
        let mut out = String::new();
        encode(&mut out, &registry)
            .map_err(|e| CoreError::Config(format!("Failed to encode metrics: {}", e)))?;
        Ok(out)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObsState {
    pub readiness: ReadinessGate,
    pub metrics: Arc<Metrics>,
    /// Pinged by /readyz when present
    pub db: Option<Db>,
}

impl ObsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_db(mut self, db: Db) -> Self {
        self.db = Some(db);
        self
    }
}

async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn readyz(state: web::Data<ObsState>) -> HttpResponse {
    let started = state.readiness.is_ready();
    let database = match &state.db {
        Some(db) => match db.health_check().await {
            Ok(()) => "ok",
            Err(e) => {
                warn!("Database failed readiness ping: {}", e);
                "failing"
            }
        },
        None => "skipped",
    };

    let ready = started && database != "failing";
    debug!(ready, database, "Readiness probe");

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    HttpResponse::build(status).json(json!({
        "status": if ready { "ready" } else { "not ready" },
        "checks": { "startup": started, "database": database },
    }))
}

async fn metrics(state: web::Data<ObsState>) -> HttpResponse {
    match state.metrics.encode() {
        Ok(text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(text),
        Err(e) => {
            error!("Metrics unavailable: {}", e);
            HttpResponse::InternalServerError().body("metrics unavailable")
        }
    }
}

/// The probe app: `/healthz`, `/readyz` and `/metrics`
pub fn create_service(
    state: ObsState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(Logger::new("%r %s %Dms"))
        .route("/healthz", web::get().to(healthz))
        .route("/readyz", web::get().to(readyz))
        .route("/metrics", web::get().to(metrics))
}

pub async fn start_server(bind_addr: &str, state: ObsState) -> CoreResult<()> {
    info!(addr = %bind_addr, "Observability server listening");

    HttpServer::new(move || create_service(state.clone()))
        .workers(1)
        .bind(bind_addr)
        .map_err(|e| CoreError::Config(format!("Cannot bind obs server to {}: {}", bind_addr, e)))?
        .run()
        .await
        .map_err(|e| CoreError::Config(format!("Obs server stopped: {}", e)))
}

/// Records count, status class and latency of every request it wraps
pub struct RequestMetrics {
    metrics: Arc<Metrics>,
}

impl RequestMetrics {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestMetricsMiddleware {
            service: Rc::new(service),
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct RequestMetricsMiddleware<S> {
    service: Rc<S>,
    metrics: Arc<Metrics>,
}

impl<S, B> Service<ServiceRequest> for RequestMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let metrics = self.metrics.clone();

        Box::pin(async move {
            let timer = MonotonicTimer::new();
            let result = service.call(req).await;
            let status = match &result {
                Ok(res) => res.status().as_u16(),
                Err(e) => e.as_response_error().status_code().as_u16(),
            };
            metrics.record_response(status, timer.elapsed().as_secs_f64());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use serde_json::Value;

    async fn get(state: ObsState, uri: &str) -> (StatusCode, actix_web::web::Bytes) {
        let app = test::init_service(create_service(state)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        let status = resp.status();
        (status, test::read_body(resp).await)
    }

    #[actix_web::test]
    async fn test_healthz_always_answers() {
        let (status, body) = get(ObsState::new(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn test_readyz_waits_for_startup() {
        let state = ObsState::new();

        let (status, body) = get(state.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["checks"]["startup"], false);
        assert_eq!(body["checks"]["database"], "skipped");

        state.readiness.set_ready(true);
        let (status, _) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_readyz_pings_database() {
        let path = std::env::temp_dir().join(test_support::unique_db_name("obs"));
        let db = Db::new(&path.to_string_lossy()).await.expect("db");
        let state = ObsState::new().with_db(db);
        state.readiness.set_ready(true);

        let (status, body) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["checks"]["database"], "ok");
    }

    #[actix_web::test]
    async fn test_metrics_expose_cache_and_status_classes() {
        let state = ObsState::new();
        let cache = CacheMetrics::new();
        state.metrics.register_cache(&cache).expect("register");
        cache.record_hit();
        state.metrics.record_response(200, 0.01);
        state.metrics.record_response(404, 0.02);

        let (status, body) = get(state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("http_requests_total 2"));
        assert!(text.contains("http_responses_total{status=\"4xx\"} 1"));
        assert!(text.contains("cache_hits_total 1"));
    }

    #[actix_web::test]
    async fn test_middleware_counts_wrapped_requests() {
        let metrics = Arc::new(Metrics::new());
        let app = test::init_service(
            App::new()
                .wrap(RequestMetrics::new(metrics.clone()))
                .route("/", web::get().to(|| async { HttpResponse::NoContent().finish() })),
        )
        .await;

        test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        let text = metrics.encode().expect("encode");
        assert!(text.contains("http_responses_total{status=\"2xx\"} 1"));
    }
}
