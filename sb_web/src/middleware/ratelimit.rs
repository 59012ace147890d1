//! ABOUTME: Fixed-window rate limiting keyed by client IP
//! ABOUTME: Guards login, registration and feedback endpoints against abuse

use crate::models::ProblemDetails;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use dashmap::DashMap;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per IP per window
    pub requests_per_window: u32,
    pub window_duration: Duration,
    /// Peers whose X-Forwarded-For / X-Real-IP headers are believed
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 30,
            window_duration: Duration::from_secs(60),
            trusted_proxies: vec!["127.0.0.1".to_string(), "::1".to_string()],
        }
    }
}

impl From<&sb_config::RateLimitConfig> for RateLimitConfig {
    fn from(config: &sb_config::RateLimitConfig) -> Self {
        Self {
            requests_per_window: config.requests_per_minute,
            window_duration: Duration::from_secs(config.window_seconds.max(1)),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

/// Counters shared by every worker; clone to share
#[derive(Debug, Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitEntry>>,
    max_requests: u32,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window_duration,
        }
    }

    /// (allowed, remaining, time until reset)
    pub fn check(&self, key: &str) -> (bool, u32, Duration) {
        let now = Instant::now();

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= self.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            (true, self.max_requests - entry.count, Duration::ZERO)
        } else {
            let reset = self
                .window_duration
                .saturating_sub(now.duration_since(entry.window_start));
            (false, 0, reset)
        }
    }

    /// Drop clients whose window has run out; returns how many were removed
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window_duration);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Pruned rate limit entries");
        }
        removed
    }

    /// Number of clients currently tracked
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

/// Rate limiting middleware transform
#[derive(Debug, Clone)]
pub struct RateLimit {
    config: RateLimitConfig,
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(config: RateLimitConfig) -> Self {
        let limiter = RateLimiter::new(config.requests_per_window, config.window_duration);
        Self { config, limiter }
    }

    /// Build around an existing limiter so several scopes share one budget
    pub fn shared(config: RateLimitConfig, limiter: RateLimiter) -> Self {
        Self { config, limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            trusted_proxies: Rc::new(self.config.trusted_proxies.clone()),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    trusted_proxies: Rc<Vec<String>>,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let trusted_proxies = Rc::clone(&self.trusted_proxies);

        Box::pin(async move {
            let client_ip = get_client_ip(&req, &trusted_proxies);
            let (allowed, remaining, reset_time) = limiter.check(&client_ip);

            if allowed {
                debug!(ip = %client_ip, remaining, "Rate limit passed");
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let retry_after = reset_time.as_secs().max(1);
            warn!(ip = %client_ip, retry_after, "Rate limit exceeded");

            let problem = ProblemDetails::rate_limit_error(Some(retry_after));
            let mut response = HttpResponse::TooManyRequests()
                .content_type("application/problem+json")
                .json(problem);

            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("retry-after"), value);
            }
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from_static("0"),
            );

            let (req, _) = req.into_parts();
            Ok(ServiceResponse::new(req, response).map_into_right_body())
        })
    }
}

/// Client IP, trusting forwarding headers only from configured proxies
fn get_client_ip(req: &ServiceRequest, trusted_proxies: &[String]) -> String {
    let peer_ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !trusted_proxies.iter().any(|trusted| trusted == &peer_ip) {
        return peer_ip;
    }

    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let Some(first) = header("x-forwarded-for")
        .as_deref()
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    header("x-real-ip")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(peer_ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, web, App, HttpResponse};

    #[test]
    fn test_limiter_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert_eq!(limiter.check("1.2.3.4").0, true);
        assert_eq!(limiter.check("1.2.3.4").0, true);
        let (allowed, remaining, reset) = limiter.check("1.2.3.4");
        assert!(!allowed);
        assert_eq!(remaining, 0);
        assert!(reset <= Duration::from_secs(60));

        assert!(limiter.check("5.6.7.8").0, "keys are independent");
    }

    #[test]
    fn test_expired_window_resets() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        assert!(limiter.check("ip").0);
        assert!(limiter.check("ip").0);
    }

    #[test]
    fn test_prune_forgets_finished_windows() {
        let limiter = RateLimiter::new(5, Duration::ZERO);
        limiter.check("10.0.0.1");
        limiter.check("10.0.0.2");
        assert_eq!(limiter.tracked(), 2);
        assert_eq!(limiter.prune(), 2);
        assert_eq!(limiter.tracked(), 0);

        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.check("10.0.0.1");
        assert_eq!(limiter.prune(), 0);
        assert_eq!(limiter.tracked(), 1);
    }

    #[actix_web::test]
    async fn test_middleware_answers_429_with_headers() {
        let config = RateLimitConfig {
            requests_per_window: 1,
            ..RateLimitConfig::default()
        };
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimit::new(config))
                .route("/", web::post().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let first = actix_test::call_service(&app, actix_test::TestRequest::post().uri("/").to_request()).await;
        assert_eq!(first.status(), 200);

        let second =
            actix_test::call_service(&app, actix_test::TestRequest::post().uri("/").to_request()).await;
        assert_eq!(second.status(), 429);
        assert!(second.headers().contains_key("retry-after"));
        assert_eq!(
            second.headers().get("x-ratelimit-remaining").and_then(|v| v.to_str().ok()),
            Some("0")
        );
    }
}
