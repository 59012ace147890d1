//! ABOUTME: Middleware modules for sessions, authorization, rate limiting and headers
//! ABOUTME: Provides JWT session loading, RBAC, IP rate limiting and security headers

pub mod auth;
pub mod ratelimit;
pub mod rbac;

use actix_web::middleware::DefaultHeaders;

/// Headers added to every response
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Frame-Options", "DENY"))
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}
