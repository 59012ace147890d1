//! ABOUTME: Route modules for public pages, auth, dashboard, admin and the JSON API
//! ABOUTME: Shared helpers for redirects and form token checks live here

pub mod admin;
pub mod api;
pub mod auth;
pub mod dashboard;
pub mod public;

use crate::{csrf, error::PageError, middleware::auth::AuthUser, AppState};
use actix_web::{http::header, HttpResponse};
use tracing::warn;

/// 302 to `location`
pub(crate) fn redirect(location: impl AsRef<str>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.as_ref()))
        .finish()
}

/// Reject form posts whose token was not issued to this user recently
pub(crate) fn require_csrf(state: &AppState, user: &AuthUser, token: &str) -> Result<(), PageError> {
    if csrf::verify(token, &user.id, state.jwt_secret(), csrf::DEFAULT_MAX_AGE_SECS) {
        Ok(())
    } else {
        warn!(user_id = %user.id, "Rejected form post with a bad CSRF token");
        Err(PageError::Forbidden)
    }
}

/// Owned copy of an optional query value, empty when absent
pub(crate) fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}
