//! ABOUTME: Error handling for RFC 7807 Problem Details and HTML error pages
//! ABOUTME: Maps workspace errors to status codes without leaking internals

use crate::models::{ProblemDetails, ValidationError};
use crate::views::ErrorPage;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use askama::Template;
use std::fmt;
use tracing::error;
use validator::ValidationErrors;

/// API error wrapper for RFC 7807 Problem Details
#[derive(Debug)]
pub struct ApiError {
    pub problem: ProblemDetails,
    pub status_code: u16,
}

impl ApiError {
    pub fn new(problem: ProblemDetails) -> Self {
        let status_code = problem.status.unwrap_or(500);
        Self {
            problem,
            status_code,
        }
    }

    /// Create a validation error from validator::ValidationErrors
    pub fn validation(errors: ValidationErrors) -> Self {
        let validation_errors: Vec<ValidationError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                field_errors.iter().map(move |error| ValidationError {
                    field: field.to_string(),
                    code: error.code.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for field '{}'", field)),
                    value: error.params.get("value").cloned(),
                })
            })
            .collect();

        let problem = ProblemDetails::validation_error("Request validation failed").with_extension(
            "errors",
            serde_json::to_value(validation_errors).unwrap_or_default(),
        );

        Self::new(problem)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ProblemDetails::validation_error(detail.into()))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7235.html#section-3.1",
                "Unauthorized",
            )
            .with_status(401)
            .with_detail(detail.into()),
        )
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.3",
                "Forbidden",
            )
            .with_status(403)
            .with_detail(detail.into()),
        )
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.4",
                "Not Found",
            )
            .with_status(404)
            .with_detail(detail.into()),
        )
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.8",
                "Conflict",
            )
            .with_status(409)
            .with_detail(detail.into()),
        )
    }

    /// 500 with a fixed detail; the cause belongs in the logs
    pub fn internal_server_error() -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.6.1",
                "Internal Server Error",
            )
            .with_status(500)
            .with_detail("An internal error occurred"),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.problem.title,
            self.problem.detail.as_deref().unwrap_or("No details available")
        )
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/problem+json")
            .json(&self.problem)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

impl From<sb_core::Error> for ApiError {
    fn from(err: sb_core::Error) -> Self {
        use sb_core::Error;
        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::Validation(msg) => Self::bad_request(msg),
            Error::Unauthorized(msg) => Self::unauthorized(msg),
            Error::Conflict(msg) => Self::conflict(msg),
            other => {
                error!(error = %other, "Request failed");
                Self::internal_server_error()
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Error for HTML handlers, rendered as a themed page
#[derive(Debug)]
pub enum PageError {
    NotFound,
    /// Stale or forged form token
    Forbidden,
    Internal,
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::NotFound => f.write_str("Page not found"),
            PageError::Forbidden => f.write_str("Forbidden"),
            PageError::Internal => f.write_str("Internal server error"),
        }
    }
}

impl ResponseError for PageError {
    fn status_code(&self) -> StatusCode {
        match self {
            PageError::NotFound => StatusCode::NOT_FOUND,
            PageError::Forbidden => StatusCode::FORBIDDEN,
            PageError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let page = match self {
            PageError::NotFound => ErrorPage::not_found(),
            PageError::Forbidden => ErrorPage::forbidden(),
            PageError::Internal => ErrorPage::internal(),
        };
        match page.render() {
            Ok(html) => HttpResponse::build(self.status_code())
                .content_type("text/html; charset=utf-8")
                .body(html),
            Err(e) => {
                error!(error = %e, "Failed to render error page");
                HttpResponse::build(self.status_code()).body(self.to_string())
            }
        }
    }
}

impl From<sb_core::Error> for PageError {
    fn from(err: sb_core::Error) -> Self {
        match err {
            sb_core::Error::NotFound(_) => PageError::NotFound,
            other => {
                error!(error = %other, "Page request failed");
                PageError::Internal
            }
        }
    }
}

impl From<askama::Error> for PageError {
    fn from(err: askama::Error) -> Self {
        error!(error = %err, "Template rendering failed");
        PageError::Internal
    }
}

pub type PageResult = Result<HttpResponse, PageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let mut errors = ValidationErrors::new();
        errors.add("email", validator::ValidationError::new("email"));

        let api_error = ApiError::validation(errors);
        assert_eq!(api_error.status_code, 400);
        assert_eq!(api_error.problem.title, "Bad Request");
        assert!(api_error.problem.extensions.contains_key("errors"));
    }

    #[test]
    fn test_core_errors_map_to_statuses() {
        use sb_core::Error;
        let cases = [
            (Error::NotFound("x".into()), 404),
            (Error::Validation("x".into()), 400),
            (Error::Unauthorized("x".into()), 401),
            (Error::Conflict("x".into()), 409),
            (Error::Database("secret table details".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code, status);
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let api_error = ApiError::from(sb_core::Error::Database("no such table: users".into()));
        assert_eq!(
            api_error.problem.detail.as_deref(),
            Some("An internal error occurred")
        );
    }

    #[test]
    fn test_page_error_statuses() {
        assert_eq!(PageError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            PageError::from(sb_core::Error::Database("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
