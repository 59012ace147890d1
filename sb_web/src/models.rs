//! ABOUTME: Request/response models for the JSON API, HTML forms and problem bodies
//! ABOUTME: Defines request structures with serde and validation rules

use regex::Regex;
use sb_db::User;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use validator::Validate;

/// RFC 7807 problem details body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    pub fn new(problem_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            problem_type: problem_type.into(),
            title: title.into(),
            status: None,
            detail: None,
            instance: None,
            extensions: Map::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// 400 with a human readable reason
    pub fn validation_error(detail: impl Into<String>) -> Self {
        Self::new(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.1",
            "Bad Request",
        )
        .with_status(400)
        .with_detail(detail)
    }

    /// 429 carrying the number of seconds until the window resets
    pub fn rate_limit_error(retry_after: Option<u64>) -> Self {
        let problem = Self::new(
            "https://datatracker.ietf.org/rfc/rfc6585.html#section-4",
            "Too Many Requests",
        )
        .with_status(429)
        .with_detail("Rate limit exceeded, try again later");

        match retry_after {
            Some(secs) => problem.with_extension("retry_after", Value::from(secs)),
            None => problem,
        }
    }
}

/// One failing field in a validation problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Request body for `POST /api/v1/auth/login`
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// Response for successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserInfo,
}

/// Public view of an account; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub company_id: Option<String>,
    pub investor_id: Option<String>,
    pub created_at: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.clone(),
            company_id: user.company_id.clone(),
            investor_id: user.investor_id.clone(),
            created_at: user.created_at.clone(),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

/// Feedback widget payload for `POST /api/v1/feedback`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeedbackPayload {
    #[serde(rename = "type", default)]
    pub feedback_type: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    pub suggestion: Option<String>,
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub page_url: Option<String>,
    pub page_title: Option<String>,
    pub user_agent: Option<String>,
    pub screen_size: Option<String>,
}

/// Body for creating or editing a comment
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CommentPayload {
    #[validate(length(min = 1))]
    pub content: String,
    pub parent_id: Option<String>,
}

/// Trimmed value, or None when blank
pub fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// International phone number: `+` and 10 to 15 digits
pub fn is_valid_phone(phone: &str) -> bool {
    static PHONE: OnceLock<Option<Regex>> = OnceLock::new();
    PHONE
        .get_or_init(|| Regex::new(r"^\+\d{10,15}$").ok())
        .as_ref()
        .map(|re| re.is_match(phone.trim()))
        .unwrap_or(false)
}

/// Parse an optional decimal form field; blank is None, garbage is a validation error
pub fn parse_amount(value: &Option<String>) -> sb_core::Result<Option<f64>> {
    match non_blank(value) {
        None => Ok(None),
        Some(raw) => raw
            .replace([',', ' '], "")
            .parse::<f64>()
            .map(Some)
            .map_err(|_| sb_core::Error::Validation(format!("Not a number: {}", raw))),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form; also re-rendered to keep what the visitor typed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub country_id: String,
    pub city: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordForm {
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordForm {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordChangeForm {
    pub csrf_token: String,
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub csrf_token: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country_id: Option<String>,
    pub city: Option<String>,
    pub telegram: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompanyForm {
    pub csrf_token: String,
    pub name: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub stage: Option<String>,
    pub industry: Option<String>,
    pub founded_date: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvestorForm {
    pub csrf_token: String,
    pub name: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub focus: Option<String>,
    pub stages: Option<String>,
    pub website: Option<String>,
    pub investor_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeamMemberForm {
    pub csrf_token: String,
    pub name: String,
    pub role: Option<String>,
    pub linkedin: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DealForm {
    pub csrf_token: String,
    pub deal_type: Option<String>,
    pub amount: Option<String>,
    pub valuation: Option<String>,
    pub date: Option<String>,
    pub currency_id: Option<String>,
    pub investors: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PitchForm {
    pub csrf_token: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PortfolioForm {
    pub csrf_token: String,
    pub company_id: String,
}

/// Body of forms that carry nothing but the CSRF token
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CsrfForm {
    pub csrf_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_problem_details_serializes_extensions_inline() {
        let problem = ProblemDetails::rate_limit_error(Some(42));
        let value = serde_json::to_value(&problem).expect("serialize");
        assert_eq!(value["status"], 429);
        assert_eq!(value["retry_after"], 42);
        assert_eq!(value["title"], "Too Many Requests");
        assert!(value.get("instance").is_none());
    }

    #[test]
    fn test_feedback_payload_uses_widget_field_names() {
        let payload: FeedbackPayload =
            serde_json::from_value(test_support::sample_feedback_payload()).expect("parse");
        assert_eq!(payload.feedback_type, "bug");
        assert!(payload.validate().is_ok());

        let bad: FeedbackPayload = serde_json::from_value(json!({
            "type": "bug",
            "description": "",
            "email": "not-an-email"
        }))
        .expect("parse");
        let errors = bad.validate().expect_err("invalid");
        assert!(errors.field_errors().contains_key("description"));
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn test_phone_rule() {
        assert!(is_valid_phone("+77011234567"));
        assert!(is_valid_phone(" +996555123456 "));
        assert!(!is_valid_phone("87011234567"));
        assert!(!is_valid_phone("+7701"));
        assert!(!is_valid_phone("+7701123456789012"));
        assert!(!is_valid_phone("+7 701 123 45 67"));
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!(parse_amount(&None).expect("blank"), None);
        assert_eq!(parse_amount(&Some("  ".into())).expect("blank"), None);
        assert_eq!(
            parse_amount(&Some("1,500,000".into())).expect("number"),
            Some(1_500_000.0)
        );
        assert!(parse_amount(&Some("a lot".into())).is_err());
    }
}
