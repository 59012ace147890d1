//! ABOUTME: Browser authentication pages for login, registration and password reset
//! ABOUTME: Sessions are JWTs in an HTTP-only cookie; reset links are single-use tokens

use crate::{
    auth::{clear_session_cookie, session_cookie, JwtAuth, PasswordAuth, MIN_PASSWORD_LEN},
    error::PageResult,
    middleware::{auth::MaybeUser, ratelimit::RateLimit},
    models::{is_valid_phone, ForgotPasswordForm, LoginForm, RegisterForm, ResetPasswordForm},
    routes::redirect,
    views::{render, ForgotPasswordPage, Layout, LoginPage, RegisterPage, ResetPasswordPage},
    AppState,
};
use actix_web::{get, web, HttpResponse};
use sb_db::{
    CreateUserRequest, EmailTemplateRepository, PasswordResetRepository, ReferenceRepository,
    Role, User, UserRepository, PASSWORD_RESET_TEMPLATE,
};
use sb_notify::render_template;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use validator::ValidateEmail;

const INVALID_CREDENTIALS: &str = "Invalid email or password.";

const FALLBACK_RESET_SUBJECT: &str = "Reset your password";
const FALLBACK_RESET_HTML: &str = "<p>Hello {{ name }},</p>\
<p>Follow <a href=\"{{ reset_url }}\">this link</a> to choose a new password. \
The link expires in one hour.</p><p>{{ site_name }}</p>";

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Investor => "Investor",
        Role::Startuper => "Startup founder",
        _ => "Community member",
    }
}

fn self_service_roles() -> Vec<(&'static str, &'static str)> {
    Role::SELF_SERVICE
        .iter()
        .map(|r| (r.as_str(), role_label(*r)))
        .collect()
}

/// Where a freshly signed-in user lands
fn landing_for(user: &User) -> &'static str {
    if user.role().is_staff() {
        "/admin"
    } else {
        "/dashboard"
    }
}

fn signed_in(state: &AppState, user: &User) -> PageResult {
    let token = JwtAuth::create_token(&user.id, &user.email, user.role(), state.jwt_secret())?;
    Ok(HttpResponse::Found()
        .insert_header(("Location", landing_for(user)))
        .cookie(session_cookie(token, state.config.security.secure_cookies))
        .finish())
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub reset: Option<String>,
}

async fn login_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<LoginQuery>,
) -> PageResult {
    if user.0.is_some() {
        return Ok(redirect("/dashboard"));
    }

    let notice = query
        .reset
        .as_ref()
        .map(|_| "Password updated. Please sign in.".to_string());

    render(&LoginPage {
        layout: Layout::new(&state, None),
        email: String::new(),
        error: None,
        notice,
    })
}

async fn login_submit(state: web::Data<AppState>, form: web::Form<LoginForm>) -> PageResult {
    let form = form.into_inner();
    let email = form.email.trim().to_lowercase();
    debug!("Login attempt");

    let failed = |error: &str| {
        render(&LoginPage {
            layout: Layout::new(&state, None),
            email: email.clone(),
            error: Some(error.to_string()),
            notice: None,
        })
    };

    let Some(user) = UserRepository::new(state.db.pool())
        .find_by_email(&email)
        .await?
    else {
        warn!("Login attempt for unknown email");
        return failed(INVALID_CREDENTIALS);
    };

    if !PasswordAuth::verify_password(&form.password, &user.password_hash)? {
        warn!(user_id = %user.id, "Invalid password");
        return failed(INVALID_CREDENTIALS);
    }

    if !user.is_active() {
        warn!(user_id = %user.id, "Login attempt for inactive user");
        return failed("This account is disabled.");
    }

    info!(user_id = %user.id, "User signed in");
    signed_in(&state, &user)
}

async fn register_page(state: web::Data<AppState>, user: MaybeUser) -> PageResult {
    if user.0.is_some() {
        return Ok(redirect("/dashboard"));
    }

    render(&RegisterPage {
        layout: Layout::new(&state, None),
        form: RegisterForm::default(),
        errors: Vec::new(),
        countries: ReferenceRepository::new(state.db.pool()).countries().await?,
        roles: self_service_roles(),
    })
}

/// Problems with a registration form, in display order
pub(crate) fn registration_errors(form: &RegisterForm) -> Vec<String> {
    let mut errors = Vec::new();
    let required = [
        (&form.first_name, "First name is required."),
        (&form.last_name, "Last name is required."),
        (&form.email, "Email is required."),
        (&form.phone, "Phone is required."),
        (&form.country_id, "Country is required."),
        (&form.city, "City is required."),
    ];
    for (value, message) in required {
        if value.trim().is_empty() {
            errors.push(message.to_string());
        }
    }

    let email = form.email.trim();
    if !email.is_empty() && !email.validate_email() {
        errors.push("Email address is not valid.".to_string());
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        ));
    }
    let phone = form.phone.trim();
    if !phone.is_empty() && !is_valid_phone(phone) {
        errors.push("Phone must look like +77011234567.".to_string());
    }

    let role_ok = form
        .role
        .parse::<Role>()
        .map(|r| Role::SELF_SERVICE.contains(&r))
        .unwrap_or(false);
    if !role_ok {
        errors.push("Choose an account type.".to_string());
    }

    errors
}

async fn register_submit(state: web::Data<AppState>, form: web::Form<RegisterForm>) -> PageResult {
    let mut form = form.into_inner();
    form.email = form.email.trim().to_lowercase();
    let repo = UserRepository::new(state.db.pool());

    let mut errors = registration_errors(&form);
    if errors.is_empty() && repo.find_by_email(&form.email).await?.is_some() {
        errors.push("That email is already registered.".to_string());
    }

    if !errors.is_empty() {
        debug!(count = errors.len(), "Registration rejected");
        form.password.clear();
        return render(&RegisterPage {
            layout: Layout::new(&state, None),
            form,
            errors,
            countries: ReferenceRepository::new(state.db.pool()).countries().await?,
            roles: self_service_roles(),
        });
    }

    let role = form.role.parse::<Role>()?;
    let user = repo
        .create(CreateUserRequest {
            email: form.email,
            password_hash: PasswordAuth::hash_password(&form.password)?,
            role,
            first_name: form.first_name,
            last_name: form.last_name,
            country_id: Some(form.country_id),
            city: Some(form.city.trim().to_string()),
            phone: Some(form.phone.trim().to_string()),
            telegram: None,
            linkedin: None,
        })
        .await?;

    info!(user_id = %user.id, role = %role, "Registered new user");
    signed_in(&state, &user)
}

#[get("/logout")]
pub async fn logout() -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("Location", "/"))
        .cookie(clear_session_cookie())
        .finish()
}

async fn forgot_password_page(state: web::Data<AppState>) -> PageResult {
    render(&ForgotPasswordPage {
        layout: Layout::new(&state, None),
        sent: false,
        error: None,
    })
}

/// Issue a token and mail the link; failures are logged, never shown
async fn send_reset_link(state: &AppState, user: &User) -> sb_core::Result<()> {
    let pool = state.db.pool();
    // range-checked by config validation
    let ttl = chrono::Duration::seconds(state.config.security.password_reset_ttl_secs as i64);
    let token = PasswordResetRepository::new(pool)
        .create_with_ttl(&user.id, ttl)
        .await?;

    let reset_url = format!(
        "{}/reset-password?token={}",
        state.config.site.url.trim_end_matches('/'),
        token
    );
    let mut vars = HashMap::new();
    vars.insert("name", user.full_name());
    vars.insert("reset_url", reset_url);
    vars.insert("site_name", state.config.site.name.clone());

    let (subject, html) = match EmailTemplateRepository::new(pool)
        .find_active_by_code(PASSWORD_RESET_TEMPLATE)
        .await?
    {
        Some(template) => (template.subject, template.html_content),
        None => (
            FALLBACK_RESET_SUBJECT.to_string(),
            FALLBACK_RESET_HTML.to_string(),
        ),
    };

    state
        .mailer
        .send_html(
            &user.email,
            &render_template(&subject, &vars),
            &render_template(&html, &vars),
        )
        .await?;
    Ok(())
}

async fn forgot_password_submit(
    state: web::Data<AppState>,
    form: web::Form<ForgotPasswordForm>,
) -> PageResult {
    let email = form.email.trim().to_lowercase();
    if email.is_empty() {
        return render(&ForgotPasswordPage {
            layout: Layout::new(&state, None),
            sent: false,
            error: Some("Email is required.".to_string()),
        });
    }

    match UserRepository::new(state.db.pool()).find_by_email(&email).await? {
        Some(user) if user.is_active() => {
            if let Err(e) = send_reset_link(&state, &user).await {
                warn!(user_id = %user.id, "Failed to send password reset: {}", e);
            }
        }
        _ => debug!("Password reset requested for unknown or inactive email"),
    }

    render(&ForgotPasswordPage {
        layout: Layout::new(&state, None),
        sent: true,
        error: None,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetQuery {
    pub token: Option<String>,
}

async fn reset_password_page(
    state: web::Data<AppState>,
    query: web::Query<ResetQuery>,
) -> PageResult {
    let token = query.token.as_deref().map(str::trim).unwrap_or_default();
    if token.is_empty() {
        return Ok(redirect("/forgot-password"));
    }

    render(&ResetPasswordPage {
        layout: Layout::new(&state, None),
        token: token.to_string(),
        error: None,
    })
}

async fn reset_password_submit(
    state: web::Data<AppState>,
    form: web::Form<ResetPasswordForm>,
) -> PageResult {
    let form = form.into_inner();
    let again = |error: String| {
        render(&ResetPasswordPage {
            layout: Layout::new(&state, None),
            token: form.token.clone(),
            error: Some(error),
        })
    };

    if form.token.trim().is_empty() {
        return Ok(redirect("/forgot-password"));
    }
    if form.password != form.confirm_password {
        return again("Passwords do not match.".to_string());
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return again(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        ));
    }

    let user_id = match PasswordResetRepository::new(state.db.pool())
        .consume(&form.token)
        .await
    {
        Ok(user_id) => user_id,
        Err(sb_core::Error::Validation(message)) => return again(message),
        Err(e) => return Err(e.into()),
    };

    let hash = PasswordAuth::hash_password(&form.password)?;
    UserRepository::new(state.db.pool())
        .set_password(&user_id, &hash)
        .await?;

    info!(user_id = %user_id, "Password reset completed");
    Ok(redirect("/login?reset=1"))
}

pub fn configure(cfg: &mut web::ServiceConfig, limit: &RateLimit) {
    cfg.service(
        web::resource("/login")
            .wrap(limit.clone())
            .route(web::get().to(login_page))
            .route(web::post().to(login_submit)),
    )
    .service(
        web::resource("/register")
            .wrap(limit.clone())
            .route(web::get().to(register_page))
            .route(web::post().to(register_submit)),
    )
    .service(
        web::resource("/forgot-password")
            .wrap(limit.clone())
            .route(web::get().to(forgot_password_page))
            .route(web::post().to(forgot_password_submit)),
    )
    .service(
        web::resource("/reset-password")
            .route(web::get().to(reset_password_page))
            .route(web::post().to(reset_password_submit)),
    )
    .service(logout);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> RegisterForm {
        RegisterForm {
            first_name: "Aida".to_string(),
            last_name: "Nurlanova".to_string(),
            email: "aida@example.com".to_string(),
            password: "secret1".to_string(),
            phone: "+77011234567".to_string(),
            country_id: "kz".to_string(),
            city: "Almaty".to_string(),
            role: "startuper".to_string(),
        }
    }

    #[test]
    fn test_valid_registration_has_no_errors() {
        assert!(registration_errors(&valid_form()).is_empty());
    }

    #[test]
    fn test_registration_rejects_staff_roles() {
        let mut form = valid_form();
        form.role = "admin".to_string();
        assert_eq!(registration_errors(&form), vec!["Choose an account type."]);
    }

    #[test]
    fn test_registration_reports_each_problem() {
        let form = RegisterForm {
            email: "not-an-email".to_string(),
            password: "123".to_string(),
            phone: "87011234567".to_string(),
            role: "user".to_string(),
            ..Default::default()
        };
        let errors = registration_errors(&form);
        assert!(errors.contains(&"First name is required.".to_string()));
        assert!(errors.contains(&"Email address is not valid.".to_string()));
        assert!(errors.contains(&"Password must be at least 6 characters.".to_string()));
        assert!(errors.contains(&"Phone must look like +77011234567.".to_string()));
        assert!(!errors.contains(&"Choose an account type.".to_string()));
    }
}
