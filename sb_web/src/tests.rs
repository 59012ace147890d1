//! ABOUTME: End-to-end request flows across the browser pages of the web layer
//! ABOUTME: Covers sign-up, sign-in, password reset, profile edits and admin previews

use super::*;
use crate::auth::{PasswordAuth, AUTH_COOKIE};
use crate::test_helpers::*;
use actix_web::{cookie::Cookie, http::StatusCode, test};
use sb_db::{EmailTemplateRepository, EmailTemplateRequest, PasswordResetRepository, Role, UserRepository};

fn location<B>(resp: &actix_web::dev::ServiceResponse<B>) -> String {
    resp.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn session_from<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Option<String> {
    resp.response()
        .cookies()
        .find(|c| c.name() == AUTH_COOKIE)
        .map(|c| c.value().to_string())
}

async fn body_text<B: actix_web::body::MessageBody>(resp: actix_web::dev::ServiceResponse<B>) -> String {
    String::from_utf8_lossy(&test::read_body(resp).await).to_string()
}

#[actix_web::test]
async fn test_register_signs_in_and_opens_dashboard() {
    let state = test_state().await;
    let country = sb_db::ReferenceRepository::new(state.db.pool())
        .create_named(sb_db::NamedTable::Countries, "Kazakhstan")
        .await
        .expect("country");
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_form([
            ("first_name", "Aida"),
            ("last_name", "Nurlanovna"),
            ("email", "Aida@Example.com"),
            ("password", "secret123"),
            ("phone", "+77011234567"),
            ("country_id", country.id.as_str()),
            ("city", "Almaty"),
            ("role", "startuper"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let token = session_from(&resp).expect("session cookie");

    let req = test::TestRequest::get()
        .uri("/dashboard")
        .cookie(Cookie::new(AUTH_COOKIE, token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Hello, Aida"));
    assert!(html.contains("aida@example.com"), "email is stored lowercased");
}

#[actix_web::test]
async fn test_register_rerenders_with_errors() {
    let state = test_state().await;
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_form([("first_name", "Aida"), ("email", "not-an-email"), ("role", "admin")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(session_from(&resp).is_none());
    let html = body_text(resp).await;
    assert!(html.contains("Email address is not valid."));
    assert!(html.contains("Choose an account type."));
}

#[actix_web::test]
async fn test_login_page_flow() {
    let state = test_state().await;
    create_user(&state, "founder@example.com", "password123", Role::Startuper).await;
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/login")
        .set_form([("email", "founder@example.com"), ("password", "wrong")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(session_from(&resp).is_none());
    assert!(body_text(resp).await.contains("founder@example.com"));

    let req = test::TestRequest::post()
        .uri("/login")
        .set_form([("email", " Founder@Example.com "), ("password", "password123")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/dashboard");
    assert!(session_from(&resp).is_some());

    let req = test::TestRequest::get().uri("/logout").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(session_from(&resp).as_deref(), Some(""));
}

#[actix_web::test]
async fn test_password_reset_token_is_single_use() {
    let state = test_state().await;
    let user = create_user(&state, "reset@example.com", "oldpass1", Role::User).await;
    let token = PasswordResetRepository::new(state.db.pool())
        .create(&user.id)
        .await
        .expect("reset token");
    let pool = state.db.pool().clone();
    let app = test::init_service(create_app(state)).await;

    // unknown addresses get the same answer as known ones
    let req = test::TestRequest::post()
        .uri("/forgot-password")
        .set_form([("email", "nobody@example.com")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("reset link is on its way"));

    let req = test::TestRequest::post()
        .uri("/reset-password")
        .set_form([
            ("token", token.as_str()),
            ("password", "newpass1"),
            ("confirm_password", "different"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(body_text(resp).await.contains("Passwords do not match."));

    let form = [
        ("token", token.as_str()),
        ("password", "newpass1"),
        ("confirm_password", "newpass1"),
    ];
    let req = test::TestRequest::post().uri("/reset-password").set_form(form).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/login?reset=1");

    let stored = UserRepository::new(&pool)
        .find_by_id(&user.id)
        .await
        .expect("query")
        .expect("user");
    assert!(PasswordAuth::verify_password("newpass1", &stored.password_hash).expect("verify"));

    let req = test::TestRequest::post().uri("/reset-password").set_form(form).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK, "a used token re-renders the form");
}

#[actix_web::test]
async fn test_forgot_password_issues_token_for_known_user() {
    let state = test_state().await;
    let user = create_user(&state, "known@example.com", "oldpass1", Role::User).await;
    let pool = state.db.pool().clone();
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/forgot-password")
        .set_form([("email", "Known@Example.com")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("reset link is on its way"));

    let expires_at: String =
        sqlx::query_scalar("SELECT expires_at FROM password_resets WHERE user_id = ?1")
            .bind(&user.id)
            .fetch_one(&pool)
            .await
            .expect("token row");
    let expires_at = chrono::DateTime::parse_from_rfc3339(&expires_at).expect("timestamp");
    let remaining = expires_at.signed_duration_since(chrono::Utc::now());
    assert!(remaining > chrono::Duration::minutes(59));
    assert!(remaining <= chrono::Duration::hours(1));
}

#[actix_web::test]
async fn test_profile_edit_needs_csrf_and_saves() {
    let state = test_state().await;
    let user = create_user(&state, "member@example.com", "password123", Role::User).await;
    let token = token_for(&state, &user);
    let csrf_token = csrf::issue(&user.id, state.jwt_secret());
    let pool = state.db.pool().clone();
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/dashboard/user/edit")
        .cookie(Cookie::new(AUTH_COOKIE, token.clone()))
        .set_form([("csrf_token", "forged"), ("first_name", "Changed")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/dashboard/user/edit")
        .cookie(Cookie::new(AUTH_COOKIE, token.clone()))
        .set_form([
            ("csrf_token", csrf_token.as_str()),
            ("first_name", "Changed"),
            ("telegram", "@member"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(location(&resp), "/dashboard?success=profile_updated");

    let stored = UserRepository::new(&pool)
        .find_by_id(&user.id)
        .await
        .expect("query")
        .expect("user");
    assert_eq!(stored.first_name, "Changed");
    assert_eq!(stored.telegram.as_deref(), Some("@member"));
    assert_eq!(stored.last_name, "User", "blank fields keep their value");

    let req = test::TestRequest::post()
        .uri("/dashboard/user/edit")
        .cookie(Cookie::new(AUTH_COOKIE, token))
        .set_form([("csrf_token", csrf_token.as_str()), ("phone", "12345")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(location(&resp), "/dashboard?error=invalid_phone");
}

#[actix_web::test]
async fn test_email_template_preview_fills_placeholders() {
    let state = test_state().await;
    let admin = create_user(&state, "admin@example.com", "password123", Role::Admin).await;
    let template = EmailTemplateRepository::new(state.db.pool())
        .create(EmailTemplateRequest {
            code: "welcome".to_string(),
            subject: "Welcome to {{ site_name }}".to_string(),
            html_content: "<p>Hi {{ name }}, visit {{ site_url }}</p>".to_string(),
            is_active: true,
        })
        .await
        .expect("template");
    let token = token_for(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get()
        .uri(&format!("/admin/email-templates/{}/preview", template.id))
        .cookie(Cookie::new(AUTH_COOKIE, token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("<p>Hi admin@example.com, visit"));
    assert!(!html.contains("{{ name }}"));
}

#[actix_web::test]
async fn test_pages_carry_security_headers() {
    let state = test_state().await;
    let app = test::init_service(create_app(state)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("x-content-type-options").and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
    assert!(resp.headers().contains_key("x-frame-options"));
}

#[actix_web::test]
async fn test_static_assets_are_served() {
    let state = test_state().await;
    let static_dir = std::path::PathBuf::from(&state.config.server.static_dir);
    std::fs::create_dir_all(&static_dir).expect("static dir");
    std::fs::write(static_dir.join("app.js"), "// app").expect("asset");
    let app = test::init_service(create_app(state)).await;

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/static/app.js").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "// app");
}
