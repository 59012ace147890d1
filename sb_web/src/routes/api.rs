//! ABOUTME: JSON API under /api/v1 for listings, autocomplete, comments, notifications and cache admin
//! ABOUTME: Errors are RFC 7807 problem bodies; feedback is stored before it is forwarded

use crate::{
    auth::{JwtAuth, PasswordAuth},
    error::{ApiError, ApiResult},
    middleware::{
        auth::{AuthUser, MaybeUser, RequireAuth},
        ratelimit::RateLimit,
        rbac::RequireRole,
    },
    models::{non_blank, CommentPayload, FeedbackPayload, LoginRequest, LoginResponse, UserInfo},
    AppState,
};
use actix_web::{web, HttpResponse};
use chrono::Datelike;
use sb_db::{
    normalize_feedback_type, CommentRepository, CompanyFilter, CompanyFilters, CompanyRepository,
    CreateCommentRequest, CreateFeedbackRequest, DealRepository, FeedbackRepository,
    InvestorFilter, InvestorFilters, InvestorRepository, JobFilter, JobRepository,
    NotificationRepository, NotificationTemplate, PageRequest, SearchRepository, UserRepository,
};
use sb_notify::{format_feedback_message, Message};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use validator::Validate;

const MAX_LIMIT: i64 = 100;
const DEFAULT_LIMIT: i64 = 20;
const COMMENTS_DEFAULT_LIMIT: i64 = 50;
const AUTOCOMPLETE_PER_GROUP: usize = 5;
const NOTIFICATIONS_DEFAULT_LIMIT: i64 = 20;

/// Check a `limit`/`offset` pair; limit must be 1..=100 and offset non-negative
fn window(limit: Option<i64>, offset: Option<i64>, default_limit: i64) -> ApiResult<PageRequest> {
    let limit = limit.unwrap_or(default_limit);
    let offset = offset.unwrap_or(0);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    if offset < 0 {
        return Err(ApiError::bad_request("offset must not be negative"));
    }
    Ok(PageRequest::new(limit, offset))
}

#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    q: Option<String>,
    country: Option<String>,
    stage: Option<String>,
    industry: Option<String>,
}

#[derive(Debug, Serialize)]
struct Listing<T> {
    success: bool,
    #[serde(flatten)]
    items: T,
    total: i64,
    limit: i64,
    offset: i64,
}

async fn companies(
    state: web::Data<AppState>,
    query: web::Query<CompanyQuery>,
) -> ApiResult<HttpResponse> {
    let page = window(query.limit, query.offset, DEFAULT_LIMIT)?;

    let (companies, total) = match non_blank(&query.q) {
        None => {
            let filters = CompanyFilters {
                country: non_blank(&query.country),
                stage: non_blank(&query.stage),
                industry: non_blank(&query.industry),
            };
            let cached = state
                .queries
                .companies(&filters, page.limit, page.offset)
                .await?;
            (cached.companies, cached.total)
        }
        Some(q) => {
            let repo = CompanyRepository::new(state.db.pool());
            let filter = CompanyFilter {
                q: Some(q),
                country: non_blank(&query.country),
                stage: non_blank(&query.stage),
                industry: non_blank(&query.industry),
                ..CompanyFilter::active()
            };
            (repo.search(&filter, page).await?, repo.count(&filter).await?)
        }
    };

    Ok(HttpResponse::Ok().json(Listing {
        success: true,
        items: json!({ "companies": companies }),
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

async fn company(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let company = CompanyRepository::new(state.db.pool())
        .find_by_id(&path)
        .await?
        .filter(|c| c.status == "active")
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(HttpResponse::Ok().json(json!({ "success": true, "company": company })))
}

#[derive(Debug, Deserialize)]
pub struct InvestorQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    q: Option<String>,
    country: Option<String>,
    focus: Option<String>,
    stages: Option<String>,
}

async fn investors(
    state: web::Data<AppState>,
    query: web::Query<InvestorQuery>,
) -> ApiResult<HttpResponse> {
    let page = window(query.limit, query.offset, DEFAULT_LIMIT)?;

    let (investors, total) = if query.q.is_none() && query.stages.is_none() {
        let filters = InvestorFilters {
            country: non_blank(&query.country),
            focus: non_blank(&query.focus),
        };
        let cached = state
            .queries
            .investors(&filters, page.limit, page.offset)
            .await?;
        (cached.investors, cached.total)
    } else {
        let repo = InvestorRepository::new(state.db.pool());
        let filter = InvestorFilter {
            q: non_blank(&query.q),
            country: non_blank(&query.country),
            focus: non_blank(&query.focus),
            stages: non_blank(&query.stages),
            ..InvestorFilter::active()
        };
        (repo.search(&filter, page).await?, repo.count(&filter).await?)
    };

    Ok(HttpResponse::Ok().json(Listing {
        success: true,
        items: json!({ "investors": investors }),
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    q: Option<String>,
    city: Option<String>,
    job_type: Option<String>,
    company: Option<String>,
}

async fn jobs(state: web::Data<AppState>, query: web::Query<JobQuery>) -> ApiResult<HttpResponse> {
    let page = window(query.limit, query.offset, DEFAULT_LIMIT)?;
    let filter = JobFilter {
        q: non_blank(&query.q),
        city: non_blank(&query.city),
        job_type: non_blank(&query.job_type),
        company_id: non_blank(&query.company),
        status: Some("active".to_string()),
    };
    let repo = JobRepository::new(state.db.pool());

    Ok(HttpResponse::Ok().json(Listing {
        success: true,
        items: json!({ "jobs": repo.search(&filter, page).await? }),
        total: repo.count(&filter).await?,
        limit: page.limit,
        offset: page.offset,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Suggestion {
    kind: &'static str,
    id: String,
    title: String,
    url: String,
}

async fn search(
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> ApiResult<HttpResponse> {
    let q = non_blank(&query.q).unwrap_or_default();
    let results = SearchRepository::new(state.db.pool()).search_all(&q).await?;

    let mut suggestions: Vec<Suggestion> = Vec::new();
    suggestions.extend(results.companies.into_iter().take(AUTOCOMPLETE_PER_GROUP).map(|c| {
        Suggestion {
            kind: "company",
            url: format!("/company/{}", c.id),
            id: c.id,
            title: c.name,
        }
    }));
    suggestions.extend(results.investors.into_iter().take(AUTOCOMPLETE_PER_GROUP).map(|i| {
        Suggestion {
            kind: "investor",
            url: format!("/investor/{}", i.id),
            id: i.id,
            title: i.name,
        }
    }));
    suggestions.extend(results.news.into_iter().take(AUTOCOMPLETE_PER_GROUP).map(|n| {
        Suggestion {
            kind: "news",
            url: format!("/news/{}", n.slug),
            id: n.id,
            title: n.title,
        }
    }));
    suggestions.extend(results.jobs.into_iter().take(AUTOCOMPLETE_PER_GROUP).map(|j| {
        Suggestion {
            kind: "job",
            url: format!("/job/{}", j.id),
            id: j.id,
            title: j.title,
        }
    }));

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "query": q,
        "total": results.total,
        "results": suggestions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    year: Option<i32>,
}

async fn analytics(
    state: web::Data<AppState>,
    query: web::Query<AnalyticsQuery>,
) -> ApiResult<HttpResponse> {
    let site = state.queries.analytics().await?;
    let deals = DealRepository::new(state.db.pool());
    let years = deals.years().await?;
    let year = query
        .year
        .or_else(|| years.first().copied())
        .unwrap_or_else(|| chrono::Utc::now().year());
    let by_country = deals.analytics_by_year(year).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "site": site,
        "years": years,
        "year": year,
        "by_country": by_country,
    })))
}

/// Store the report, then try the chat bot; the report survives a failed send
async fn feedback(
    state: web::Data<AppState>,
    user: MaybeUser,
    payload: web::Json<FeedbackPayload>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let saved = FeedbackRepository::new(state.db.pool())
        .create(CreateFeedbackRequest {
            feedback_type: normalize_feedback_type(&payload.feedback_type).to_string(),
            description: payload.description,
            suggestion: non_blank(&payload.suggestion),
            name: non_blank(&payload.name),
            email: non_blank(&payload.email),
            page_url: non_blank(&payload.page_url),
            page_title: non_blank(&payload.page_title),
            user_agent: non_blank(&payload.user_agent),
            screen_size: non_blank(&payload.screen_size),
            is_authenticated: user.0.is_some(),
        })
        .await?;
    info!(feedback_id = %saved.id, kind = %saved.feedback_type, "Feedback stored");

    let message = Message::new(
        format!("Feedback: {}", saved.feedback_type),
        format_feedback_message(&saved),
    );
    let telegram_sent = match state.telegram.send(&message).await {
        Ok(()) => true,
        Err(e) => {
            warn!(feedback_id = %saved.id, "Feedback was not forwarded: {}", e);
            false
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "saved": true,
        "telegram_sent": telegram_sent,
        "feedback_id": saved.id,
        "message": if telegram_sent {
            "Thank you! Your feedback was sent."
        } else {
            "Thank you! Your feedback was saved."
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct CommentListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_comments(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<CommentListQuery>,
) -> ApiResult<HttpResponse> {
    let (entity_type, entity_id) = path.into_inner();
    if !sb_db::CommentValidator::is_valid_entity_type(&entity_type) {
        return Err(ApiError::bad_request("Unknown entity type"));
    }
    let page = window(query.limit, query.offset, COMMENTS_DEFAULT_LIMIT)?;
    let repo = CommentRepository::new(state.db.pool());

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "comments": repo.list_for_entity(&entity_type, &entity_id, page).await?,
        "total": repo.count_for_entity(&entity_type, &entity_id).await?,
    })))
}

async fn create_comment(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<(String, String)>,
    payload: web::Json<CommentPayload>,
) -> ApiResult<HttpResponse> {
    let (entity_type, entity_id) = path.into_inner();
    let payload = payload.into_inner();
    payload.validate()?;

    let pool = state.db.pool();
    let comment = CommentRepository::new(pool)
        .create(CreateCommentRequest {
            user_id: auth.id.clone(),
            content: payload.content,
            entity_type: entity_type.clone(),
            entity_id: entity_id.clone(),
            parent_id: non_blank(&payload.parent_id),
        })
        .await?;
    debug!(comment_id = %comment.id, "Comment posted");

    if entity_type == "company" {
        if let Some(company) = CompanyRepository::new(pool).find_by_id(&entity_id).await? {
            let template = NotificationTemplate::new_comment("company", &company.name);
            if let Err(e) = NotificationRepository::new(pool)
                .notify_company_users(&company.id, &template, ("company", &company.id), Some(&auth.id))
                .await
            {
                warn!(company_id = %company.id, "Comment notification failed: {}", e);
            }
        }
    }

    Ok(HttpResponse::Created().json(json!({ "success": true, "comment": comment })))
}

async fn update_comment(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    payload: web::Json<CommentPayload>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let updated = CommentRepository::new(state.db.pool())
        .update(&path, &auth.id, &payload.content)
        .await?;
    if !updated {
        return Err(ApiError::not_found("Comment not found or not yours"));
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn delete_comment(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let deleted = CommentRepository::new(state.db.pool())
        .soft_delete(&path, &auth.id, auth.is_staff())
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Comment not found or not yours"));
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    limit: Option<i64>,
    #[serde(default)]
    unread_only: bool,
}

async fn notifications(
    state: web::Data<AppState>,
    auth: AuthUser,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let limit = query.limit.unwrap_or(NOTIFICATIONS_DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    let list = NotificationRepository::new(state.db.pool())
        .list(&auth.id, limit, query.unread_only)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "notifications": list })))
}

async fn unread_count(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    let count = NotificationRepository::new(state.db.pool())
        .unread_count(&auth.id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "count": count })))
}

async fn mark_read(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let marked = NotificationRepository::new(state.db.pool())
        .mark_read(&path, &auth.id)
        .await?;
    if !marked {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn mark_all_read(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    let count = NotificationRepository::new(state.db.pool())
        .mark_all_read(&auth.id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "count": count })))
}

async fn delete_notification(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let deleted = NotificationRepository::new(state.db.pool())
        .delete(&path, &auth.id)
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn cache_stats(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let stats = state.queries.cache().stats().await;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "stats": stats })))
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    prefix: Option<String>,
}

async fn cache_clear(
    state: web::Data<AppState>,
    auth: AuthUser,
    query: web::Query<ClearQuery>,
) -> ApiResult<HttpResponse> {
    let prefix = non_blank(&query.prefix);
    let cleared = state.queries.cache().clear(prefix.as_deref()).await;
    info!(user_id = %auth.id, prefix = ?prefix, cleared, "Cache cleared");
    Ok(HttpResponse::Ok().json(json!({ "success": true, "cleared": cleared })))
}

async fn cache_invalidate(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let kind = path.into_inner();
    let cleared = state.invalidator.invalidate(&kind).await?;
    info!(user_id = %auth.id, kind = %kind, cleared, "Cache invalidated");
    Ok(HttpResponse::Ok().json(json!({ "success": true, "kind": kind, "cleared": cleared })))
}

/// Bearer token for API clients
async fn login(
    state: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let invalid = || ApiError::unauthorized("Invalid email or password");
    let user = UserRepository::new(state.db.pool())
        .find_by_email(&payload.email.trim().to_lowercase())
        .await?
        .ok_or_else(|| {
            warn!("API login for unknown email");
            invalid()
        })?;

    if !PasswordAuth::verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "API login with a wrong password");
        return Err(invalid());
    }
    if !user.is_active() {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    let token = JwtAuth::create_token(&user.id, &user.email, user.role(), state.jwt_secret())?;
    info!(user_id = %user.id, "API token issued");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: JwtAuth::token_expiration_secs(),
        user: UserInfo::from(&user),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig, limit: &RateLimit) {
    cfg.service(web::resource("/companies").route(web::get().to(companies)))
        .service(web::resource("/companies/{id}").route(web::get().to(company)))
        .service(web::resource("/investors").route(web::get().to(investors)))
        .service(web::resource("/jobs").route(web::get().to(jobs)))
        .service(web::resource("/search").route(web::get().to(search)))
        .service(web::resource("/analytics").route(web::get().to(analytics)))
        .service(
            web::resource("/feedback")
                .wrap(limit.clone())
                .route(web::post().to(feedback)),
        )
        .service(
            web::resource("/auth/login")
                .wrap(limit.clone())
                .route(web::post().to(login)),
        )
        .service(
            web::resource("/comments/{entity_type}/{entity_id}")
                .route(web::get().to(list_comments))
                .route(web::post().to(create_comment)),
        )
        .service(
            web::resource("/comments/{id}")
                .route(web::put().to(update_comment))
                .route(web::delete().to(delete_comment)),
        )
        .service(
            web::scope("/notifications")
                .wrap(RequireAuth::new())
                .route("", web::get().to(notifications))
                .route("/unread-count", web::get().to(unread_count))
                .route("/read-all", web::post().to(mark_all_read))
                .route("/{id}/read", web::post().to(mark_read))
                .route("/{id}", web::delete().to(delete_notification)),
        )
        .service(
            web::scope("/cache")
                .wrap(RequireRole::admin())
                .route("/stats", web::get().to(cache_stats))
                .route("/clear", web::post().to(cache_clear))
                .route("/invalidate/{kind}", web::post().to(cache_invalidate)),
        );
}
