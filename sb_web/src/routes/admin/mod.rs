//! ABOUTME: Staff back office with one generic list/create/edit/delete flow per resource
//! ABOUTME: Each resource implements AdminResource; handlers here do paging, CSRF and caching

mod content;
mod directory;
mod reference;
mod support;

use crate::{
    csrf::CSRF_FIELD,
    error::{PageError, PageResult},
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{non_blank, parse_amount, CsrfForm},
    pagination::{carried_params, Pagination, PaginationParams, DEFAULT_MAX_PER_PAGE},
    routes::{redirect, require_csrf},
    views::{render, AdminDashboardPage, AdminFormPage, AdminListPage, AdminRow, FormField, Layout, RelatedSection},
    AppState,
};
use actix_web::{get, web, HttpResponse};
use async_trait::async_trait;
use sb_core::{Error, Result};
use sb_db::{CompanyRepository, PageRequest, ReferenceRepository, Role, UserRepository};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const ADMIN_PER_PAGE: i64 = 25;
const AUTOCOMPLETE_LIMIT: i64 = 10;

/// Statuses shared by most directory records
pub(crate) const STATUSES: [&str; 2] = ["active", "inactive"];

/// Sections linked from the admin dashboard, in menu order
const SECTIONS: &[(&str, &str)] = &[
    ("users", "Users"),
    ("companies", "Companies"),
    ("investors", "Investors"),
    ("people", "People"),
    ("deals", "Deals"),
    ("pitches", "Pitches"),
    ("jobs", "Jobs"),
    ("news", "News"),
    ("events", "Events"),
    ("podcasts", "Podcasts"),
    ("authors", "Authors"),
    ("countries", "Countries"),
    ("cities", "Cities"),
    ("categories", "Categories"),
    ("stages", "Company stages"),
    ("currencies", "Currencies"),
    ("feedback", "Feedback"),
    ("email-templates", "Email templates"),
];

/// Who is acting and against which state
pub(crate) struct AdminCtx<'a> {
    pub state: &'a AppState,
    pub actor: &'a AuthUser,
}

impl<'a> AdminCtx<'a> {
    pub fn pool(&self) -> &'a SqlitePool {
        self.state.db.pool()
    }
}

/// Submitted admin form, keyed by input name
#[derive(Debug, Default)]
pub(crate) struct FormData(pub HashMap<String, String>);

impl FormData {
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(|v| v.trim()).unwrap_or_default()
    }

    pub fn opt(&self, name: &str) -> Option<String> {
        non_blank(&self.0.get(name).cloned())
    }

    pub fn required(&self, name: &str, label: &str) -> Result<String> {
        self.opt(name)
            .ok_or_else(|| Error::Validation(format!("{} is required", label)))
    }

    /// Browsers omit unchecked boxes entirely
    pub fn checked(&self, name: &str) -> bool {
        matches!(self.get(name), "on" | "true" | "1")
    }

    pub fn amount(&self, name: &str) -> Result<Option<f64>> {
        parse_amount(&self.0.get(name).cloned())
    }

    /// Status select value, `active` when missing
    pub fn status(&self) -> String {
        self.opt("status").unwrap_or_else(|| STATUSES[0].to_string())
    }

    /// Put submitted values back into freshly built fields after a rejected save
    fn fill(&self, fields: &mut [FormField]) {
        for field in fields.iter_mut() {
            match field.kind {
                "readonly" | "password" => {}
                "checkbox" => field.value = if self.checked(field.name) { "on" } else { "" }.to_string(),
                _ => {
                    if let Some(value) = self.0.get(field.name) {
                        field.value = value.clone();
                    }
                }
            }
        }
    }
}

/// One back-office section; handlers below are generic over it
#[async_trait(?Send)]
pub(crate) trait AdminResource {
    /// URL segment under `/admin`
    const SECTION: &'static str;
    const TITLE: &'static str;
    const SINGULAR: &'static str;
    const CREATABLE: bool = true;
    /// Moderators may not open the section
    const ADMIN_ONLY: bool = false;
    /// Cache group dropped after every write
    const CACHE_KIND: Option<&'static str> = None;

    fn headers() -> Vec<&'static str>;

    fn statuses() -> Vec<&'static str> {
        STATUSES.to_vec()
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)>;

    /// Inputs for a blank form, or prefilled from record `id`; `None` when it is gone
    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>>;

    /// Returns the new record's id
    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String>;

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()>;

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool>;

    async fn related(_ctx: &AdminCtx<'_>, _id: &str) -> Result<Vec<RelatedSection>> {
        Ok(Vec::new())
    }

    fn links(_id: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Slice of an in-memory list for tables the repositories do not page
pub(crate) fn page_of<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let rows = items
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect();
    (rows, total)
}

/// Stored text shown in a table cell
pub(crate) fn cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn guard<R: AdminResource>(actor: &AuthUser) -> std::result::Result<(), PageError> {
    if R::ADMIN_ONLY && actor.role != Role::Admin {
        warn!(user_id = %actor.id, section = R::SECTION, "Moderator denied admin-only section");
        return Err(PageError::Forbidden);
    }
    Ok(())
}

async fn after_write<R: AdminResource>(state: &AppState) {
    if let Some(kind) = R::CACHE_KIND {
        if let Err(e) = state.invalidator.invalidate(kind).await {
            warn!(kind, "Cache invalidation failed: {}", e);
        }
    }
}

fn list_url<R: AdminResource>() -> String {
    format!("/admin/{}", R::SECTION)
}

fn record_url<R: AdminResource>(id: &str) -> String {
    format!("/admin/{}/{}", R::SECTION, id)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
}

async fn list_page<R: AdminResource>(
    state: web::Data<AppState>,
    auth: AuthUser,
    query: web::Query<ListQuery>,
) -> PageResult {
    guard::<R>(&auth)?;
    let params = PaginationParams::from_query(query.page, None, ADMIN_PER_PAGE, DEFAULT_MAX_PER_PAGE);
    let q = non_blank(&query.q);
    let status = non_blank(&query.status);

    let ctx = AdminCtx {
        state: &state,
        actor: &auth,
    };
    let (rows, total) = R::list(&ctx, &q, &status, params.page_request()).await?;
    debug!(section = R::SECTION, total, "Admin list");

    render(&AdminListPage {
        layout: Layout::new(&state, Some(auth.clone())),
        section: R::SECTION,
        title: R::TITLE,
        headers: R::headers(),
        rows,
        q: q.unwrap_or_default(),
        status: status.unwrap_or_default(),
        statuses: R::statuses(),
        can_create: R::CREATABLE,
        pagination: Pagination::new(
            params.page,
            params.per_page,
            total,
            list_url::<R>(),
            carried_params(&[("q", &query.q), ("status", &query.status)]),
        ),
    })
}

fn form_page<R: AdminResource>(
    state: &AppState,
    auth: &AuthUser,
    id: Option<&str>,
    fields: Vec<FormField>,
    errors: Vec<String>,
    related: Vec<RelatedSection>,
) -> PageResult {
    let (title, action, links, delete_url) = match id {
        Some(id) => (
            format!("Edit {}", R::SINGULAR),
            record_url::<R>(id),
            R::links(id),
            format!("{}/delete", record_url::<R>(id)),
        ),
        None => (
            format!("New {}", R::SINGULAR),
            format!("{}/new", list_url::<R>()),
            Vec::new(),
            String::new(),
        ),
    };

    render(&AdminFormPage {
        layout: Layout::new(state, Some(auth.clone())),
        section: R::SECTION,
        title,
        action,
        fields,
        errors,
        related,
        links,
        delete_url,
    })
}

/// Re-render the form with the submitted values when a save is refused
async fn rejected<R: AdminResource>(
    state: &AppState,
    auth: &AuthUser,
    id: Option<&str>,
    form: &FormData,
    err: Error,
) -> PageResult {
    let message = match err {
        Error::Validation(message) | Error::Conflict(message) => message,
        other => return Err(other.into()),
    };
    debug!(section = R::SECTION, %message, "Admin save rejected");

    let ctx = AdminCtx { state, actor: auth };
    let mut fields = R::fields(&ctx, id).await?.ok_or(PageError::NotFound)?;
    form.fill(&mut fields);
    let related = match id {
        Some(id) => R::related(&ctx, id).await?,
        None => Vec::new(),
    };
    form_page::<R>(state, auth, id, fields, vec![message], related)
}

async fn new_page<R: AdminResource>(state: web::Data<AppState>, auth: AuthUser) -> PageResult {
    guard::<R>(&auth)?;
    if !R::CREATABLE {
        return Err(PageError::NotFound);
    }
    let ctx = AdminCtx {
        state: &state,
        actor: &auth,
    };
    let fields = R::fields(&ctx, None).await?.ok_or(PageError::NotFound)?;
    form_page::<R>(&state, &auth, None, fields, Vec::new(), Vec::new())
}

async fn create<R: AdminResource>(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<HashMap<String, String>>,
) -> PageResult {
    guard::<R>(&auth)?;
    if !R::CREATABLE {
        return Err(PageError::NotFound);
    }
    let form = FormData(form.into_inner());
    require_csrf(&state, &auth, form.get(CSRF_FIELD))?;

    let ctx = AdminCtx {
        state: &state,
        actor: &auth,
    };
    match R::create(&ctx, &form).await {
        Ok(id) => {
            after_write::<R>(&state).await;
            info!(section = R::SECTION, id = %id, actor = %auth.id, "Admin created record");
            Ok(redirect(record_url::<R>(&id)))
        }
        Err(e) => rejected::<R>(&state, &auth, None, &form, e).await,
    }
}

async fn edit_page<R: AdminResource>(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> PageResult {
    guard::<R>(&auth)?;
    let id = path.into_inner();
    let ctx = AdminCtx {
        state: &state,
        actor: &auth,
    };
    let fields = R::fields(&ctx, Some(&id)).await?.ok_or(PageError::NotFound)?;
    let related = R::related(&ctx, &id).await?;
    form_page::<R>(&state, &auth, Some(&id), fields, Vec::new(), related)
}

async fn update<R: AdminResource>(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<HashMap<String, String>>,
) -> PageResult {
    guard::<R>(&auth)?;
    let id = path.into_inner();
    let form = FormData(form.into_inner());
    require_csrf(&state, &auth, form.get(CSRF_FIELD))?;

    let ctx = AdminCtx {
        state: &state,
        actor: &auth,
    };
    match R::update(&ctx, &id, &form).await {
        Ok(()) => {
            after_write::<R>(&state).await;
            info!(section = R::SECTION, id = %id, actor = %auth.id, "Admin updated record");
            Ok(redirect(list_url::<R>()))
        }
        Err(e) => rejected::<R>(&state, &auth, Some(&id), &form, e).await,
    }
}

async fn delete<R: AdminResource>(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    guard::<R>(&auth)?;
    require_csrf(&state, &auth, &form.csrf_token)?;
    let id = path.into_inner();

    let ctx = AdminCtx {
        state: &state,
        actor: &auth,
    };
    match R::delete(&ctx, &id).await {
        Ok(true) => {
            after_write::<R>(&state).await;
            info!(section = R::SECTION, id = %id, actor = %auth.id, "Admin deleted record");
            Ok(redirect(list_url::<R>()))
        }
        Ok(false) => Err(PageError::NotFound),
        Err(Error::Validation(message)) => {
            warn!(section = R::SECTION, id = %id, %message, "Admin delete refused");
            Err(PageError::Forbidden)
        }
        Err(e) => Err(e.into()),
    }
}

/// Mount the four generic routes for one resource
pub(crate) fn register<R: AdminResource + 'static>(cfg: &mut web::ServiceConfig) {
    let base = list_url::<R>();
    cfg.service(web::resource(base.clone()).route(web::get().to(list_page::<R>)))
        .service(
            web::resource(format!("{}/new", base))
                .route(web::get().to(new_page::<R>))
                .route(web::post().to(create::<R>)),
        )
        .service(
            web::resource(format!("{}/{{id}}", base))
                .route(web::get().to(edit_page::<R>))
                .route(web::post().to(update::<R>)),
        )
        .service(web::resource(format!("{}/{{id}}/delete", base)).route(web::post().to(delete::<R>)));
}

async fn dashboard(state: web::Data<AppState>, auth: AuthUser) -> PageResult {
    let stats = state.db.stats().await?;
    let roles = UserRepository::new(state.db.pool()).count_by_role().await?;
    let cache = state.queries.cache().stats().await;

    render(&AdminDashboardPage {
        layout: Layout::new(&state, Some(auth)),
        counts: stats.table_counts.into_iter().collect(),
        roles,
        cache,
        sections: SECTIONS.to_vec(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AutocompleteQuery {
    pub q: Option<String>,
}

#[get("/company_search")]
pub async fn company_search(
    state: web::Data<AppState>,
    query: web::Query<AutocompleteQuery>,
) -> PageResult {
    let items = match non_blank(&query.q) {
        Some(q) => {
            CompanyRepository::new(state.db.pool())
                .autocomplete(&q, AUTOCOMPLETE_LIMIT)
                .await?
        }
        None => Vec::new(),
    };
    Ok(HttpResponse::Ok().json(items))
}

#[get("/city_search")]
pub async fn city_search(
    state: web::Data<AppState>,
    query: web::Query<AutocompleteQuery>,
) -> PageResult {
    let items = match non_blank(&query.q) {
        Some(q) => {
            ReferenceRepository::new(state.db.pool())
                .city_search(&q, AUTOCOMPLETE_LIMIT)
                .await?
        }
        None => Vec::new(),
    };
    Ok(HttpResponse::Ok().json(items))
}

/// Routes mounted under `/admin`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .wrap(RequireRole::staff().redirect_to("/login"))
            .service(web::resource(["", "/"]).route(web::get().to(dashboard)))
            .service(company_search)
            .service(city_search)
            .configure(directory::configure)
            .configure(content::configure)
            .configure(reference::configure)
            .configure(support::configure),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_app, csrf, test_helpers::*};
    use actix_web::{cookie::Cookie, test as actix_test};

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_form_data_helpers() {
        let data = form(&[("name", "  Astana Hub "), ("blank", "  "), ("flag", "on")]);
        assert_eq!(data.get("name"), "Astana Hub");
        assert_eq!(data.opt("blank"), None);
        assert!(data.checked("flag"));
        assert!(!data.checked("missing"));
        assert_eq!(data.status(), "active");
        assert!(matches!(data.required("blank", "Title"), Err(Error::Validation(m)) if m == "Title is required"));
    }

    #[test]
    fn test_fill_keeps_passwords_and_checkboxes_honest() {
        let data = form(&[("name", "Typed"), ("password", "secret")]);
        let mut fields = vec![
            FormField::text("name", "Name").value("Stored"),
            FormField::new("password", "Password", "password"),
            FormField::new("is_active", "Active", "checkbox").value("on"),
        ];
        data.fill(&mut fields);
        assert_eq!(fields[0].value, "Typed");
        assert_eq!(fields[1].value, "");
        assert!(!fields[2].is_checked());
    }

    #[test]
    fn test_page_of_slices() {
        let (rows, total) = page_of((1..=30).collect::<Vec<_>>(), PageRequest::new(10, 25));
        assert_eq!(total, 30);
        assert_eq!(rows, vec![26, 27, 28, 29, 30]);
    }

    #[actix_web::test]
    async fn test_admin_requires_staff() {
        let state = test_state().await;
        let user = create_user(&state, "member@example.com", "secret1", Role::User).await;
        let token = token_for(&state, &user);

        let app = actix_test::init_service(create_app(state)).await;
        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/admin/companies")
                .cookie(Cookie::new("auth_token", token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 302);
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/login")
        );
    }

    #[actix_web::test]
    async fn test_moderator_cannot_manage_users() {
        let state = test_state().await;
        let moderator = create_user(&state, "mod@example.com", "secret1", Role::Moderator).await;
        let token = token_for(&state, &moderator);

        let app = actix_test::init_service(create_app(state)).await;
        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/admin/users")
                .cookie(Cookie::new("auth_token", token.clone()))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 403);

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/admin/companies")
                .cookie(Cookie::new("auth_token", token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_admin_creates_company_and_rerenders_on_error() {
        let state = test_state().await;
        let admin = create_user(&state, "root@example.com", "secret1", Role::Admin).await;
        let token = token_for(&state, &admin);
        let csrf_token = csrf::issue(&admin.id, state.jwt_secret());
        let db = state.db.clone();

        let app = actix_test::init_service(create_app(state)).await;
        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/admin/companies/new")
                .cookie(Cookie::new("auth_token", token.clone()))
                .set_form([("csrf_token", csrf_token.as_str()), ("name", "  ")])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body = String::from_utf8_lossy(&actix_test::read_body(resp).await).to_string();
        assert!(body.contains("Name is required"));

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/admin/companies/new")
                .cookie(Cookie::new("auth_token", token))
                .set_form([
                    ("csrf_token", csrf_token.as_str()),
                    ("name", "Tengri Robotics"),
                    ("status", "active"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 302);

        let companies = CompanyRepository::new(db.pool())
            .search(&sb_db::CompanyFilter::default(), PageRequest::default())
            .await
            .expect("search");
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].name, "Tengri Robotics");
    }

    #[actix_web::test]
    async fn test_admin_cannot_delete_self() {
        let state = test_state().await;
        let admin = create_user(&state, "self@example.com", "secret1", Role::Admin).await;
        let token = token_for(&state, &admin);
        let csrf_token = csrf::issue(&admin.id, state.jwt_secret());

        let app = actix_test::init_service(create_app(state)).await;
        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri(&format!("/admin/users/{}/delete", admin.id))
                .cookie(Cookie::new("auth_token", token))
                .set_form([("csrf_token", csrf_token.as_str())])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 403);
    }

    #[actix_web::test]
    async fn test_company_search_returns_json() {
        let state = test_state().await;
        let admin = create_user(&state, "json@example.com", "secret1", Role::Admin).await;
        let token = token_for(&state, &admin);
        CompanyRepository::new(state.db.pool())
            .create(sb_db::CreateCompanyRequest {
                name: "Silk Pay".to_string(),
                country: Some("Uzbekistan".to_string()),
                ..Default::default()
            })
            .await
            .expect("company");

        let app = actix_test::init_service(create_app(state)).await;
        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/admin/company_search?q=silk")
                .cookie(Cookie::new("auth_token", token))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let items: Vec<serde_json::Value> = actix_test::read_body_json(resp).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"].as_str().map(|s| !s.is_empty()), Some(true));
    }
}
