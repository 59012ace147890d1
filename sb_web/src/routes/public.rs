//! ABOUTME: Public directory pages: companies, investors, news, events, jobs and more
//! ABOUTME: Also serves robots.txt and a sitemap generated from the database

use crate::{
    error::{PageError, PageResult},
    middleware::auth::MaybeUser,
    models::non_blank,
    pagination::{carried_params, Pagination, PaginationParams, DEFAULT_MAX_PER_PAGE},
    routes::{redirect, text},
    views::{
        calendar_strip, render, AnalyticsPage, CompaniesPage, CompanyPage, EventPage, EventsPage,
        HomePage, InfoPage, InvestorPage, InvestorsPage, JobPage, JobsPage, Layout, NewsListPage,
        NewsPage, PodcastsPage, SearchPage, Sitemap, SitemapUrl,
    },
    AppState,
};
use actix_web::{get, web, HttpResponse};
use askama::Template;
use chrono::Datelike;
use sb_core::time::{parse_date, today};
use sb_db::{
    CommentRepository, CompanyFilter, CompanyFilters, CompanyRepository, DealRepository,
    EventFilter, EventRepository, InvestorFilter, InvestorFilters, InvestorRepository,
    JobFilter, JobRepository, NamedTable, NewsRepository, PageRequest, PitchRepository,
    PodcastRepository, PortfolioRepository, ReferenceRepository, SearchRepository,
};
use serde::Deserialize;
use tracing::debug;

const DIRECTORY_PER_PAGE: i64 = 20;
const HOME_DIRECTORY_LIMIT: i64 = 20;
const HOME_FEED_LIMIT: i64 = 10;
const CALENDAR_DAYS: i64 = 30;
const SIMILAR_COMPANIES: i64 = 6;
const ACTIVE: &str = "active";

fn active() -> Option<String> {
    Some(ACTIVE.to_string())
}

fn with_per_page(mut params: Vec<(String, String)>, per_page: Option<i64>) -> Vec<(String, String)> {
    if let Some(per_page) = per_page {
        params.push(("per_page".to_string(), per_page.to_string()));
    }
    params
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[get("/")]
pub async fn home_page(state: web::Data<AppState>, user: MaybeUser) -> PageResult {
    let pool = state.db.pool();
    let active_page = PageRequest::new(HOME_FEED_LIMIT, 0);

    let companies = CompanyRepository::new(pool).latest(HOME_DIRECTORY_LIMIT).await?;
    let investors = InvestorRepository::new(pool).latest(HOME_DIRECTORY_LIMIT).await?;
    let news = state.queries.latest_news(HOME_FEED_LIMIT).await?;
    let podcasts = PodcastRepository::new(pool)
        .list(&None, &active(), active_page)
        .await?;
    let jobs = JobRepository::new(pool).latest(HOME_FEED_LIMIT).await?;
    let events = EventRepository::new(pool).upcoming(HOME_FEED_LIMIT).await?;

    render(&HomePage {
        layout: Layout::new(&state, user.0),
        companies,
        investors,
        news,
        podcasts,
        jobs,
        events,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[get("/search")]
pub async fn search_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<SearchQuery>,
) -> PageResult {
    let Some(q) = non_blank(&query.q) else {
        return Ok(redirect("/"));
    };

    let results = SearchRepository::new(state.db.pool()).search_all(&q).await?;
    debug!(q = %q, total = results.total, "Site search");

    render(&SearchPage {
        layout: Layout::new(&state, user.0),
        results,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyQuery {
    pub q: Option<String>,
    pub country: Option<String>,
    pub stage: Option<String>,
    pub industry: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[get("/companies")]
pub async fn companies_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<CompanyQuery>,
) -> PageResult {
    let query = query.into_inner();
    let params = PaginationParams::from_query(
        query.page,
        query.per_page,
        DIRECTORY_PER_PAGE,
        DEFAULT_MAX_PER_PAGE,
    );
    let repo = CompanyRepository::new(state.db.pool());

    // Plain filter browsing is served from the cache; text search goes to the database
    let (companies, total) = match non_blank(&query.q) {
        None => {
            let filters = CompanyFilters {
                country: non_blank(&query.country),
                stage: non_blank(&query.stage),
                industry: non_blank(&query.industry),
            };
            let page = state
                .queries
                .companies(&filters, params.per_page, params.offset)
                .await?;
            (page.companies, page.total)
        }
        Some(q) => {
            let filter = CompanyFilter {
                q: Some(q),
                country: non_blank(&query.country),
                stage: non_blank(&query.stage),
                industry: non_blank(&query.industry),
                ..CompanyFilter::active()
            };
            (
                repo.search(&filter, params.page_request()).await?,
                repo.count(&filter).await?,
            )
        }
    };

    let links = with_per_page(
        carried_params(&[
            ("q", &query.q),
            ("country", &query.country),
            ("stage", &query.stage),
            ("industry", &query.industry),
        ]),
        query.per_page,
    );

    render(&CompaniesPage {
        layout: Layout::new(&state, user.0),
        companies,
        options: repo.filter_options().await?,
        q: text(&query.q),
        country: text(&query.country),
        stage: text(&query.stage),
        industry: text(&query.industry),
        pagination: Pagination::new(params.page, params.per_page, total, "/companies", links),
    })
}

#[get("/company/{id}")]
pub async fn company_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> PageResult {
    let id = path.into_inner();
    let pool = state.db.pool();
    let is_staff = user.0.as_ref().map(|u| u.is_staff()).unwrap_or(false);

    let repo = CompanyRepository::new(pool);
    let company = repo
        .find_by_id(&id)
        .await?
        .filter(|c| c.status == ACTIVE || is_staff)
        .ok_or(PageError::NotFound)?;

    let team = repo.team(&id).await?;
    let similar = repo.similar(&company, SIMILAR_COMPANIES).await?;
    let deals = DealRepository::new(pool).list_by_company(&id).await?;
    let jobs = JobRepository::new(pool)
        .list_by_company(&id)
        .await?
        .into_iter()
        .filter(|j| j.status == ACTIVE)
        .collect();
    let pitches = PitchRepository::new(pool).list_by_company(&id).await?;
    let comments = CommentRepository::new(pool)
        .list_for_entity("company", &id, PageRequest::new(50, 0))
        .await?;

    render(&CompanyPage {
        layout: Layout::new(&state, user.0),
        company,
        team,
        deals,
        jobs,
        pitches,
        similar,
        comments,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct InvestorQuery {
    pub q: Option<String>,
    pub country: Option<String>,
    pub focus: Option<String>,
    pub stages: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[get("/investors")]
pub async fn investors_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<InvestorQuery>,
) -> PageResult {
    let query = query.into_inner();
    let params = PaginationParams::from_query(
        query.page,
        query.per_page,
        DIRECTORY_PER_PAGE,
        DEFAULT_MAX_PER_PAGE,
    );
    let repo = InvestorRepository::new(state.db.pool());

    let cacheable = non_blank(&query.q).is_none() && non_blank(&query.stages).is_none();
    let (investors, total) = if cacheable {
        let filters = InvestorFilters {
            country: non_blank(&query.country),
            focus: non_blank(&query.focus),
        };
        let page = state
            .queries
            .investors(&filters, params.per_page, params.offset)
            .await?;
        (page.investors, page.total)
    } else {
        let filter = InvestorFilter {
            q: non_blank(&query.q),
            country: non_blank(&query.country),
            focus: non_blank(&query.focus),
            stages: non_blank(&query.stages),
            ..InvestorFilter::active()
        };
        (
            repo.search(&filter, params.page_request()).await?,
            repo.count(&filter).await?,
        )
    };

    let links = with_per_page(
        carried_params(&[
            ("q", &query.q),
            ("country", &query.country),
            ("focus", &query.focus),
            ("stages", &query.stages),
        ]),
        query.per_page,
    );

    render(&InvestorsPage {
        layout: Layout::new(&state, user.0),
        investors,
        options: repo.filter_options().await?,
        q: text(&query.q),
        country: text(&query.country),
        focus: text(&query.focus),
        stages: text(&query.stages),
        pagination: Pagination::new(params.page, params.per_page, total, "/investors", links),
    })
}

#[get("/investor/{id}")]
pub async fn investor_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> PageResult {
    let id = path.into_inner();
    let pool = state.db.pool();
    let is_staff = user.0.as_ref().map(|u| u.is_staff()).unwrap_or(false);

    let repo = InvestorRepository::new(pool);
    let investor = repo
        .find_by_id(&id)
        .await?
        .filter(|i| i.status == ACTIVE || is_staff)
        .ok_or(PageError::NotFound)?;

    let deals = DealRepository::new(pool)
        .mentioning_investor(&investor.name)
        .await?;
    let entries = PortfolioRepository::new(pool).list_by_investor(&id).await?;
    let companies = repo.portfolio_companies(&id).await?;
    let team = repo.team(&id).await?;

    render(&InvestorPage {
        layout: Layout::new(&state, user.0),
        investor,
        deals,
        entries,
        companies,
        team,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
}

#[get("/news")]
pub async fn news_list_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<NewsQuery>,
) -> PageResult {
    let params = PaginationParams::from_query(query.page, None, 12, DEFAULT_MAX_PER_PAGE);
    let repo = NewsRepository::new(state.db.pool());
    let q = non_blank(&query.q);

    let news = repo.list(&q, &active(), params.page_request()).await?;
    let total = repo.count(&q, &active()).await?;

    render(&NewsListPage {
        layout: Layout::new(&state, user.0),
        news,
        q: text(&query.q),
        pagination: Pagination::new(
            params.page,
            params.per_page,
            total,
            "/news",
            carried_params(&[("q", &query.q)]),
        ),
    })
}

#[get("/news/{slug}")]
pub async fn news_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> PageResult {
    let slug = path.into_inner();
    let pool = state.db.pool();
    let repo = NewsRepository::new(pool);

    let mut article = repo
        .find_by_slug(&slug)
        .await?
        .filter(|n| n.status == ACTIVE)
        .ok_or(PageError::NotFound)?;

    repo.increment_views(&article.id).await?;
    article.views += 1;

    let others = repo.others(&article.id, 5).await?;
    let events = EventRepository::new(pool).upcoming(3).await?;

    render(&NewsPage {
        layout: Layout::new(&state, user.0),
        article,
        others,
        events,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub q: Option<String>,
    pub date: Option<String>,
    pub format: Option<String>,
    pub country: Option<String>,
    pub page: Option<i64>,
}

#[get("/events")]
pub async fn events_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<EventQuery>,
) -> PageResult {
    let pool = state.db.pool();
    let params = PaginationParams::from_query(query.page, None, DIRECTORY_PER_PAGE, DEFAULT_MAX_PER_PAGE);
    // An unparseable date is ignored rather than rejected
    let day = non_blank(&query.date).and_then(|d| parse_date(&d));

    let filter = EventFilter {
        q: non_blank(&query.q),
        day,
        format: non_blank(&query.format),
        country: non_blank(&query.country),
        status: active(),
    };
    let repo = EventRepository::new(pool);
    let events = repo.search(&filter, params.page_request()).await?;
    let total = repo.count(&filter).await?;

    let countries = ReferenceRepository::new(pool)
        .list_named(NamedTable::Countries, &None, true)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();

    let links = carried_params(&[
        ("q", &query.q),
        ("date", &query.date),
        ("format", &query.format),
        ("country", &query.country),
    ]);

    render(&EventsPage {
        layout: Layout::new(&state, user.0),
        events,
        days: calendar_strip(today(), CALENDAR_DAYS, day),
        q: text(&query.q),
        date: day.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        format: text(&query.format),
        country: text(&query.country),
        formats: repo.formats().await?,
        countries,
        pagination: Pagination::new(params.page, params.per_page, total, "/events", links),
    })
}

#[get("/event/{id}")]
pub async fn event_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> PageResult {
    let id = path.into_inner();
    let repo = EventRepository::new(state.db.pool());

    let event = repo
        .find_by_id(&id)
        .await?
        .filter(|e| e.status == ACTIVE)
        .ok_or(PageError::NotFound)?;
    let others = repo.others(&id, 3).await?;

    render(&EventPage {
        layout: Layout::new(&state, user.0),
        event,
        others,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    pub q: Option<String>,
    pub city: Option<String>,
    pub job_type: Option<String>,
    pub company: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[get("/jobs")]
pub async fn jobs_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<JobQuery>,
) -> PageResult {
    let query = query.into_inner();
    let pool = state.db.pool();
    let params = PaginationParams::from_query(
        query.page,
        query.per_page,
        DIRECTORY_PER_PAGE,
        DEFAULT_MAX_PER_PAGE,
    );

    let filter = JobFilter {
        q: non_blank(&query.q),
        city: non_blank(&query.city),
        job_type: non_blank(&query.job_type),
        company_id: non_blank(&query.company),
        status: active(),
    };
    let repo = JobRepository::new(pool);
    let jobs = repo.search(&filter, params.page_request()).await?;
    let total = repo.count(&filter).await?;

    let links = with_per_page(
        carried_params(&[
            ("q", &query.q),
            ("city", &query.city),
            ("job_type", &query.job_type),
            ("company", &query.company),
        ]),
        query.per_page,
    );

    render(&JobsPage {
        layout: Layout::new(&state, user.0),
        jobs,
        cities: repo.cities().await?,
        job_types: repo.job_types().await?,
        companies: CompanyRepository::new(pool).options().await?,
        q: text(&query.q),
        city: text(&query.city),
        job_type: text(&query.job_type),
        company: text(&query.company),
        pagination: Pagination::new(params.page, params.per_page, total, "/jobs", links),
    })
}

#[get("/job/{id}")]
pub async fn job_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    path: web::Path<String>,
) -> PageResult {
    let pool = state.db.pool();
    let job = JobRepository::new(pool)
        .find_by_id(&path.into_inner())
        .await?
        .filter(|j| j.status == ACTIVE)
        .ok_or(PageError::NotFound)?;

    let company = match &job.company_id {
        Some(company_id) => CompanyRepository::new(pool).find_by_id(company_id).await?,
        None => None,
    };

    render(&JobPage {
        layout: Layout::new(&state, user.0),
        job,
        company,
    })
}

#[get("/podcasts")]
pub async fn podcasts_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<PageQuery>,
) -> PageResult {
    let params = PaginationParams::from_query(query.page, query.per_page, 12, DEFAULT_MAX_PER_PAGE);
    let repo = PodcastRepository::new(state.db.pool());

    let podcasts = repo.list(&None, &active(), params.page_request()).await?;
    let total = repo.count(&None, &active()).await?;

    render(&PodcastsPage {
        layout: Layout::new(&state, user.0),
        podcasts,
        pagination: Pagination::new(params.page, params.per_page, total, "/podcasts", vec![]),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub year: Option<String>,
}

#[get("/analytics")]
pub async fn analytics_page(
    state: web::Data<AppState>,
    user: MaybeUser,
    query: web::Query<AnalyticsQuery>,
) -> PageResult {
    let repo = DealRepository::new(state.db.pool());
    let years = repo.years().await?;

    let year = non_blank(&query.year)
        .and_then(|y| y.parse::<i32>().ok())
        .or_else(|| years.first().copied())
        .unwrap_or_else(|| today().year());

    let stats = repo.analytics_by_year(year).await?;
    let total_amount = stats.iter().map(|s| s.total_amount).sum();
    let total_deals = stats.iter().map(|s| s.deal_count).sum();

    render(&AnalyticsPage {
        layout: Layout::new(&state, user.0),
        years,
        year,
        stats,
        total_amount,
        total_deals,
        site: state.queries.analytics().await?,
    })
}

fn info_page(state: &AppState, user: MaybeUser, page: &'static str, title: &'static str) -> PageResult {
    render(&InfoPage {
        layout: Layout::new(state, user.0),
        page,
        title,
    })
}

#[get("/about")]
pub async fn about_page(state: web::Data<AppState>, user: MaybeUser) -> PageResult {
    info_page(&state, user, "about", "About")
}

#[get("/privacy")]
pub async fn privacy_page(state: web::Data<AppState>, user: MaybeUser) -> PageResult {
    info_page(&state, user, "privacy", "Privacy policy")
}

#[get("/terms")]
pub async fn terms_page(state: web::Data<AppState>, user: MaybeUser) -> PageResult {
    info_page(&state, user, "terms", "Terms of use")
}

fn site_base(state: &AppState) -> String {
    state.config.site.url.trim_end_matches('/').to_string()
}

#[get("/robots.txt")]
pub async fn robots_txt(state: web::Data<AppState>) -> HttpResponse {
    let body = format!(
        "User-agent: *\nDisallow: /admin\nDisallow: /dashboard\nDisallow: /api/\n\nSitemap: {}/sitemap.xml\n",
        site_base(&state)
    );
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(body)
}

#[get("/sitemap.xml")]
pub async fn sitemap_xml(state: web::Data<AppState>) -> PageResult {
    let pool = state.db.pool();
    let base = site_base(&state);
    let all = PageRequest::unbounded();
    let url = |path: String, lastmod: Option<String>| SitemapUrl {
        loc: format!("{}{}", base, path),
        lastmod: lastmod.map(|d| d.chars().take(10).collect()),
    };

    let mut urls: Vec<SitemapUrl> = [
        "/", "/companies", "/investors", "/news", "/events", "/jobs", "/podcasts", "/analytics",
        "/about", "/privacy", "/terms",
    ]
    .iter()
    .map(|path| url(path.to_string(), None))
    .collect();

    for c in CompanyRepository::new(pool)
        .search(&CompanyFilter::active(), all)
        .await?
    {
        urls.push(url(format!("/company/{}", c.id), Some(c.updated_at)));
    }
    for i in InvestorRepository::new(pool)
        .search(&InvestorFilter::active(), all)
        .await?
    {
        urls.push(url(format!("/investor/{}", i.id), Some(i.updated_at)));
    }
    for n in NewsRepository::new(pool).list(&None, &active(), all).await? {
        urls.push(url(format!("/news/{}", n.slug), Some(n.date)));
    }
    let events = EventFilter {
        status: active(),
        ..EventFilter::default()
    };
    for e in EventRepository::new(pool).search(&events, all).await? {
        urls.push(url(format!("/event/{}", e.id), None));
    }
    let jobs = JobFilter {
        status: active(),
        ..JobFilter::default()
    };
    for j in JobRepository::new(pool).search(&jobs, all).await? {
        urls.push(url(format!("/job/{}", j.id), Some(j.created_at)));
    }

    let xml = Sitemap { urls }.render()?;
    Ok(HttpResponse::Ok()
        .content_type("application/xml; charset=utf-8")
        .body(xml))
}

/// Fallback for unmatched paths
pub async fn not_found() -> PageResult {
    Err(PageError::NotFound)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(home_page)
        .service(search_page)
        .service(companies_page)
        .service(company_page)
        .service(investors_page)
        .service(investor_page)
        .service(news_list_page)
        .service(news_page)
        .service(events_page)
        .service(event_page)
        .service(jobs_page)
        .service(job_page)
        .service(podcasts_page)
        .service(analytics_page)
        .service(about_page)
        .service(privacy_page)
        .service(terms_page)
        .service(robots_txt)
        .service(sitemap_xml);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_app, test_helpers::test_state};
    use actix_web::test;
    use sb_db::{CreateCompanyRequest, CreateNewsRequest};

    #[actix_web::test]
    async fn test_home_renders_latest_companies() {
        let state = test_state().await;
        CompanyRepository::new(state.db.pool())
            .create(CreateCompanyRequest {
                name: "Steppe Labs".to_string(),
                country: Some("Kazakhstan".to_string()),
                ..Default::default()
            })
            .await
            .expect("company");

        let app = test::init_service(create_app(state)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), 200);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("Steppe Labs"));
    }

    #[actix_web::test]
    async fn test_empty_search_redirects_home() {
        let app = test::init_service(create_app(test_state().await)).await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/search?q=%20").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 302);
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/")
        );
    }

    #[actix_web::test]
    async fn test_company_page_shows_six_similar_companies() {
        let state = test_state().await;
        let repo = CompanyRepository::new(state.db.pool());
        let anchor = repo
            .create(CreateCompanyRequest {
                name: "Anchor Pay".to_string(),
                country: Some("Kazakhstan".to_string()),
                ..Default::default()
            })
            .await
            .expect("company");
        for i in 0..8 {
            repo.create(CreateCompanyRequest {
                name: format!("Peer {}", i),
                country: Some("Kazakhstan".to_string()),
                ..Default::default()
            })
            .await
            .expect("peer");
        }

        let app = test::init_service(create_app(state)).await;
        let uri = format!("/company/{}", anchor.id);
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), 200);
        let body = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
        assert_eq!(body.matches("<strong>Peer ").count(), 6);
    }

    #[actix_web::test]
    async fn test_missing_records_are_404() {
        let app = test::init_service(create_app(test_state().await)).await;
        for uri in ["/company/nope", "/investor/nope", "/news/nope", "/no-such-page"] {
            let resp =
                test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), 404, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_news_detail_counts_views() {
        let state = test_state().await;
        let news = NewsRepository::new(state.db.pool())
            .create(CreateNewsRequest {
                title: "Fund closes".to_string(),
                summary: Some("Summary".to_string()),
                content: Some("Body".to_string()),
                date: None,
                status: None,
                author_id: None,
            })
            .await
            .expect("news");
        let db = state.db.clone();

        let app = test::init_service(create_app(state)).await;
        let uri = format!("/news/{}", news.slug);
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), 200);

        let stored = NewsRepository::new(db.pool())
            .find_by_id(&news.id)
            .await
            .expect("query")
            .expect("news");
        assert_eq!(stored.views, 1);
    }

    #[actix_web::test]
    async fn test_sitemap_and_robots() {
        let state = test_state().await;
        let company = CompanyRepository::new(state.db.pool())
            .create(CreateCompanyRequest {
                name: "Nomad AI".to_string(),
                ..Default::default()
            })
            .await
            .expect("company");

        let app = test::init_service(create_app(state)).await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/sitemap.xml").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
        assert!(body.contains(&format!("http://localhost:8080/company/{}", company.id)));
        assert!(body.contains("<urlset"));

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/robots.txt").to_request(),
        )
        .await;
        let body = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
        assert!(body.contains("Sitemap: http://localhost:8080/sitemap.xml"));
    }

    #[actix_web::test]
    async fn test_listing_pages_render_empty() {
        let app = test::init_service(create_app(test_state().await)).await;
        for uri in [
            "/companies?page=3&per_page=500",
            "/companies?page=9223372036854775807",
            "/investors?stages=seed",
            "/news",
            "/events?date=not-a-date",
            "/jobs",
            "/podcasts",
            "/analytics?year=2023",
            "/about",
            "/privacy",
            "/terms",
        ] {
            let resp =
                test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), 200, "{}", uri);
        }
    }
}
