//! ABOUTME: Askama page structs and the shared layout context
//! ABOUTME: Also holds template filters and the events calendar strip

use crate::{
    csrf,
    error::PageResult,
    middleware::auth::AuthUser,
    models::{CompanyForm, InvestorForm, RegisterForm},
    pagination::Pagination,
    AppState,
};
use actix_web::HttpResponse;
use askama::Template;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use sb_db::{
    CacheStats, CommentThread, Company, CountryDealStats, Country, Currency,
    DealWithCompany, EmailTemplate, Event, FilterOptions, Investor, InvestorFilterOptions,
    JobWithCompany, News, NewsWithAuthor, Notification, Person, Pitch, Podcast,
    PortfolioEntryView, SearchResults, SiteAnalytics, User,
};

/// Everything `base.html` needs
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub site_name: String,
    pub site_url: String,
    pub user: Option<AuthUser>,
    /// Form token for the signed-in user; empty when anonymous
    pub csrf_token: String,
}

impl Layout {
    pub fn new(state: &AppState, user: Option<AuthUser>) -> Self {
        let csrf_token = user
            .as_ref()
            .map(|u| csrf::issue(&u.id, &state.config.security.jwt_secret))
            .unwrap_or_default();
        Self {
            site_name: state.config.site.name.clone(),
            site_url: state.config.site.url.clone(),
            user,
            csrf_token,
        }
    }

    /// Layout for pages rendered outside a request context
    pub fn anonymous() -> Self {
        Self {
            site_name: "Stanbase".to_string(),
            ..Self::default()
        }
    }

    pub fn is_staff(&self) -> bool {
        self.user.as_ref().map(AuthUser::is_staff).unwrap_or(false)
    }
}

/// Render a template into a 200 HTML response
pub fn render<T: Template>(page: &T) -> PageResult {
    let html = page.render()?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html))
}

pub mod filters {
    use std::fmt::Display;

    /// Option as text, empty when None
    pub fn opt<T: Display>(value: &Option<T>) -> askama::Result<String> {
        Ok(value.as_ref().map(|v| v.to_string()).unwrap_or_default())
    }

    /// Whole amount with thousands separators, "-" when missing
    pub fn money(value: &Option<f64>) -> askama::Result<String> {
        Ok(value.map(group_thousands).unwrap_or_else(|| "-".to_string()))
    }

    pub fn amount(value: &f64) -> askama::Result<String> {
        Ok(group_thousands(*value))
    }

    /// Date part of an ISO timestamp
    pub fn day<S: AsRef<str>>(value: S) -> askama::Result<String> {
        Ok(value.as_ref().chars().take(10).collect())
    }

    /// ` selected` when an optional form value equals an option
    pub fn selected<S: AsRef<str>>(value: &Option<String>, option: S) -> askama::Result<&'static str> {
        Ok(if value.as_deref() == Some(option.as_ref()) {
            " selected"
        } else {
            ""
        })
    }

    pub(crate) fn group_thousands(value: f64) -> String {
        let rounded = value.round() as i64;
        let digits = rounded.unsigned_abs().to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        if rounded < 0 {
            format!("-{}", out)
        } else {
            out
        }
    }
}

// ---------------------------------------------------------------------------
// Public pages

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomePage {
    pub layout: Layout,
    pub companies: Vec<Company>,
    pub investors: Vec<Investor>,
    pub news: Vec<News>,
    pub podcasts: Vec<Podcast>,
    pub jobs: Vec<JobWithCompany>,
    pub events: Vec<Event>,
}

#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchPage {
    pub layout: Layout,
    pub results: SearchResults,
}

#[derive(Template)]
#[template(path = "companies.html")]
pub struct CompaniesPage {
    pub layout: Layout,
    pub companies: Vec<Company>,
    pub options: FilterOptions,
    pub q: String,
    pub country: String,
    pub stage: String,
    pub industry: String,
    pub pagination: Pagination,
}

#[derive(Template)]
#[template(path = "company.html")]
pub struct CompanyPage {
    pub layout: Layout,
    pub company: Company,
    pub team: Vec<Person>,
    pub deals: Vec<DealWithCompany>,
    pub jobs: Vec<sb_db::Job>,
    pub pitches: Vec<Pitch>,
    pub similar: Vec<Company>,
    pub comments: Vec<CommentThread>,
}

#[derive(Template)]
#[template(path = "investors.html")]
pub struct InvestorsPage {
    pub layout: Layout,
    pub investors: Vec<Investor>,
    pub options: InvestorFilterOptions,
    pub q: String,
    pub country: String,
    pub focus: String,
    pub stages: String,
    pub pagination: Pagination,
}

#[derive(Template)]
#[template(path = "investor.html")]
pub struct InvestorPage {
    pub layout: Layout,
    pub investor: Investor,
    /// Deals naming this investor, newest first
    pub deals: Vec<DealWithCompany>,
    pub entries: Vec<PortfolioEntryView>,
    pub companies: Vec<Company>,
    pub team: Vec<Person>,
}

#[derive(Template)]
#[template(path = "news_list.html")]
pub struct NewsListPage {
    pub layout: Layout,
    pub news: Vec<NewsWithAuthor>,
    pub q: String,
    pub pagination: Pagination,
}

#[derive(Template)]
#[template(path = "news_detail.html")]
pub struct NewsPage {
    pub layout: Layout,
    pub article: NewsWithAuthor,
    pub others: Vec<News>,
    pub events: Vec<Event>,
}

/// One cell of the events calendar strip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: String,
    pub day: u32,
    pub weekday: &'static str,
    pub is_weekend: bool,
    pub is_selected: bool,
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// `days` consecutive days starting at `start`
pub fn calendar_strip(start: NaiveDate, days: i64, selected: Option<NaiveDate>) -> Vec<CalendarDay> {
    (0..days.max(0))
        .map(|offset| start + Duration::days(offset))
        .map(|date| CalendarDay {
            date: date.format("%Y-%m-%d").to_string(),
            day: date.day(),
            weekday: weekday_name(date.weekday()),
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            is_selected: selected == Some(date),
        })
        .collect()
}

#[derive(Template)]
#[template(path = "events.html")]
pub struct EventsPage {
    pub layout: Layout,
    pub events: Vec<Event>,
    pub days: Vec<CalendarDay>,
    pub q: String,
    pub date: String,
    pub format: String,
    pub country: String,
    pub formats: Vec<String>,
    pub countries: Vec<String>,
    pub pagination: Pagination,
}

#[derive(Template)]
#[template(path = "event.html")]
pub struct EventPage {
    pub layout: Layout,
    pub event: Event,
    pub others: Vec<Event>,
}

#[derive(Template)]
#[template(path = "jobs.html")]
pub struct JobsPage {
    pub layout: Layout,
    pub jobs: Vec<JobWithCompany>,
    pub cities: Vec<String>,
    pub job_types: Vec<String>,
    pub companies: Vec<(String, String)>,
    pub q: String,
    pub city: String,
    pub job_type: String,
    pub company: String,
    pub pagination: Pagination,
}

#[derive(Template)]
#[template(path = "job.html")]
pub struct JobPage {
    pub layout: Layout,
    pub job: JobWithCompany,
    pub company: Option<Company>,
}

#[derive(Template)]
#[template(path = "podcasts.html")]
pub struct PodcastsPage {
    pub layout: Layout,
    pub podcasts: Vec<Podcast>,
    pub pagination: Pagination,
}

#[derive(Template)]
#[template(path = "analytics.html")]
pub struct AnalyticsPage {
    pub layout: Layout,
    pub years: Vec<i32>,
    pub year: i32,
    pub stats: Vec<CountryDealStats>,
    pub total_amount: f64,
    pub total_deals: i64,
    pub site: SiteAnalytics,
}

impl AnalyticsPage {
    pub fn is_year(&self, y: &i32) -> bool {
        *y == self.year
    }
}

/// About, privacy and terms share one template keyed by `page`
#[derive(Template)]
#[template(path = "info.html")]
pub struct InfoPage {
    pub layout: Layout,
    pub page: &'static str,
    pub title: &'static str,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub layout: Layout,
    pub status: u16,
    pub title: &'static str,
    pub message: &'static str,
}

impl ErrorPage {
    pub fn not_found() -> Self {
        Self {
            layout: Layout::anonymous(),
            status: 404,
            title: "Page not found",
            message: "The page you are looking for does not exist or was removed.",
        }
    }

    pub fn forbidden() -> Self {
        Self {
            layout: Layout::anonymous(),
            status: 403,
            title: "Forbidden",
            message: "Your form has expired. Go back, reload the page and try again.",
        }
    }

    pub fn internal() -> Self {
        Self {
            layout: Layout::anonymous(),
            status: 500,
            title: "Something went wrong",
            message: "We could not complete your request. Please try again later.",
        }
    }
}

pub struct SitemapUrl {
    pub loc: String,
    pub lastmod: Option<String>,
}

#[derive(Template)]
#[template(path = "sitemap.xml")]
pub struct Sitemap {
    pub urls: Vec<SitemapUrl>,
}

// ---------------------------------------------------------------------------
// Auth pages

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub layout: Layout,
    pub email: String,
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterPage {
    pub layout: Layout,
    pub form: RegisterForm,
    pub errors: Vec<String>,
    pub countries: Vec<Country>,
    pub roles: Vec<(&'static str, &'static str)>,
}

#[derive(Template)]
#[template(path = "forgot_password.html")]
pub struct ForgotPasswordPage {
    pub layout: Layout,
    pub sent: bool,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "reset_password.html")]
pub struct ResetPasswordPage {
    pub layout: Layout,
    pub token: String,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Dashboard

/// Banner shown after a dashboard redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub is_error: bool,
    pub text: &'static str,
}

impl Flash {
    /// Map `?error=` / `?success=` codes to messages; unknown codes are ignored
    pub fn from_codes(error: Option<&str>, success: Option<&str>) -> Option<Self> {
        if let Some(text) = error.and_then(error_text) {
            return Some(Self {
                is_error: true,
                text,
            });
        }
        success.and_then(success_text).map(|text| Self {
            is_error: false,
            text,
        })
    }
}

fn error_text(code: &str) -> Option<&'static str> {
    Some(match code {
        "invalid_current_password" => "Current password is incorrect.",
        "passwords_dont_match" => "New passwords do not match.",
        "password_too_short" => "New password must be at least 6 characters.",
        "invalid_phone" => "Phone must look like +77011234567.",
        "email_taken" => "That email is already registered.",
        "already_has_company" => "You already have a company.",
        "already_has_investor" => "You already have an investor profile.",
        "no_company" => "Create a company first.",
        "no_investor" => "Create an investor profile first.",
        "name_required" => "Name is required.",
        "country_required" => "Country is required.",
        "city_required" => "City is required.",
        "invalid_amount" => "Amount must be a number.",
        "not_found" => "That record no longer exists.",
        "invalid_input" => "Some fields were invalid.",
        _ => return None,
    })
}

fn success_text(code: &str) -> Option<&'static str> {
    Some(match code {
        "password_changed" => "Password changed.",
        "profile_updated" => "Profile updated.",
        "company_created" => "Company created.",
        "company_updated" => "Company updated.",
        "investor_created" => "Investor profile created.",
        "investor_updated" => "Investor profile updated.",
        "team_updated" => "Team updated.",
        "deal_added" => "Deal added.",
        "deal_deleted" => "Deal removed.",
        "pitch_added" => "Pitch added.",
        "pitch_deleted" => "Pitch removed.",
        "portfolio_updated" => "Portfolio updated.",
        _ => return None,
    })
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardPage {
    pub layout: Layout,
    pub user: User,
    pub flash: Option<Flash>,
    pub countries: Vec<Country>,
    pub company: Option<Company>,
    pub team: Vec<Person>,
    pub deals: Vec<DealWithCompany>,
    pub pitches: Vec<Pitch>,
    pub currencies: Vec<Currency>,
    pub investor: Option<Investor>,
    pub portfolio: Vec<Company>,
    pub company_options: Vec<(String, String)>,
    pub notifications: Vec<Notification>,
    pub unread: i64,
}

#[derive(Template)]
#[template(path = "create_company.html")]
pub struct CreateCompanyPage {
    pub layout: Layout,
    pub form: CompanyForm,
    pub errors: Vec<String>,
    pub countries: Vec<Country>,
    pub stages: Vec<String>,
    pub categories: Vec<String>,
}

#[derive(Template)]
#[template(path = "create_investor.html")]
pub struct CreateInvestorPage {
    pub layout: Layout,
    pub form: InvestorForm,
    pub errors: Vec<String>,
    pub countries: Vec<Country>,
    pub types: Vec<&'static str>,
}

#[derive(Template)]
#[template(path = "notifications.html")]
pub struct NotificationsPage {
    pub layout: Layout,
    pub notifications: Vec<Notification>,
    pub unread: i64,
}

// ---------------------------------------------------------------------------
// Admin

/// One row of a generic admin table
#[derive(Debug, Clone)]
pub struct AdminRow {
    pub id: String,
    pub cells: Vec<String>,
}

/// Input rendered by the generic admin form
#[derive(Debug, Clone)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    /// text, email, url, number, date, datetime-local, password, textarea, select,
    /// checkbox or readonly
    pub kind: &'static str,
    pub value: String,
    pub options: Vec<(String, String)>,
    pub required: bool,
}

impl FormField {
    pub fn new(name: &'static str, label: &'static str, kind: &'static str) -> Self {
        Self {
            name,
            label,
            kind,
            value: String::new(),
            options: Vec::new(),
            required: false,
        }
    }

    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, "text")
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn value_opt<T: ToString>(mut self, value: &Option<T>) -> Self {
        self.value = value.as_ref().map(ToString::to_string).unwrap_or_default();
        self
    }

    /// Select over (value, label) pairs; an empty choice comes first unless required
    pub fn options(mut self, options: Vec<(String, String)>) -> Self {
        self.kind = "select";
        self.options = options;
        self
    }

    pub fn is_checked(&self) -> bool {
        matches!(self.value.as_str(), "on" | "true" | "1")
    }
}

/// Select options where value and label are the same string
pub fn same_options<I, S>(values: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .map(|v| {
            let v = v.into();
            (v.clone(), v)
        })
        .collect()
}

/// Child records edited from a parent's admin form, e.g. a company's team
#[derive(Debug, Clone)]
pub struct RelatedSection {
    pub title: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<RelatedRow>,
    /// Form posting a new child; empty when adding is not offered
    pub add_action: String,
    pub add_fields: Vec<FormField>,
}

#[derive(Debug, Clone)]
pub struct RelatedRow {
    pub cells: Vec<String>,
    pub delete_url: String,
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
pub struct AdminDashboardPage {
    pub layout: Layout,
    pub counts: Vec<(String, i64)>,
    pub roles: Vec<(String, i64)>,
    pub cache: CacheStats,
    pub sections: Vec<(&'static str, &'static str)>,
}

#[derive(Template)]
#[template(path = "admin/list.html")]
pub struct AdminListPage {
    pub layout: Layout,
    pub section: &'static str,
    pub title: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<AdminRow>,
    pub q: String,
    pub status: String,
    pub statuses: Vec<&'static str>,
    pub can_create: bool,
    pub pagination: Pagination,
}

#[derive(Template)]
#[template(path = "admin/form.html")]
pub struct AdminFormPage {
    pub layout: Layout,
    pub section: &'static str,
    pub title: String,
    pub action: String,
    pub fields: Vec<FormField>,
    pub errors: Vec<String>,
    pub related: Vec<RelatedSection>,
    /// (label, url) links shown under the form
    pub links: Vec<(String, String)>,
    /// Delete button target; empty on create
    pub delete_url: String,
}

#[derive(Template)]
#[template(path = "admin/email_preview.html")]
pub struct EmailPreviewPage {
    pub layout: Layout,
    pub template: EmailTemplate,
    pub rendered: String,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_strip_flags_weekends() {
        // 2024-03-01 was a Friday
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
        let selected = NaiveDate::from_ymd_opt(2024, 3, 3);
        let days = calendar_strip(start, 30, selected);

        assert_eq!(days.len(), 30);
        assert_eq!(days[0].date, "2024-03-01");
        assert_eq!(days[0].weekday, "Fri");
        assert!(!days[0].is_weekend);
        assert!(days[1].is_weekend && days[2].is_weekend);
        assert!(days[2].is_selected);
        assert_eq!(days.iter().filter(|d| d.is_selected).count(), 1);
        assert_eq!(days[29].date, "2024-03-30");
    }

    #[test]
    fn test_money_filter() {
        assert_eq!(filters::group_thousands(0.0), "0");
        assert_eq!(filters::group_thousands(999.0), "999");
        assert_eq!(filters::group_thousands(1_250_000.4), "1,250,000");
        assert_eq!(filters::group_thousands(-12_345.0), "-12,345");
        assert_eq!(filters::money(&None).expect("filter"), "-");
    }

    #[test]
    fn test_flash_codes() {
        let flash = Flash::from_codes(Some("password_too_short"), Some("password_changed"));
        assert_eq!(
            flash,
            Some(Flash {
                is_error: true,
                text: "New password must be at least 6 characters."
            })
        );
        assert!(Flash::from_codes(Some("bogus"), None).is_none());
        assert!(!Flash::from_codes(None, Some("profile_updated"))
            .expect("flash")
            .is_error);
    }

    #[test]
    fn test_error_page_renders() {
        let html = ErrorPage::not_found().render().expect("render");
        assert!(html.contains("Page not found"));
        assert!(html.contains("404"));
    }
}
