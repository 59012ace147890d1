//! ABOUTME: Database layer with SQLite, migrations, repositories, and the file cache
//! ABOUTME: Handles all data persistence and cached read queries

use sb_core::{Error, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::{collections::BTreeMap, str::FromStr, time::Duration};
use tracing::{debug, info, instrument};

/// Tables counted on the admin dashboard.
///
/// Table names cannot be bound as parameters, so `COUNT(*)` is only ever
/// formatted with names from this list.
const COUNTED_TABLES: &[&str] = &[
    "users",
    "companies",
    "investors",
    "people",
    "deals",
    "portfolio_entries",
    "jobs",
    "news",
    "events",
    "podcasts",
    "authors",
    "countries",
    "cities",
    "categories",
    "company_stages",
    "currencies",
    "comments",
    "feedback",
    "email_templates",
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True for tables the dashboard may count
pub fn is_valid_table_name(table: &str) -> bool {
    COUNTED_TABLES.contains(&table) && is_plain_identifier(table)
}

fn db_error(action: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |e| Error::Database(format!("Failed to {}: {}", action, e))
}

/// Handle to the SQLite pool; cheap to clone
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open with the default pool size and migrate
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::connect(db_path, 10).await
    }

    /// Open (creating the file if missing) and bring the schema up to date
    #[instrument(skip(db_path))]
    pub async fn connect(db_path: &str, pool_size: u32) -> Result<Self> {
        info!(path = %db_path, pool_size, "Opening database");

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))
            .map_err(db_error("parse database path"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("temp_store", "memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size.max(1))
            .min_connections(1)
            .connect_with(options)
            .await
            .map_err(db_error("open database"))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply pending migrations from `migrations/`
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;
        debug!("Schema is current");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("ping database"))?;
        Ok(())
    }

    /// Row counts for the admin dashboard
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let mut table_counts = BTreeMap::new();

        for table in COUNTED_TABLES.iter().copied().filter(|t| is_valid_table_name(t)) {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to count {}: {}", table, e)))?;
            table_counts.insert(table.to_string(), count);
        }

        Ok(DatabaseStats { table_counts })
    }
}

/// Rows per table, keyed by table name
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DatabaseStats {
    pub table_counts: BTreeMap<String, i64>,
}

impl DatabaseStats {
    pub fn count(&self, table: &str) -> i64 {
        self.table_counts.get(table).copied().unwrap_or(0)
    }
}

pub mod cache;
pub mod metrics;
pub mod repositories;

pub use cache::{
    cache_key, CacheInvalidator, CacheStats, CachedQueries, CompanyFilters, CompanyPage,
    FileCache, InvestorFilters, InvestorPage, SiteAnalytics,
};
pub use metrics::CacheMetrics;
pub use repositories::{
    authors::{Author, AuthorRepository, AuthorRequest},
    comments::{
        Comment, CommentIssue, CommentRepository, CommentThread, CommentValidator,
        CreateCommentRequest, COMMENT_ENTITY_TYPES,
    },
    companies::{
        Company, CompanyFilter, CompanyRepository, CreateCompanyRequest, FilterOptions,
        UpdateCompanyRequest,
    },
    deals::{
        CountryDealStats, CreateDealRequest, Deal, DealRepository, DealWithCompany,
        UNKNOWN_COUNTRY,
    },
    email_templates::{
        EmailTemplate, EmailTemplateRepository, EmailTemplateRequest, PASSWORD_RESET_TEMPLATE,
        WELCOME_TEMPLATE,
    },
    events::{CreateEventRequest, Event, EventFilter, EventRepository},
    feedback::{
        normalize_feedback_type, CreateFeedbackRequest, Feedback, FeedbackRepository, FEEDBACK_STATUSES,
        FEEDBACK_TYPES,
    },
    investors::{
        CreateInvestorRequest, Investor, InvestorFilter, InvestorFilterOptions,
        InvestorRepository, UpdateInvestorRequest, INVESTOR_TYPES,
    },
    jobs::{CreateJobRequest, Job, JobFilter, JobRepository, JobWithCompany},
    news::{CreateNewsRequest, News, NewsRepository, NewsWithAuthor, MAX_NEWS_CONTENT_LEN},
    notifications::{
        CreateNotificationRequest, Notification, NotificationKind, NotificationRepository,
        NotificationTemplate,
    },
    password_resets::PasswordResetRepository,
    people::{Person, PersonRepository, PersonRequest},
    pitches::{Pitch, PitchRepository},
    podcasts::{Podcast, PodcastRepository, PodcastRequest},
    portfolio::{
        CreatePortfolioEntryRequest, PortfolioEntry, PortfolioEntryView, PortfolioRepository,
    },
    reference::{
        Category, City, CityView, CompanyStage, Country, Currency, NamedEntry, NamedTable,
        ReferenceRepository,
    },
    search::{SearchRepository, SearchResults},
    users::{CreateUserRequest, Role, UpdateProfileRequest, User, UserFilter, UserRepository},
    AutocompleteItem, PageRequest,
};

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    /// Fresh database file under the system temp dir
    pub async fn create_test_db() -> Db {
        let path = std::env::temp_dir().join(test_support::unique_db_name("db"));
        Db::new(&path.to_string_lossy())
            .await
            .expect("Failed to create test database")
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::create_test_db;
    use super::*;

    #[tokio::test]
    async fn test_fresh_database_is_empty_and_healthy() {
        let db = create_test_db().await;
        db.health_check().await.expect("ping");

        let stats = db.stats().await.expect("stats");
        assert_eq!(stats.count("users"), 0);
        assert_eq!(stats.count("companies"), 0);
        assert_eq!(stats.count("no_such_table"), 0);
    }

    #[tokio::test]
    async fn test_migrate_twice_and_count_every_table() {
        let db = create_test_db().await;
        db.migrate().await.expect("second migrate");

        let stats = db.stats().await.expect("stats");
        assert_eq!(stats.table_counts.len(), COUNTED_TABLES.len());
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let db = create_test_db().await;
        let orphan = sqlx::query(
            "INSERT INTO cities (id, name, country_id, status) VALUES ('c1', 'Nowhere', 'missing', 'active')",
        )
        .execute(db.pool())
        .await;
        assert!(orphan.is_err());
    }

    #[test]
    fn test_only_listed_plain_names_are_countable() {
        assert!(is_plain_identifier("company_stages"));
        assert!(is_plain_identifier("_x1"));
        assert!(!is_plain_identifier("1users"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("users; DROP TABLE users"));

        assert!(is_valid_table_name("portfolio_entries"));
        assert!(!is_valid_table_name("password_resets"));
        assert!(!is_valid_table_name("sqlite_master"));
    }
}
