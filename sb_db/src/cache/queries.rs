//! ABOUTME: Read queries wrapped in the file cache with per-query TTLs
//! ABOUTME: The invalidator clears the prefixes a write can make stale

use super::file::{cache_key, FileCache};
use crate::repositories::{
    companies::{Company, CompanyFilter, CompanyRepository},
    deals::UNKNOWN_COUNTRY,
    investors::{Investor, InvestorFilter, InvestorRepository},
    news::{News, NewsRepository},
    PageRequest,
};
use sb_core::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};

pub const COMPANIES_PREFIX: &str = "query_companies";
pub const INVESTORS_PREFIX: &str = "query_investors";
pub const NEWS_PREFIX: &str = "query_news";
pub const ANALYTICS_PREFIX: &str = "query_analytics";

const LISTING_TTL: Duration = Duration::from_secs(600);
const NEWS_TTL: Duration = Duration::from_secs(300);
const ANALYTICS_TTL: Duration = Duration::from_secs(1800);

/// Bucket for companies with no stage recorded
pub const UNSPECIFIED: &str = "Not specified";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompanyFilters {
    pub country: Option<String>,
    pub stage: Option<String>,
    pub industry: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvestorFilters {
    pub country: Option<String>,
    /// Substring of the focus list
    pub focus: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyPage {
    pub companies: Vec<Company>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvestorPage {
    pub investors: Vec<Investor>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Site-wide totals plus the company breakdowns shown on the analytics page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SiteAnalytics {
    pub total_companies: i64,
    pub total_investors: i64,
    pub total_deals: i64,
    pub total_jobs: i64,
    pub total_news: i64,
    pub total_events: i64,
    pub total_users: i64,
    pub companies_by_country: BTreeMap<String, i64>,
    pub companies_by_stage: BTreeMap<String, i64>,
}

fn opt(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or("").to_string()
}

#[derive(Clone)]
pub struct CachedQueries {
    pool: SqlitePool,
    cache: FileCache,
}

impl CachedQueries {
    pub fn new(pool: SqlitePool, cache: FileCache) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Serve `key` from the cache, or compute, store and return it
    async fn cached<T, F, Fut>(&self, key: String, ttl: Duration, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key).await {
            return Ok(hit);
        }
        let fresh = load().await?;
        if !self.cache.set(&key, &fresh, Some(ttl)).await {
            debug!("Result for {} was not cached", key);
        }
        Ok(fresh)
    }

    /// Active companies ordered by name
    #[instrument(skip(self))]
    pub async fn companies(
        &self,
        filters: &CompanyFilters,
        limit: i64,
        offset: i64,
    ) -> Result<CompanyPage> {
        let key = cache_key(
            COMPANIES_PREFIX,
            &[],
            &[
                ("country", opt(&filters.country)),
                ("stage", opt(&filters.stage)),
                ("industry", opt(&filters.industry)),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        );

        let pool = &self.pool;
        self.cached(key, LISTING_TTL, move || async move {
            let repo = CompanyRepository::new(pool);
            let filter = CompanyFilter {
                country: filters.country.clone(),
                stage: filters.stage.clone(),
                industry: filters.industry.clone(),
                ..CompanyFilter::active()
            };
            let page = PageRequest::new(limit, offset);
            Ok(CompanyPage {
                companies: repo.search(&filter, page).await?,
                total: repo.count(&filter).await?,
                limit: page.limit,
                offset: page.offset,
            })
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn investors(
        &self,
        filters: &InvestorFilters,
        limit: i64,
        offset: i64,
    ) -> Result<InvestorPage> {
        let key = cache_key(
            INVESTORS_PREFIX,
            &[],
            &[
                ("country", opt(&filters.country)),
                ("focus", opt(&filters.focus)),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        );

        let pool = &self.pool;
        self.cached(key, LISTING_TTL, move || async move {
            let repo = InvestorRepository::new(pool);
            let filter = InvestorFilter {
                country: filters.country.clone(),
                focus: filters.focus.clone(),
                ..InvestorFilter::active()
            };
            let page = PageRequest::new(limit, offset);
            Ok(InvestorPage {
                investors: repo.search(&filter, page).await?,
                total: repo.count(&filter).await?,
                limit: page.limit,
                offset: page.offset,
            })
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn latest_news(&self, limit: i64) -> Result<Vec<News>> {
        let key = cache_key(NEWS_PREFIX, &[limit.to_string()], &[]);
        let pool = &self.pool;
        self.cached(key, NEWS_TTL, move || async move {
            NewsRepository::new(pool).latest(limit).await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn analytics(&self) -> Result<SiteAnalytics> {
        let key = cache_key(ANALYTICS_PREFIX, &[], &[]);
        self.cached(key, ANALYTICS_TTL, move || self.load_analytics()).await
    }

    async fn load_analytics(&self) -> Result<SiteAnalytics> {
        let active = |table: &str| format!("SELECT COUNT(*) FROM {} WHERE status = 'active'", table);

        let mut analytics = SiteAnalytics {
            total_companies: self.scalar(&active("companies")).await?,
            total_investors: self.scalar(&active("investors")).await?,
            total_deals: self.scalar(&active("deals")).await?,
            total_jobs: self.scalar(&active("jobs")).await?,
            total_news: self.scalar(&active("news")).await?,
            total_events: self.scalar(&active("events")).await?,
            total_users: self.scalar(&active("users")).await?,
            ..Default::default()
        };

        analytics.companies_by_country = self.company_buckets("country", UNKNOWN_COUNTRY).await?;
        analytics.companies_by_stage = self.company_buckets("stage", UNSPECIFIED).await?;
        Ok(analytics)
    }

    async fn scalar(&self, sql: &str) -> Result<i64> {
        sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to load analytics: {}", e)))
    }

    /// Active companies grouped by `column`; blank values are counted under `blank_label`
    async fn company_buckets(
        &self,
        column: &'static str,
        blank_label: &str,
    ) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(&format!(
            "SELECT NULLIF(TRIM({0}), ''), COUNT(*) FROM companies \
             WHERE status = 'active' GROUP BY NULLIF(TRIM({0}), '')",
            column
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to group companies: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(value, count)| (value.unwrap_or_else(|| blank_label.to_string()), count))
            .collect())
    }
}

/// Clears cached queries after writes
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: FileCache,
}

impl CacheInvalidator {
    pub fn new(cache: FileCache) -> Self {
        Self { cache }
    }

    pub async fn companies(&self) -> usize {
        self.cache.clear(Some(COMPANIES_PREFIX)).await
            + self.cache.clear(Some(ANALYTICS_PREFIX)).await
    }

    pub async fn investors(&self) -> usize {
        self.cache.clear(Some(INVESTORS_PREFIX)).await
            + self.cache.clear(Some(ANALYTICS_PREFIX)).await
    }

    pub async fn news(&self) -> usize {
        self.cache.clear(Some(NEWS_PREFIX)).await
    }

    pub async fn all(&self) -> usize {
        self.cache.clear(None).await
    }

    /// Invalidate by name: `companies`, `investors`, `news` or `all`
    pub async fn invalidate(&self, kind: &str) -> Result<usize> {
        match kind {
            "companies" => Ok(self.companies().await),
            "investors" => Ok(self.investors().await),
            "news" => Ok(self.news().await),
            "all" => Ok(self.all().await),
            other => Err(Error::Validation(format!("Unknown cache kind: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::companies::tests::company;
    use crate::test_helpers::create_test_db;
    use tempfile::TempDir;

    async fn setup() -> (crate::Db, CachedQueries, CacheInvalidator, TempDir) {
        let db = create_test_db().await;
        let dir = TempDir::new().expect("tempdir");
        let cache = FileCache::new(dir.path(), Duration::from_secs(60), 16).expect("cache");
        let queries = CachedQueries::new(db.pool().clone(), cache.clone());
        (db, queries, CacheInvalidator::new(cache), dir)
    }

    #[tokio::test]
    async fn test_companies_served_from_cache_until_invalidated() {
        let (db, queries, invalidator, _dir) = setup().await;
        let repo = CompanyRepository::new(db.pool());
        repo.create(company("Alpha", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");

        let filters = CompanyFilters {
            country: Some("Kazakhstan".to_string()),
            ..Default::default()
        };
        let first = queries.companies(&filters, 20, 0).await.expect("query");
        assert_eq!(first.total, 1);

        repo.create(company("Beta", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let stale = queries.companies(&filters, 20, 0).await.expect("query");
        assert_eq!(stale.total, 1);

        assert_eq!(invalidator.companies().await, 1);
        let fresh = queries.companies(&filters, 20, 0).await.expect("query");
        assert_eq!(fresh.total, 2);
        assert_eq!(fresh.companies[0].name, "Alpha");
    }

    #[tokio::test]
    async fn test_analytics_buckets_and_unknown_kind() {
        let (db, queries, invalidator, _dir) = setup().await;
        let repo = CompanyRepository::new(db.pool());
        repo.create(company("Alpha", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        repo.create(company("Beta", " ", "Series A", "Agro"))
            .await
            .expect("company");
        repo.create(company("Gamma", "Uzbekistan", "", "Edtech"))
            .await
            .expect("company");

        let stats = queries.analytics().await.expect("analytics");
        assert_eq!(stats.total_companies, 3);
        assert_eq!(stats.companies_by_country.get("Kazakhstan"), Some(&1));
        assert_eq!(stats.companies_by_country.get(UNKNOWN_COUNTRY), Some(&1));
        assert_eq!(stats.companies_by_stage.get("Series A"), Some(&1));
        assert_eq!(stats.companies_by_stage.get(UNSPECIFIED), Some(&1));
        assert_eq!(stats.companies_by_stage.get(UNKNOWN_COUNTRY), None);

        assert!(matches!(
            invalidator.invalidate("podcasts").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(invalidator.invalidate("all").await.expect("all"), 1);
    }
}
