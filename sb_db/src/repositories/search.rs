//! ABOUTME: Site-wide search over companies, investors, news and jobs
//! ABOUTME: Case-insensitive substring match across each entity's text columns

use super::{
    companies::{Company, COMPANY_COLUMNS},
    investors::{Investor, INVESTOR_COLUMNS},
    jobs::{JobWithCompany, JOINED_SELECT as JOB_SELECT},
    like_pattern,
    news::{News, NEWS_COLUMNS},
};
use sb_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

/// Per-group cap
pub const SEARCH_GROUP_LIMIT: i64 = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub companies: Vec<Company>,
    pub investors: Vec<Investor>,
    pub news: Vec<News>,
    pub jobs: Vec<JobWithCompany>,
    pub total: usize,
}

pub struct SearchRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SearchRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Active records only; a blank query yields empty results
    #[instrument(skip(self))]
    pub async fn search_all(&self, q: &str) -> Result<SearchResults> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(SearchResults::default());
        }
        let pattern = like_pattern(q);

        let companies = self
            .matching::<Company>(
                &format!("SELECT {} FROM companies WHERE status = 'active'", COMPANY_COLUMNS),
                &["name", "description", "industry", "country", "city", "stage"],
                &pattern,
                "created_at DESC, id DESC",
            )
            .await?;
        let investors = self
            .matching::<Investor>(
                &format!("SELECT {} FROM investors WHERE status = 'active'", INVESTOR_COLUMNS),
                &["name", "description", "focus", "country", "stages"],
                &pattern,
                "created_at DESC, id DESC",
            )
            .await?;
        let news = self
            .matching::<News>(
                &format!("SELECT {} FROM news WHERE status = 'active'", NEWS_COLUMNS),
                &["title", "summary", "content"],
                &pattern,
                "date DESC, id DESC",
            )
            .await?;
        let jobs = self
            .matching::<JobWithCompany>(
                &format!("{} WHERE j.status = 'active'", JOB_SELECT),
                &["j.title", "j.description", "j.city", "j.job_type", "j.contact"],
                &pattern,
                "j.created_at DESC, j.id DESC",
            )
            .await?;

        let total = companies.len() + investors.len() + news.len() + jobs.len();
        debug!(total, "Search finished");

        Ok(SearchResults {
            query: q.to_string(),
            companies,
            investors,
            news,
            jobs,
            total,
        })
    }

    async fn matching<T>(
        &self,
        select: &str,
        columns: &[&str],
        pattern: &str,
        order: &str,
    ) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(select);
        qb.push(" AND (");
        let mut any = qb.separated(" OR ");
        for column in columns {
            any.push(format!("{} LIKE ", column))
                .push_bind_unseparated(pattern.to_string())
                .push_unseparated(" ESCAPE '\\'");
        }
        qb.push(") ORDER BY ")
            .push(order)
            .push(" LIMIT ")
            .push_bind(SEARCH_GROUP_LIMIT);

        qb.build_query_as::<T>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search: {}", e)))
    }
}
