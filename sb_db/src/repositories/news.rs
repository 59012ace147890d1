//! ABOUTME: News repository with slug generation and view counting
//! ABOUTME: Slugs are transliterated from titles and made unique with numeric suffixes

use super::{escape_like, like_pattern, non_blank, write_error, PageRequest};
use sb_core::{slugify, time::today, unique_slug, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, instrument};

pub const MAX_NEWS_CONTENT_LEN: usize = 5000;

pub(crate) const NEWS_COLUMNS: &str = "id, title, slug, summary, content, date, views, status, author_id";

const JOINED_SELECT: &str = r#"
    SELECT n.id, n.title, n.slug, n.summary, n.content, n.date, n.views, n.status,
           n.author_id, a.name AS author_name
    FROM news n
    LEFT JOIN authors a ON a.id = n.author_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct News {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub date: String,
    pub views: i64,
    pub status: String,
    pub author_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct NewsWithAuthor {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub date: String,
    pub views: i64,
    pub status: String,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
}

/// Create and full-replace payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNewsRequest {
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    /// Defaults to today
    pub date: Option<String>,
    pub status: Option<String>,
    pub author_id: Option<String>,
}

impl CreateNewsRequest {
    fn validate(&self) -> Result<String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::Validation("News title is required".to_string()));
        }
        if let Some(content) = &self.content {
            if content.chars().count() > MAX_NEWS_CONTENT_LEN {
                return Err(Error::Validation(format!(
                    "News content must be at most {} characters",
                    MAX_NEWS_CONTENT_LEN
                )));
            }
        }
        Ok(title.to_string())
    }
}

pub struct NewsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NewsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateNewsRequest) -> Result<News> {
        let title = request.validate()?;
        let id = Id::new().to_string();
        let slug = self.free_slug(&title, &id).await?;
        debug!("Creating news {} with slug {}", id, slug);

        sqlx::query_as::<_, News>(&format!(
            "INSERT INTO news (id, title, slug, summary, content, date, views, status, author_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8) RETURNING {}",
            NEWS_COLUMNS
        ))
        .bind(&id)
        .bind(title)
        .bind(slug)
        .bind(request.summary)
        .bind(request.content)
        .bind(
            non_blank(&request.date).unwrap_or_else(|| today().format("%Y-%m-%d").to_string()),
        )
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .bind(request.author_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create news", e))
    }

    /// First unused slug for `title`, ignoring the row `own_id`
    async fn free_slug(&self, title: &str, own_id: &str) -> Result<String> {
        let mut base = slugify(title);
        if base.is_empty() {
            base = "news".to_string();
        }

        let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM news WHERE (slug = ?1 OR slug LIKE ?2 ESCAPE '\\') AND id != ?3",
        )
        .bind(&base)
        .bind(format!("{}-%", escape_like(&base)))
        .bind(own_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to check news slugs: {}", e)))?
        .into_iter()
        .collect();

        Ok(unique_slug(&base, |candidate| taken.contains(candidate)))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<NewsWithAuthor>> {
        sqlx::query_as::<_, NewsWithAuthor>(&format!("{} WHERE n.id = ?1", JOINED_SELECT))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find news by id: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<NewsWithAuthor>> {
        sqlx::query_as::<_, NewsWithAuthor>(&format!("{} WHERE n.slug = ?1", JOINED_SELECT))
            .bind(slug)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find news by slug: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn increment_views(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE news SET views = views + 1 WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to increment news views: {}", e)))?;
        Ok(())
    }

    /// Filtered page, newest first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<Vec<NewsWithAuthor>> {
        let mut qb = QueryBuilder::<Sqlite>::new(JOINED_SELECT);
        qb.push(" WHERE 1=1");
        push_filters(&mut qb, q, status, "n.");
        qb.push(" ORDER BY n.date DESC, n.id DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        qb.build_query_as::<NewsWithAuthor>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list news: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>, status: &Option<String>) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM news WHERE 1=1");
        push_filters(&mut qb, q, status, "");
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count news: {}", e)))
    }

    /// Other active articles, newest first
    #[instrument(skip(self))]
    pub async fn others(&self, exclude_id: &str, limit: i64) -> Result<Vec<News>> {
        sqlx::query_as::<_, News>(&format!(
            "SELECT {} FROM news WHERE id != ?1 AND status = 'active' \
             ORDER BY date DESC, id DESC LIMIT ?2",
            NEWS_COLUMNS
        ))
        .bind(exclude_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list other news: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn latest(&self, limit: i64) -> Result<Vec<News>> {
        sqlx::query_as::<_, News>(&format!(
            "SELECT {} FROM news WHERE status = 'active' ORDER BY date DESC, id DESC LIMIT ?1",
            NEWS_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list latest news: {}", e)))
    }

    /// Replace an article; the slug is regenerated when the title changes
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: CreateNewsRequest) -> Result<News> {
        let title = request.validate()?;

        let current = sqlx::query_as::<_, News>(&format!(
            "SELECT {} FROM news WHERE id = ?1",
            NEWS_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find news by id: {}", e)))?
        .ok_or_else(|| Error::NotFound("News not found".to_string()))?;

        let slug = if current.title == title {
            current.slug
        } else {
            self.free_slug(&title, id).await?
        };

        sqlx::query_as::<_, News>(&format!(
            "UPDATE news SET title = ?1, slug = ?2, summary = ?3, content = ?4, date = ?5, \
             status = ?6, author_id = ?7 WHERE id = ?8 RETURNING {}",
            NEWS_COLUMNS
        ))
        .bind(title)
        .bind(slug)
        .bind(request.summary)
        .bind(request.content)
        .bind(non_blank(&request.date).unwrap_or(current.date))
        .bind(request.status.unwrap_or(current.status))
        .bind(request.author_id)
        .bind(id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("update news", e))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM news WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete news: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    q: &Option<String>,
    status: &Option<String>,
    alias: &str,
) {
    if let Some(q) = non_blank(q) {
        let pattern = like_pattern(&q);
        qb.push(format!(" AND ({}title LIKE ", alias))
            .push_bind(pattern.clone())
            .push(format!(" ESCAPE '\\' OR {}summary LIKE ", alias))
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(status) = non_blank(status) {
        qb.push(format!(" AND {}status = ", alias)).push_bind(status);
    }
}
