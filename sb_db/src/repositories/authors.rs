//! ABOUTME: News author repository
//! ABOUTME: Deleting an author leaves their articles unattributed

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::instrument;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorRequest {
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub status: Option<String>,
}

pub struct AuthorRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuthorRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: AuthorRequest) -> Result<Author> {
        let name = required_name(&request)?;
        sqlx::query_as::<_, Author>(
            "INSERT INTO authors (id, name, description, website, status) \
             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id, name, description, website, status",
        )
        .bind(Id::new().to_string())
        .bind(name)
        .bind(request.description)
        .bind(request.website)
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create author", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Author>> {
        sqlx::query_as::<_, Author>(
            "SELECT id, name, description, website, status FROM authors WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find author: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, q: &Option<String>, page: PageRequest) -> Result<Vec<Author>> {
        sqlx::query_as::<_, Author>(
            "SELECT id, name, description, website, status FROM authors \
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name COLLATE NOCASE LIMIT ?2 OFFSET ?3",
        )
        .bind(like_pattern(&non_blank(q).unwrap_or_default()))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list authors: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM authors WHERE name LIKE ?1 ESCAPE '\\'")
            .bind(like_pattern(&non_blank(q).unwrap_or_default()))
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count authors: {}", e)))
    }

    /// Every author as (id, name)
    #[instrument(skip(self))]
    pub async fn options(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT id, name FROM authors ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list author options: {}", e)))
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: AuthorRequest) -> Result<Author> {
        let name = required_name(&request)?;
        sqlx::query_as::<_, Author>(
            "UPDATE authors SET name = ?1, description = ?2, website = ?3, \
             status = COALESCE(?4, status) WHERE id = ?5 \
             RETURNING id, name, description, website, status",
        )
        .bind(name)
        .bind(request.description)
        .bind(request.website)
        .bind(request.status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update author", e))?
        .ok_or_else(|| Error::NotFound("Author not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM authors WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete author: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn required_name(request: &AuthorRequest) -> Result<String> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Author name is required".to_string()));
    }
    Ok(name.to_string())
}
