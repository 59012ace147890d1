//! ABOUTME: Pitch deck links attached to a company
//! ABOUTME: Deletion is always scoped to the owning company

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::instrument;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Pitch {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub url: String,
    pub status: String,
    pub created_at: String,
}

pub struct PitchRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PitchRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, company_id: &str, name: &str, url: &str) -> Result<Pitch> {
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(Error::Validation("Pitch name and URL are required".to_string()));
        }

        sqlx::query_as::<_, Pitch>(
            "INSERT INTO pitches (id, company_id, name, url, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, 'active', ?5) \
             RETURNING id, company_id, name, url, status, created_at",
        )
        .bind(Id::new().to_string())
        .bind(company_id)
        .bind(name)
        .bind(url)
        .bind(now_iso8601())
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create pitch", e))
    }

    #[instrument(skip(self))]
    pub async fn list_by_company(&self, company_id: &str) -> Result<Vec<Pitch>> {
        sqlx::query_as::<_, Pitch>(
            "SELECT id, company_id, name, url, status, created_at FROM pitches \
             WHERE company_id = ?1 ORDER BY created_at DESC",
        )
        .bind(company_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list pitches: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Pitch>> {
        sqlx::query_as::<_, Pitch>(
            "SELECT id, company_id, name, url, status, created_at FROM pitches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find pitch: {}", e)))
    }

    /// Admin list over every company, newest first
    #[instrument(skip(self))]
    pub async fn list(&self, q: &Option<String>, page: PageRequest) -> Result<Vec<Pitch>> {
        sqlx::query_as::<_, Pitch>(
            "SELECT id, company_id, name, url, status, created_at FROM pitches \
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(like_pattern(&non_blank(q).unwrap_or_default()))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list pitches: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM pitches WHERE name LIKE ?1 ESCAPE '\\'")
            .bind(like_pattern(&non_blank(q).unwrap_or_default()))
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count pitches: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn update(&self, id: &str, name: &str, url: &str, status: &str) -> Result<Pitch> {
        sqlx::query_as::<_, Pitch>(
            "UPDATE pitches SET name = ?1, url = ?2, status = ?3 WHERE id = ?4 \
             RETURNING id, company_id, name, url, status, created_at",
        )
        .bind(name.trim())
        .bind(url.trim())
        .bind(status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update pitch", e))?
        .ok_or_else(|| Error::NotFound("Pitch not found".to_string()))
    }

    /// Admin delete without company scoping
    #[instrument(skip(self))]
    pub async fn delete_any(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pitches WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete pitch: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, company_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pitches WHERE id = ?1 AND company_id = ?2")
            .bind(id)
            .bind(company_id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete pitch: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::companies::{tests::company, CompanyRepository};
    use crate::test_helpers::create_test_db;

    #[tokio::test]
    async fn test_pitch_lifecycle_is_company_scoped() {
        let db = create_test_db().await;
        let companies = CompanyRepository::new(db.pool());
        let mine = companies
            .create(company("Mine", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let other = companies
            .create(company("Other", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let repo = PitchRepository::new(db.pool());

        assert!(matches!(
            repo.create(&mine.id, "Deck", " ").await,
            Err(Error::Validation(_))
        ));

        let pitch = repo
            .create(&mine.id, "Seed deck", "https://example.com/deck.pdf")
            .await
            .expect("create");
        assert_eq!(repo.list_by_company(&mine.id).await.expect("list").len(), 1);
        assert!(repo.list_by_company(&other.id).await.expect("list").is_empty());

        assert!(!repo.delete(&pitch.id, &other.id).await.expect("delete"));
        assert!(repo.delete(&pitch.id, &mine.id).await.expect("delete"));
    }
}
