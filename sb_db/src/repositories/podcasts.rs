//! ABOUTME: Podcast episode repository
//! ABOUTME: Episodes link out to YouTube and are listed newest first

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{time::today, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::instrument;

const PODCAST_COLUMNS: &str = "id, title, description, youtube_url, date, status";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Podcast {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub youtube_url: Option<String>,
    pub date: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodcastRequest {
    pub title: String,
    pub description: Option<String>,
    pub youtube_url: Option<String>,
    pub date: Option<String>,
    pub status: Option<String>,
}

pub struct PodcastRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PodcastRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: PodcastRequest) -> Result<Podcast> {
        let title = required_title(&request)?;
        sqlx::query_as::<_, Podcast>(&format!(
            "INSERT INTO podcasts (id, title, description, youtube_url, date, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {}",
            PODCAST_COLUMNS
        ))
        .bind(Id::new().to_string())
        .bind(title)
        .bind(request.description)
        .bind(request.youtube_url)
        .bind(non_blank(&request.date).unwrap_or_else(|| today().format("%Y-%m-%d").to_string()))
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create podcast", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Podcast>> {
        sqlx::query_as::<_, Podcast>(&format!(
            "SELECT {} FROM podcasts WHERE id = ?1",
            PODCAST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find podcast: {}", e)))
    }

    /// Newest first; `status` of None lists everything
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<Vec<Podcast>> {
        sqlx::query_as::<_, Podcast>(&format!(
            "SELECT {} FROM podcasts WHERE title LIKE ?1 ESCAPE '\\' \
             AND (?2 IS NULL OR status = ?2) ORDER BY date DESC, id DESC LIMIT ?3 OFFSET ?4",
            PODCAST_COLUMNS
        ))
        .bind(like_pattern(&non_blank(q).unwrap_or_default()))
        .bind(non_blank(status))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list podcasts: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>, status: &Option<String>) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM podcasts WHERE title LIKE ?1 ESCAPE '\\' \
             AND (?2 IS NULL OR status = ?2)",
        )
        .bind(like_pattern(&non_blank(q).unwrap_or_default()))
        .bind(non_blank(status))
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count podcasts: {}", e)))
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: PodcastRequest) -> Result<Podcast> {
        let title = required_title(&request)?;
        sqlx::query_as::<_, Podcast>(&format!(
            "UPDATE podcasts SET title = ?1, description = ?2, youtube_url = ?3, \
             date = COALESCE(?4, date), status = COALESCE(?5, status) WHERE id = ?6 RETURNING {}",
            PODCAST_COLUMNS
        ))
        .bind(title)
        .bind(request.description)
        .bind(request.youtube_url)
        .bind(non_blank(&request.date))
        .bind(request.status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update podcast", e))?
        .ok_or_else(|| Error::NotFound("Podcast not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM podcasts WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete podcast: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn required_title(request: &PodcastRequest) -> Result<String> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(Error::Validation("Podcast title is required".to_string()));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_db;

    #[tokio::test]
    async fn test_podcast_crud_and_ordering() {
        let db = create_test_db().await;
        let repo = PodcastRepository::new(db.pool());

        let older = repo
            .create(PodcastRequest {
                title: "Episode 1".to_string(),
                date: Some("2024-01-01".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");
        repo.create(PodcastRequest {
            title: "Episode 2".to_string(),
            date: Some("2024-02-01".to_string()),
            ..Default::default()
        })
        .await
        .expect("create");

        let listed = repo
            .list(&None, &Some("active".to_string()), PageRequest::default())
            .await
            .expect("list");
        assert_eq!(listed[0].title, "Episode 2");
        assert_eq!(repo.count(&Some("1".to_string()), &None).await.expect("count"), 1);

        let updated = repo
            .update(
                &older.id,
                PodcastRequest {
                    title: "Episode 1 (remastered)".to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.date, "2024-01-01");

        assert!(repo.delete(&older.id).await.expect("delete"));
        assert!(matches!(
            repo.create(PodcastRequest::default()).await,
            Err(Error::Validation(_))
        ));
    }
}
