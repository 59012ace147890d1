//! ABOUTME: Visitor feedback reports and their admin processing state
//! ABOUTME: Records are kept even when forwarding to the chat bot fails

use super::{like_pattern, non_blank, PageRequest};
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, instrument};

pub const FEEDBACK_TYPES: [&str; 4] = ["bug", "feature", "improvement", "other"];
pub const FEEDBACK_STATUSES: [&str; 4] = ["new", "in_progress", "resolved", "closed"];

const FEEDBACK_COLUMNS: &str = "id, feedback_type, description, suggestion, name, email, \
     page_url, page_title, user_agent, screen_size, is_authenticated, status, admin_notes, \
     processed_by, processed_at, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Feedback {
    pub id: String,
    pub feedback_type: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub page_url: Option<String>,
    pub page_title: Option<String>,
    pub user_agent: Option<String>,
    pub screen_size: Option<String>,
    pub is_authenticated: bool,
    pub status: String,
    pub admin_notes: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFeedbackRequest {
    pub feedback_type: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub page_url: Option<String>,
    pub page_title: Option<String>,
    pub user_agent: Option<String>,
    pub screen_size: Option<String>,
    pub is_authenticated: bool,
}

/// Known type, or `other` for anything unrecognized
pub fn normalize_feedback_type(value: &str) -> &'static str {
    let value = value.trim().to_lowercase();
    FEEDBACK_TYPES
        .iter()
        .find(|t| **t == value)
        .copied()
        .unwrap_or("other")
}

pub struct FeedbackRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FeedbackRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateFeedbackRequest) -> Result<Feedback> {
        let description = request.description.trim();
        if description.is_empty() {
            return Err(Error::Validation("Description is required".to_string()));
        }

        let feedback = sqlx::query_as::<_, Feedback>(&format!(
            "INSERT INTO feedback (id, feedback_type, description, suggestion, name, email, \
             page_url, page_title, user_agent, screen_size, is_authenticated, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'new', ?12) RETURNING {}",
            FEEDBACK_COLUMNS
        ))
        .bind(Id::new().to_string())
        .bind(normalize_feedback_type(&request.feedback_type))
        .bind(description)
        .bind(non_blank(&request.suggestion))
        .bind(non_blank(&request.name))
        .bind(non_blank(&request.email))
        .bind(non_blank(&request.page_url))
        .bind(non_blank(&request.page_title))
        .bind(non_blank(&request.user_agent))
        .bind(non_blank(&request.screen_size))
        .bind(request.is_authenticated)
        .bind(now_iso8601())
        .fetch_one(self.pool)
        .await
        .map_err(|e| super::write_error("create feedback", e))?;

        info!(feedback_id = %feedback.id, kind = %feedback.feedback_type, "Feedback received");
        Ok(feedback)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Feedback>> {
        sqlx::query_as::<_, Feedback>(&format!(
            "SELECT {} FROM feedback WHERE id = ?1",
            FEEDBACK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find feedback: {}", e)))
    }

    /// Newest first; `q` matches description, suggestion, name, email and type
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<Vec<Feedback>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM feedback WHERE 1 = 1", FEEDBACK_COLUMNS));
        push_filters(&mut qb, q, status);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        qb.build_query_as::<Feedback>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list feedback: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>, status: &Option<String>) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM feedback WHERE 1 = 1");
        push_filters(&mut qb, q, status);
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count feedback: {}", e)))
    }

    /// Move to a new processing status, stamping who handled it and when
    #[instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        id: &str,
        status: &str,
        notes: Option<&str>,
        processed_by: &str,
    ) -> Result<Feedback> {
        if !FEEDBACK_STATUSES.contains(&status) {
            return Err(Error::Validation(format!("Unknown feedback status: {}", status)));
        }

        sqlx::query_as::<_, Feedback>(&format!(
            "UPDATE feedback SET status = ?1, admin_notes = ?2, processed_by = ?3, \
             processed_at = ?4 WHERE id = ?5 RETURNING {}",
            FEEDBACK_COLUMNS
        ))
        .bind(status)
        .bind(notes.map(str::trim).filter(|n| !n.is_empty()))
        .bind(processed_by)
        .bind(now_iso8601())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update feedback: {}", e)))?
        .ok_or_else(|| Error::NotFound("Feedback not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feedback WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete feedback: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_filters(qb: &mut QueryBuilder<Sqlite>, q: &Option<String>, status: &Option<String>) {
    if let Some(q) = non_blank(q) {
        let pattern = like_pattern(&q);
        qb.push(" AND (");
        let mut any = qb.separated(" OR ");
        for column in ["description", "suggestion", "name", "email", "feedback_type"] {
            any.push(format!("{} LIKE ", column))
                .push_bind_unseparated(pattern.clone())
                .push_unseparated(" ESCAPE '\\'");
        }
        qb.push(")");
    }
    if let Some(status) = non_blank(status) {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_db;

    fn report(kind: &str, description: &str) -> CreateFeedbackRequest {
        CreateFeedbackRequest {
            feedback_type: kind.to_string(),
            description: description.to_string(),
            email: Some("visitor@example.com".to_string()),
            page_url: Some("/companies".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_feedback_type() {
        assert_eq!(normalize_feedback_type(" Bug "), "bug");
        assert_eq!(normalize_feedback_type("complaint"), "other");
    }

    #[tokio::test]
    async fn test_feedback_lifecycle() {
        let db = create_test_db().await;
        let repo = FeedbackRepository::new(db.pool());

        assert!(matches!(
            repo.create(report("bug", "  ")).await,
            Err(Error::Validation(_))
        ));

        let bug = repo.create(report("bug", "Filter resets")).await.expect("create");
        repo.create(report("feature", "Dark mode please")).await.expect("create");
        assert_eq!(bug.status, "new");
        assert_eq!(bug.suggestion, None);

        let found = repo
            .list(&Some("dark".to_string()), &None, PageRequest::default())
            .await
            .expect("list");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].feedback_type, "feature");

        assert!(matches!(
            repo.update_status(&bug.id, "done", None, "Admin").await,
            Err(Error::Validation(_))
        ));
        let processed = repo
            .update_status(&bug.id, "resolved", Some(" fixed in release "), "Admin")
            .await
            .expect("update");
        assert_eq!(processed.admin_notes.as_deref(), Some("fixed in release"));
        assert_eq!(processed.processed_by.as_deref(), Some("Admin"));
        assert!(processed.processed_at.is_some());

        assert_eq!(
            repo.count(&None, &Some("resolved".to_string())).await.expect("count"),
            1
        );
        assert!(repo.delete(&bug.id).await.expect("delete"));
        assert!(repo.find_by_id(&bug.id).await.expect("find").is_none());
    }
}
