//! ABOUTME: Threaded comments on companies, investors, news, jobs and events
//! ABOUTME: Content is validated for length and spam markers; deletes are soft

use super::PageRequest;
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Entity types that accept comments
pub const COMMENT_ENTITY_TYPES: [&str; 5] = ["company", "investor", "news", "job", "event"];

pub const MIN_COMMENT_LEN: usize = 3;
pub const MAX_COMMENT_LEN: usize = 2000;

const SPAM_MARKERS: [&str; 6] = ["spam", "реклама", "купить", "продать", "http://", "https://"];

/// A reason a comment body was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentIssue {
    Empty,
    TooShort,
    TooLong,
    Spam,
}

impl CommentIssue {
    pub fn code(&self) -> &'static str {
        match self {
            CommentIssue::Empty => "empty",
            CommentIssue::TooShort => "too_short",
            CommentIssue::TooLong => "too_long",
            CommentIssue::Spam => "spam",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CommentIssue::Empty => "Comment cannot be empty",
            CommentIssue::TooShort => "Comment must be at least 3 characters",
            CommentIssue::TooLong => "Comment must be at most 2000 characters",
            CommentIssue::Spam => "Comment looks like spam or contains links",
        }
    }
}

pub struct CommentValidator;

impl CommentValidator {
    /// Every issue found in `content`; empty means valid
    pub fn validate(content: &str) -> Vec<CommentIssue> {
        let trimmed = content.trim();
        let length = trimmed.chars().count();
        let mut issues = Vec::new();

        if trimmed.is_empty() {
            issues.push(CommentIssue::Empty);
        }
        if length < MIN_COMMENT_LEN {
            issues.push(CommentIssue::TooShort);
        }
        if length > MAX_COMMENT_LEN {
            issues.push(CommentIssue::TooLong);
        }

        let lowered = content.to_lowercase();
        if SPAM_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            issues.push(CommentIssue::Spam);
        }

        issues
    }

    pub fn is_valid_entity_type(entity_type: &str) -> bool {
        COMMENT_ENTITY_TYPES.contains(&entity_type)
    }

    /// Validation error carrying the first issue's message
    pub fn check(content: &str) -> Result<()> {
        match Self::validate(content).first() {
            Some(issue) => Err(Error::Validation(issue.message().to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub entity_type: String,
    pub entity_id: String,
    pub parent_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub author_name: String,
}

/// A root comment with its replies in posting order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub user_id: String,
    pub content: String,
    pub entity_type: String,
    pub entity_id: String,
    pub parent_id: Option<String>,
}

const COMMENT_SELECT: &str = r#"
    SELECT cm.id, cm.user_id, cm.content, cm.entity_type, cm.entity_id, cm.parent_id,
           cm.status, cm.created_at, cm.updated_at,
           TRIM(u.first_name || ' ' || u.last_name) AS author_name
    FROM comments cm
    JOIN users u ON u.id = cm.user_id
"#;

pub struct CommentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CommentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Post a comment, optionally replying to an active comment on the same entity
    #[instrument(skip(self, request), fields(entity_type = %request.entity_type))]
    pub async fn create(&self, request: CreateCommentRequest) -> Result<Comment> {
        if !CommentValidator::is_valid_entity_type(&request.entity_type) {
            return Err(Error::Validation(format!(
                "Unknown entity type: {}",
                request.entity_type
            )));
        }
        CommentValidator::check(&request.content)?;

        if let Some(parent_id) = &request.parent_id {
            let parent = self
                .find_by_id(parent_id)
                .await?
                .filter(|p| p.status == "active")
                .ok_or_else(|| Error::NotFound("Parent comment not found".to_string()))?;
            if parent.entity_type != request.entity_type || parent.entity_id != request.entity_id
            {
                return Err(Error::Validation(
                    "Reply must belong to the same entity as its parent".to_string(),
                ));
            }
        }

        let id = Id::new().to_string();
        let now = now_iso8601();
        debug!("Creating comment {}", id);

        sqlx::query(
            "INSERT INTO comments (id, user_id, content, entity_type, entity_id, parent_id, \
             status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?7)",
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(request.content.trim())
        .bind(&request.entity_type)
        .bind(&request.entity_id)
        .bind(&request.parent_id)
        .bind(&now)
        .execute(self.pool)
        .await
        .map_err(|e| super::write_error("create comment", e))?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| Error::Database("Comment vanished after insert".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Comment>> {
        sqlx::query_as::<_, Comment>(&format!("{} WHERE cm.id = ?1", COMMENT_SELECT))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find comment: {}", e)))
    }

    /// Root comments newest first, each with its replies oldest first
    #[instrument(skip(self))]
    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        page: PageRequest,
    ) -> Result<Vec<CommentThread>> {
        let roots = sqlx::query_as::<_, Comment>(&format!(
            "{} WHERE cm.entity_type = ?1 AND cm.entity_id = ?2 AND cm.status = 'active' \
             AND cm.parent_id IS NULL ORDER BY cm.created_at DESC LIMIT ?3 OFFSET ?4",
            COMMENT_SELECT
        ))
        .bind(entity_type)
        .bind(entity_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list comments: {}", e)))?;

        let replies = sqlx::query_as::<_, Comment>(&format!(
            "{} WHERE cm.entity_type = ?1 AND cm.entity_id = ?2 AND cm.status = 'active' \
             AND cm.parent_id IS NOT NULL ORDER BY cm.created_at ASC",
            COMMENT_SELECT
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list replies: {}", e)))?;

        let mut by_parent: HashMap<String, Vec<Comment>> = HashMap::new();
        for reply in replies {
            if let Some(parent_id) = reply.parent_id.clone() {
                by_parent.entry(parent_id).or_default().push(reply);
            }
        }

        Ok(roots
            .into_iter()
            .map(|comment| {
                let replies = by_parent.remove(&comment.id).unwrap_or_default();
                CommentThread { comment, replies }
            })
            .collect())
    }

    /// Active comments (roots and replies) on an entity
    #[instrument(skip(self))]
    pub async fn count_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE entity_type = ?1 AND entity_id = ?2 \
             AND status = 'active'",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count comments: {}", e)))
    }

    /// Edit an active comment; only its author may do so
    #[instrument(skip(self, content))]
    pub async fn update(&self, id: &str, user_id: &str, content: &str) -> Result<bool> {
        CommentValidator::check(content)?;

        let result = sqlx::query(
            "UPDATE comments SET content = ?1, updated_at = ?2 \
             WHERE id = ?3 AND user_id = ?4 AND status = 'active'",
        )
        .bind(content.trim())
        .bind(now_iso8601())
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update comment: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark deleted; staff may delete anyone's comment
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: &str, user_id: &str, is_staff: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE comments SET status = 'deleted', updated_at = ?1 \
             WHERE id = ?2 AND (?3 OR user_id = ?4)",
        )
        .bind(now_iso8601())
        .bind(id)
        .bind(is_staff)
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to delete comment: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// A user's active comments, newest first
    #[instrument(skip(self))]
    pub async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<Comment>> {
        sqlx::query_as::<_, Comment>(&format!(
            "{} WHERE cm.user_id = ?1 AND cm.status = 'active' \
             ORDER BY cm.created_at DESC LIMIT ?2",
            COMMENT_SELECT
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list user comments: {}", e)))
    }
}
