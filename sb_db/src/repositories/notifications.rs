//! ABOUTME: Per-user in-app notifications with read tracking
//! ABOUTME: Every read/write besides create is scoped to the owning user

use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(NotificationKind::Info),
            "success" => Ok(NotificationKind::Success),
            "warning" => Ok(NotificationKind::Warning),
            "error" => Ok(NotificationKind::Error),
            other => Err(Error::Validation(format!(
                "Unknown notification kind: {}",
                other
            ))),
        }
    }
}

/// Title, message and kind for a canned notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationTemplate {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

impl NotificationTemplate {
    pub fn new_comment(entity_type: &str, entity_name: &str) -> Self {
        Self {
            title: "New comment".to_string(),
            message: format!("A new comment was posted on {}: {}", entity_type, entity_name),
            kind: NotificationKind::Info,
        }
    }

    pub fn company_updated(company_name: &str) -> Self {
        Self {
            title: "Company updated".to_string(),
            message: format!("Company {} was updated", company_name),
            kind: NotificationKind::Info,
        }
    }

    pub fn new_job(company_name: &str, job_title: &str) -> Self {
        Self {
            title: "New job".to_string(),
            message: format!("{} published a new job: {}", company_name, job_title),
            kind: NotificationKind::Success,
        }
    }

    pub fn investment_round(company_name: &str, amount: &str) -> Self {
        Self {
            title: "New investment round".to_string(),
            message: format!("{} raised an investment of {}", company_name, amount),
            kind: NotificationKind::Success,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl CreateNotificationRequest {
    pub fn from_template(
        user_id: &str,
        template: NotificationTemplate,
        entity: Option<(&str, &str)>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            title: template.title,
            message: template.message,
            kind: template.kind,
            entity_type: entity.map(|(t, _)| t.to_string()),
            entity_id: entity.map(|(_, id)| id.to_string()),
        }
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, title, message, kind, is_read, entity_type, entity_id, created_at";

pub struct NotificationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create(&self, request: CreateNotificationRequest) -> Result<Notification> {
        sqlx::query_as::<_, Notification>(&format!(
            "INSERT INTO notifications (id, user_id, title, message, kind, is_read, \
             entity_type, entity_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, FALSE, ?6, ?7, ?8) \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(Id::new().to_string())
        .bind(&request.user_id)
        .bind(&request.title)
        .bind(&request.message)
        .bind(request.kind.as_str())
        .bind(&request.entity_type)
        .bind(&request.entity_id)
        .bind(now_iso8601())
        .fetch_one(self.pool)
        .await
        .map_err(|e| super::write_error("create notification", e))
    }

    /// Send a templated notification to every user linked to a company,
    /// skipping `exclude_user` (usually the actor). Returns how many were sent.
    #[instrument(skip(self, template))]
    pub async fn notify_company_users(
        &self,
        company_id: &str,
        template: &NotificationTemplate,
        entity: (&str, &str),
        exclude_user: Option<&str>,
    ) -> Result<usize> {
        let recipients: Vec<String> =
            sqlx::query_scalar("SELECT id FROM users WHERE company_id = ?1 AND status = 'active'")
                .bind(company_id)
                .fetch_all(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to load company users: {}", e)))?;

        let mut sent = 0;
        for user_id in recipients
            .iter()
            .filter(|id| Some(id.as_str()) != exclude_user)
        {
            self.create(CreateNotificationRequest::from_template(
                user_id,
                template.clone(),
                Some(entity),
            ))
            .await?;
            sent += 1;
        }
        debug!(company_id, sent, "Notified company users");
        Ok(sent)
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: &str,
        limit: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(&format!(
            "SELECT {} FROM notifications WHERE user_id = ?1 AND (NOT ?2 OR is_read = FALSE) \
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list notifications: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ?1 AND user_id = ?2")
                .bind(id)
                .bind(user_id)
                .execute(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to mark notification: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns how many notifications flipped to read
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = ?1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to mark notifications: {}", e)))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count notifications: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete notification: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::companies::{tests::company, CompanyRepository};
    use crate::repositories::users::{tests::sample_user, Role, UserRepository};
    use crate::test_helpers::create_test_db;

    #[test]
    fn test_templates() {
        let t = NotificationTemplate::new_job("Kaspi", "Backend engineer");
        assert_eq!(t.kind, NotificationKind::Success);
        assert!(t.message.contains("Backend engineer"));
        assert_eq!(
            NotificationTemplate::new_comment("company", "Kaspi").kind,
            NotificationKind::Info
        );
        assert_eq!("warning".parse::<NotificationKind>().ok(), Some(NotificationKind::Warning));
        assert!("loud".parse::<NotificationKind>().is_err());
    }

    #[tokio::test]
    async fn test_notifications_are_owner_scoped() {
        let db = create_test_db().await;
        let users = UserRepository::new(db.pool());
        let owner = users
            .create(sample_user("owner@example.com", Role::User))
            .await
            .expect("user");
        let other = users
            .create(sample_user("other@example.com", Role::User))
            .await
            .expect("user");
        let repo = NotificationRepository::new(db.pool());

        let first = repo
            .create(CreateNotificationRequest::from_template(
                &owner.id,
                NotificationTemplate::company_updated("Kaspi"),
                None,
            ))
            .await
            .expect("create");
        repo.create(CreateNotificationRequest::from_template(
            &owner.id,
            NotificationTemplate::investment_round("Kaspi", "$1M"),
            Some(("company", "c1")),
        ))
        .await
        .expect("create");

        assert_eq!(repo.unread_count(&owner.id).await.expect("count"), 2);
        assert!(!repo.mark_read(&first.id, &other.id).await.expect("mark"));
        assert!(!repo.delete(&first.id, &other.id).await.expect("delete"));
        assert!(repo.mark_read(&first.id, &owner.id).await.expect("mark"));

        let unread = repo.list(&owner.id, 20, true).await.expect("list");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].entity_id.as_deref(), Some("c1"));

        assert_eq!(repo.mark_all_read(&owner.id).await.expect("all"), 1);
        assert_eq!(repo.unread_count(&owner.id).await.expect("count"), 0);
        assert_eq!(repo.list(&owner.id, 20, false).await.expect("list").len(), 2);
        assert!(repo.delete(&first.id, &owner.id).await.expect("delete"));
    }

    #[tokio::test]
    async fn test_notify_company_users_skips_actor() {
        let db = create_test_db().await;
        let users = UserRepository::new(db.pool());
        let acme = CompanyRepository::new(db.pool())
            .create(company("Acme", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let founder = users
            .create(sample_user("founder@example.com", Role::Startuper))
            .await
            .expect("user");
        let actor = users
            .create(sample_user("actor@example.com", Role::Startuper))
            .await
            .expect("user");
        users.link_company(&founder.id, Some(&acme.id)).await.expect("link");
        users.link_company(&actor.id, Some(&acme.id)).await.expect("link");

        let repo = NotificationRepository::new(db.pool());
        let sent = repo
            .notify_company_users(
                &acme.id,
                &NotificationTemplate::new_comment("company", "Acme"),
                ("company", &acme.id),
                Some(&actor.id),
            )
            .await
            .expect("notify");
        assert_eq!(sent, 1);
        assert_eq!(repo.unread_count(&founder.id).await.expect("count"), 1);
        assert_eq!(repo.unread_count(&actor.id).await.expect("count"), 0);
    }
}
