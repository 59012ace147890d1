//! ABOUTME: Stored HTML email templates addressed by a unique code
//! ABOUTME: Only active templates are used for outgoing mail

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

pub const PASSWORD_RESET_TEMPLATE: &str = "password_reset";
pub const WELCOME_TEMPLATE: &str = "welcome";

const TEMPLATE_COLUMNS: &str = "id, code, subject, html_content, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct EmailTemplate {
    pub id: String,
    pub code: String,
    pub subject: String,
    pub html_content: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplateRequest {
    pub code: String,
    pub subject: String,
    pub html_content: String,
    pub is_active: bool,
}

impl EmailTemplateRequest {
    fn validated(&self) -> Result<(String, String)> {
        let code = self.code.trim().to_lowercase();
        let subject = self.subject.trim().to_string();
        if code.is_empty() || subject.is_empty() || self.html_content.trim().is_empty() {
            return Err(Error::Validation(
                "Code, subject and content are required".to_string(),
            ));
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Validation(
                "Code may only contain letters, digits, '_' and '-'".to_string(),
            ));
        }
        Ok((code, subject))
    }
}

pub struct EmailTemplateRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EmailTemplateRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: EmailTemplateRequest) -> Result<EmailTemplate> {
        let (code, subject) = request.validated()?;
        let now = now_iso8601();

        sqlx::query_as::<_, EmailTemplate>(&format!(
            "INSERT INTO email_templates (id, code, subject, html_content, is_active, \
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING {}",
            TEMPLATE_COLUMNS
        ))
        .bind(Id::new().to_string())
        .bind(code)
        .bind(subject)
        .bind(&request.html_content)
        .bind(request.is_active)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create email template", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<EmailTemplate>> {
        sqlx::query_as::<_, EmailTemplate>(&format!(
            "SELECT {} FROM email_templates WHERE id = ?1",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find email template: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn find_active_by_code(&self, code: &str) -> Result<Option<EmailTemplate>> {
        sqlx::query_as::<_, EmailTemplate>(&format!(
            "SELECT {} FROM email_templates WHERE code = ?1 AND is_active = TRUE",
            TEMPLATE_COLUMNS
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find email template: {}", e)))
    }

    /// Most recently edited first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        q: &Option<String>,
        active: Option<bool>,
        page: PageRequest,
    ) -> Result<Vec<EmailTemplate>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM email_templates WHERE 1 = 1",
            TEMPLATE_COLUMNS
        ));
        push_filters(&mut qb, q, active);
        qb.push(" ORDER BY updated_at DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        qb.build_query_as::<EmailTemplate>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list email templates: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>, active: Option<bool>) -> Result<i64> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM email_templates WHERE 1 = 1");
        push_filters(&mut qb, q, active);
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count email templates: {}", e)))
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: EmailTemplateRequest) -> Result<EmailTemplate> {
        let (code, subject) = request.validated()?;

        sqlx::query_as::<_, EmailTemplate>(&format!(
            "UPDATE email_templates SET code = ?1, subject = ?2, html_content = ?3, \
             is_active = ?4, updated_at = ?5 WHERE id = ?6 RETURNING {}",
            TEMPLATE_COLUMNS
        ))
        .bind(code)
        .bind(subject)
        .bind(&request.html_content)
        .bind(request.is_active)
        .bind(now_iso8601())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update email template", e))?
        .ok_or_else(|| Error::NotFound("Email template not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_templates WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete email template: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_filters(qb: &mut QueryBuilder<Sqlite>, q: &Option<String>, active: Option<bool>) {
    if let Some(q) = non_blank(q) {
        let pattern = like_pattern(&q);
        qb.push(" AND (code LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR subject LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(active) = active {
        qb.push(" AND is_active = ").push_bind(active);
    }
}
