//! ABOUTME: Job posting repository with directory filters
//! ABOUTME: Postings optionally belong to a company and cascade with it

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

const JOB_COLUMNS: &str =
    "id, title, description, company_id, city, job_type, contact, status, created_at";

pub(crate) const JOINED_SELECT: &str = r#"
    SELECT j.id, j.title, j.description, j.company_id, j.city, j.job_type, j.contact,
           j.status, j.created_at, c.name AS company_name
    FROM jobs j
    LEFT JOIN companies c ON c.id = j.company_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub company_id: Option<String>,
    pub city: Option<String>,
    pub job_type: Option<String>,
    pub contact: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct JobWithCompany {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub company_id: Option<String>,
    pub city: Option<String>,
    pub job_type: Option<String>,
    pub contact: Option<String>,
    pub status: String,
    pub created_at: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub description: Option<String>,
    pub company_id: Option<String>,
    pub city: Option<String>,
    pub job_type: Option<String>,
    pub contact: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub q: Option<String>,
    pub city: Option<String>,
    pub job_type: Option<String>,
    pub company_id: Option<String>,
    pub status: Option<String>,
}

pub struct JobRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateJobRequest) -> Result<Job> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("Job title is required".to_string()));
        }

        let id = Id::new().to_string();
        debug!("Creating job with id: {}", id);

        sqlx::query_as::<_, Job>(&format!(
            "INSERT INTO jobs (id, title, description, company_id, city, job_type, contact, \
             status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(title)
        .bind(request.description)
        .bind(request.company_id)
        .bind(request.city)
        .bind(request.job_type)
        .bind(request.contact)
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .bind(now_iso8601())
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create job", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<JobWithCompany>> {
        sqlx::query_as::<_, JobWithCompany>(&format!("{} WHERE j.id = ?1", JOINED_SELECT))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find job by id: {}", e)))
    }

    /// Filtered page, newest first
    #[instrument(skip(self))]
    pub async fn search(&self, filter: &JobFilter, page: PageRequest) -> Result<Vec<JobWithCompany>> {
        let mut qb = QueryBuilder::<Sqlite>::new(JOINED_SELECT);
        qb.push(" WHERE 1=1");
        push_filters(&mut qb, filter, "j.");
        qb.push(" ORDER BY j.created_at DESC, j.id DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        qb.build_query_as::<JobWithCompany>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search jobs: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, filter: &JobFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM jobs WHERE 1=1");
        push_filters(&mut qb, filter, "");
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count jobs: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn cities(&self) -> Result<Vec<String>> {
        self.distinct("city").await
    }

    #[instrument(skip(self))]
    pub async fn job_types(&self) -> Result<Vec<String>> {
        self.distinct("job_type").await
    }

    async fn distinct(&self, column: &'static str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(&format!(
            "SELECT DISTINCT {col} FROM jobs WHERE {col} IS NOT NULL AND TRIM({col}) != '' \
             ORDER BY {col}",
            col = column
        ))
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list job {}: {}", column, e)))
    }

    #[instrument(skip(self))]
    pub async fn list_by_company(&self, company_id: &str) -> Result<Vec<Job>> {
        sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE company_id = ?1 ORDER BY created_at DESC, id DESC",
            JOB_COLUMNS
        ))
        .bind(company_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list company jobs: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn latest(&self, limit: i64) -> Result<Vec<JobWithCompany>> {
        sqlx::query_as::<_, JobWithCompany>(&format!(
            "{} WHERE j.status = 'active' ORDER BY j.created_at DESC, j.id DESC LIMIT ?1",
            JOINED_SELECT
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list latest jobs: {}", e)))
    }

    /// Replace every field of a job
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: CreateJobRequest) -> Result<Job> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("Job title is required".to_string()));
        }

        sqlx::query_as::<_, Job>(&format!(
            "UPDATE jobs SET title = ?1, description = ?2, company_id = ?3, city = ?4, \
             job_type = ?5, contact = ?6, status = COALESCE(?7, status) WHERE id = ?8 \
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(title)
        .bind(request.description)
        .bind(request.company_id)
        .bind(request.city)
        .bind(request.job_type)
        .bind(request.contact)
        .bind(request.status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update job", e))?
        .ok_or_else(|| Error::NotFound("Job not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete job: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &JobFilter, alias: &str) {
    if let Some(q) = non_blank(&filter.q) {
        qb.push(format!(" AND {}title LIKE ", alias))
            .push_bind(like_pattern(&q))
            .push(" ESCAPE '\\'");
    }
    if let Some(city) = non_blank(&filter.city) {
        qb.push(format!(" AND {}city = ", alias)).push_bind(city);
    }
    if let Some(job_type) = non_blank(&filter.job_type) {
        qb.push(format!(" AND {}job_type = ", alias)).push_bind(job_type);
    }
    if let Some(company_id) = non_blank(&filter.company_id) {
        qb.push(format!(" AND {}company_id = ", alias))
            .push_bind(company_id);
    }
    if let Some(status) = non_blank(&filter.status) {
        qb.push(format!(" AND {}status = ", alias)).push_bind(status);
    }
}
