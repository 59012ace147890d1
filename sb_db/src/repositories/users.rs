//! ABOUTME: User repository with account, profile and role management
//! ABOUTME: Emails are matched case-insensitively through the column collation

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

const USER_COLUMNS: &str = "id, email, password_hash, role, first_name, last_name, country_id, \
     city, phone, telegram, linkedin, investor_id, company_id, status, created_at, updated_at";

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Investor,
    Startuper,
    Moderator,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::User,
        Role::Investor,
        Role::Startuper,
        Role::Moderator,
        Role::Admin,
    ];

    /// Roles a visitor may pick at registration
    pub const SELF_SERVICE: [Role; 3] = [Role::User, Role::Investor, Role::Startuper];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Investor => "investor",
            Role::Startuper => "startuper",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// Admins and moderators
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "investor" => Ok(Role::Investor),
            "startuper" => Ok(Role::Startuper),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(Error::Validation(format!("Unknown role: {}", other))),
        }
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub country_id: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub telegram: Option<String>,
    pub linkedin: Option<String>,
    pub investor_id: Option<String>,
    pub company_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Stored role; unknown values degrade to `user`
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::User)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Request to create a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub country_id: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub telegram: Option<String>,
    pub linkedin: Option<String>,
}

/// Partial profile update; `None` keeps the stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country_id: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub telegram: Option<String>,
    pub linkedin: Option<String>,
}

/// Admin list filter
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub q: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
}

/// User repository
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user; duplicate emails are a conflict
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<User> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating user with id: {}", id);

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, role, first_name, last_name, country_id,
                               city, phone, telegram, linkedin, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'active', ?12, ?12)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(request.email.trim())
        .bind(request.password_hash)
        .bind(request.role.as_str())
        .bind(request.first_name.trim())
        .bind(request.last_name.trim())
        .bind(request.country_id)
        .bind(request.city)
        .bind(request.phone)
        .bind(request.telegram)
        .bind(request.linkedin)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create user", e))?;

        debug!("Successfully created user: {}", user.id);
        Ok(user)
    }

    /// Find a user by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        debug!("Finding user by id: {}", id);

        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find user by id: {}", e)))
    }

    /// Find a user by email, ignoring case
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        debug!("Finding user by email");

        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?1",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find user by email: {}", e)))
    }

    /// Users linked to a company
    #[instrument(skip(self))]
    pub async fn list_by_company(&self, company_id: &str) -> Result<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE company_id = ?1",
            USER_COLUMNS
        ))
        .bind(company_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list company users: {}", e)))
    }

    /// Paginated list for the admin screen, newest first
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &UserFilter, page: PageRequest) -> Result<Vec<User>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM users WHERE 1=1",
            USER_COLUMNS
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let users = qb
            .build_query_as::<User>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list users: {}", e)))?;

        debug!("Found {} users", users.len());
        Ok(users)
    }

    #[instrument(skip(self))]
    pub async fn count(&self, filter: &UserFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_filters(&mut qb, filter);

        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count users: {}", e)))
    }

    /// Update profile fields
    #[instrument(skip(self, request))]
    pub async fn update_profile(&self, id: &str, request: UpdateProfileRequest) -> Result<User> {
        debug!("Updating user profile: {}", id);

        let now = now_iso8601();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let current = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to find user by id: {}", e)))?
        .ok_or_else(|| Error::NotFound("User not found".to_string()))?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = ?1, first_name = ?2, last_name = ?3, country_id = ?4, city = ?5,
                phone = ?6, telegram = ?7, linkedin = ?8, updated_at = ?9
            WHERE id = ?10
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(request.email.map(|e| e.trim().to_string()).unwrap_or(current.email))
        .bind(request.first_name.unwrap_or(current.first_name))
        .bind(request.last_name.unwrap_or(current.last_name))
        .bind(request.country_id.or(current.country_id))
        .bind(request.city.or(current.city))
        .bind(request.phone.or(current.phone))
        .bind(request.telegram.or(current.telegram))
        .bind(request.linkedin.or(current.linkedin))
        .bind(&now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error("update user", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!("Successfully updated user: {}", user.id);
        Ok(user)
    }

    #[instrument(skip(self, password_hash))]
    pub async fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.set_column(id, "password_hash", Some(password_hash), "set password")
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_role(&self, id: &str, role: Role) -> Result<()> {
        self.set_column(id, "role", Some(role.as_str()), "set role")
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, id: &str, status: &str) -> Result<()> {
        self.set_column(id, "status", Some(status), "set status")
            .await
    }

    /// Point the user at a company, or clear the link with `None`
    #[instrument(skip(self))]
    pub async fn link_company(&self, id: &str, company_id: Option<&str>) -> Result<()> {
        self.set_column(id, "company_id", company_id, "link company")
            .await
    }

    #[instrument(skip(self))]
    pub async fn link_investor(&self, id: &str, investor_id: Option<&str>) -> Result<()> {
        self.set_column(id, "investor_id", investor_id, "link investor")
            .await
    }

    /// `column` is always one of the literals above, never caller input
    async fn set_column(
        &self,
        id: &str,
        column: &'static str,
        value: Option<&str>,
        action: &str,
    ) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE users SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            column
        ))
        .bind(value)
        .bind(now_iso8601())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| write_error(action, e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    /// Delete a user
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete user: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// (role, count) pairs
    #[instrument(skip(self))]
    pub async fn count_by_role(&self) -> Result<Vec<(String, i64)>> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count users by role: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn has_any_admin(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to check for admins: {}", e)))?;
        Ok(count > 0)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &UserFilter) {
    if let Some(q) = non_blank(&filter.q) {
        let pattern = like_pattern(&q);
        qb.push(" AND (email LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR first_name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR last_name LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(status) = non_blank(&filter.status) {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(role) = non_blank(&filter.role) {
        qb.push(" AND role = ").push_bind(role);
    }
}
