//! ABOUTME: Person repository for team members shared by companies and investors
//! ABOUTME: Membership itself is stored in the association tables

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use tracing::{debug, instrument};

const PERSON_COLUMNS: &str = "id, name, country, linkedin, role, status";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub country: Option<String>,
    pub linkedin: Option<String>,
    pub role: Option<String>,
    pub status: String,
}

/// Create and full-replace payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonRequest {
    pub name: String,
    pub country: Option<String>,
    pub linkedin: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

impl PersonRequest {
    fn validated_name(&self) -> Result<String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Name is required".to_string()));
        }
        Ok(name.to_string())
    }
}

pub struct PersonRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PersonRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: PersonRequest) -> Result<Person> {
        let name = request.validated_name()?;
        insert_person(self.pool, name, request).await
    }

    /// Create a person and put them on a company team in one transaction
    #[instrument(skip(self, request))]
    pub async fn create_for_company(
        &self,
        company_id: &str,
        request: PersonRequest,
    ) -> Result<Person> {
        let name = request.validated_name()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let person = insert_person(&mut *tx, name, request).await?;
        sqlx::query("INSERT INTO company_people (company_id, person_id) VALUES (?1, ?2)")
            .bind(company_id)
            .bind(&person.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error("add team member", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit team member: {}", e)))?;
        Ok(person)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Person>> {
        sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM people WHERE id = ?1",
            PERSON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find person by id: {}", e)))
    }

    /// Replace every field of a person
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: PersonRequest) -> Result<Person> {
        let name = request.validated_name()?;

        sqlx::query_as::<_, Person>(&format!(
            "UPDATE people SET name = ?1, country = ?2, linkedin = ?3, role = ?4, \
             status = COALESCE(?5, status) WHERE id = ?6 RETURNING {}",
            PERSON_COLUMNS
        ))
        .bind(name)
        .bind(request.country)
        .bind(request.linkedin)
        .bind(request.role)
        .bind(request.status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update person", e))?
        .ok_or_else(|| Error::NotFound("Person not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM people WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete person: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Name search for the admin list
    #[instrument(skip(self))]
    pub async fn list(&self, q: &Option<String>, page: PageRequest) -> Result<Vec<Person>> {
        let pattern = like_pattern(&non_blank(q).unwrap_or_default());
        sqlx::query_as::<_, Person>(&format!(
            "SELECT {} FROM people WHERE name LIKE ?1 ESCAPE '\\' \
             ORDER BY name COLLATE NOCASE LIMIT ?2 OFFSET ?3",
            PERSON_COLUMNS
        ))
        .bind(pattern)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list people: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>) -> Result<i64> {
        let pattern = like_pattern(&non_blank(q).unwrap_or_default());
        sqlx::query_scalar("SELECT COUNT(*) FROM people WHERE name LIKE ?1 ESCAPE '\\'")
            .bind(pattern)
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count people: {}", e)))
    }
}

async fn insert_person<'e, E>(executor: E, name: String, request: PersonRequest) -> Result<Person>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = Id::new().to_string();
    debug!("Creating person with id: {}", id);

    sqlx::query_as::<_, Person>(&format!(
        "INSERT INTO people (id, name, country, linkedin, role, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {}",
        PERSON_COLUMNS
    ))
    .bind(id)
    .bind(name)
    .bind(request.country)
    .bind(request.linkedin)
    .bind(request.role)
    .bind(request.status.unwrap_or_else(|| "active".to_string()))
    .fetch_one(executor)
    .await
    .map_err(|e| write_error("create person", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_db;

    #[tokio::test]
    async fn test_person_crud() {
        let db = create_test_db().await;
        let repo = PersonRepository::new(db.pool());

        let person = repo
            .create(PersonRequest {
                name: "Timur".to_string(),
                role: Some("CTO".to_string()),
                ..Default::default()
            })
            .await
            .expect("create");
        assert_eq!(person.status, "active");

        let updated = repo
            .update(
                &person.id,
                PersonRequest {
                    name: "Timur B.".to_string(),
                    linkedin: Some("https://linkedin.com/in/timur".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.name, "Timur B.");
        assert_eq!(updated.role, None);
        assert_eq!(updated.status, "active");

        let listed = repo
            .list(&Some("timur".to_string()), PageRequest::default())
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(repo.count(&None).await.expect("count"), 1);

        assert!(repo.delete(&person.id).await.expect("delete"));
        assert!(repo.find_by_id(&person.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn test_person_requires_name() {
        let db = create_test_db().await;
        let repo = PersonRepository::new(db.pool());
        let err = repo
            .create(PersonRequest::default())
            .await
            .expect_err("blank name");
        assert!(matches!(err, Error::Validation(_)));

        let missing = repo
            .update(
                "missing",
                PersonRequest {
                    name: "X".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_team_member_creation_is_all_or_nothing() {
        let db = create_test_db().await;
        let repo = PersonRepository::new(db.pool());
        let request = PersonRequest {
            name: "Dana".to_string(),
            ..Default::default()
        };

        // no such company, so the membership insert fails its foreign key
        let err = repo
            .create_for_company("no-such-company", request.clone())
            .await
            .expect_err("dangling company");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(repo.count(&None).await.expect("count"), 0);

        let company = crate::CompanyRepository::new(db.pool())
            .create(crate::CreateCompanyRequest {
                name: "Silk Route".to_string(),
                ..Default::default()
            })
            .await
            .expect("company");
        let person = repo
            .create_for_company(&company.id, request)
            .await
            .expect("team member");
        let team = crate::CompanyRepository::new(db.pool())
            .team(&company.id)
            .await
            .expect("team");
        assert_eq!(team, vec![person]);
    }
}
