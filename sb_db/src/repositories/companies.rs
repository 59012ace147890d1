//! ABOUTME: Company repository covering directory search, team links and similarity
//! ABOUTME: Filters are built with QueryBuilder so list and count share one WHERE clause

use super::people::Person;
use super::{like_pattern, non_blank, write_error, AutocompleteItem, PageRequest};
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

pub(crate) const COMPANY_COLUMNS: &str = "id, name, description, country, city, stage, industry, \
     founded_date, website, logo, status, created_by, created_at, updated_at";

/// Company (startup) entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub stage: Option<String>,
    pub industry: Option<String>,
    pub founded_date: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub status: String,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub stage: Option<String>,
    pub industry: Option<String>,
    pub founded_date: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub status: Option<String>,
    pub created_by: Option<String>,
}

/// Partial update; `None` keeps the stored value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub stage: Option<String>,
    pub industry: Option<String>,
    pub founded_date: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    pub status: Option<String>,
}

/// Directory filter; blank fields are ignored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyFilter {
    pub q: Option<String>,
    pub country: Option<String>,
    pub stage: Option<String>,
    pub industry: Option<String>,
    pub status: Option<String>,
}

impl CompanyFilter {
    /// Filter over active companies only
    pub fn active() -> Self {
        Self {
            status: Some("active".to_string()),
            ..Default::default()
        }
    }
}

/// Distinct values for the directory dropdowns
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterOptions {
    pub countries: Vec<String>,
    pub stages: Vec<String>,
    pub industries: Vec<String>,
}

pub struct CompanyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CompanyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateCompanyRequest) -> Result<Company> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("Company name is required".to_string()));
        }

        let id = Id::new().to_string();
        let now = now_iso8601();
        debug!("Creating company with id: {}", id);

        sqlx::query_as::<_, Company>(&format!(
            r#"
            INSERT INTO companies (id, name, description, country, city, stage, industry,
                                   founded_date, website, logo, status, created_by,
                                   created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            RETURNING {}
            "#,
            COMPANY_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(request.description)
        .bind(request.country)
        .bind(request.city)
        .bind(request.stage)
        .bind(request.industry)
        .bind(request.founded_date)
        .bind(request.website)
        .bind(request.logo)
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .bind(request.created_by)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create company", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Company>> {
        sqlx::query_as::<_, Company>(&format!(
            "SELECT {} FROM companies WHERE id = ?1",
            COMPANY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find company by id: {}", e)))
    }

    /// Filtered page ordered by name
    #[instrument(skip(self))]
    pub async fn search(&self, filter: &CompanyFilter, page: PageRequest) -> Result<Vec<Company>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM companies WHERE 1=1",
            COMPANY_COLUMNS
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY name COLLATE NOCASE LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let companies = qb
            .build_query_as::<Company>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search companies: {}", e)))?;

        debug!("Found {} companies", companies.len());
        Ok(companies)
    }

    #[instrument(skip(self))]
    pub async fn count(&self, filter: &CompanyFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM companies WHERE 1=1");
        push_filters(&mut qb, filter);
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count companies: {}", e)))
    }

    /// Distinct non-empty countries, stages and industries of active companies
    #[instrument(skip(self))]
    pub async fn filter_options(&self) -> Result<FilterOptions> {
        Ok(FilterOptions {
            countries: self.distinct("country").await?,
            stages: self.distinct("stage").await?,
            industries: self.distinct("industry").await?,
        })
    }

    async fn distinct(&self, column: &'static str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(&format!(
            "SELECT DISTINCT {col} FROM companies \
             WHERE status = 'active' AND {col} IS NOT NULL AND TRIM({col}) != '' \
             ORDER BY {col}",
            col = column
        ))
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list distinct {}: {}", column, e)))
    }

    /// Up to `limit` other active companies sharing country, stage or industry
    #[instrument(skip(self, company), fields(company_id = %company.id))]
    pub async fn similar(&self, company: &Company, limit: i64) -> Result<Vec<Company>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM companies WHERE status = 'active' AND id != ",
            COMPANY_COLUMNS
        ));
        qb.push_bind(company.id.clone());

        let shared: Vec<(&str, String)> = [
            ("country", &company.country),
            ("stage", &company.stage),
            ("industry", &company.industry),
        ]
        .into_iter()
        .filter_map(|(col, value)| non_blank(value).map(|v| (col, v)))
        .collect();

        if !shared.is_empty() {
            qb.push(" AND (");
            let mut separated = qb.separated(" OR ");
            for (column, value) in shared {
                separated.push(format!("{} = ", column));
                separated.push_bind_unseparated(value);
            }
            qb.push(")");
        }

        qb.push(" ORDER BY name COLLATE NOCASE LIMIT ").push_bind(limit);

        qb.build_query_as::<Company>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find similar companies: {}", e)))
    }

    /// Most recently added active companies
    #[instrument(skip(self))]
    pub async fn latest(&self, limit: i64) -> Result<Vec<Company>> {
        sqlx::query_as::<_, Company>(&format!(
            "SELECT {} FROM companies WHERE status = 'active' ORDER BY created_at DESC LIMIT ?1",
            COMPANY_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list latest companies: {}", e)))
    }

    /// Name matches for admin pickers, labelled "Name, CC"
    #[instrument(skip(self))]
    pub async fn autocomplete(&self, q: &str, limit: i64) -> Result<Vec<AutocompleteItem>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT id, name, country FROM companies WHERE name LIKE ?1 ESCAPE '\\' \
             ORDER BY name COLLATE NOCASE LIMIT ?2",
        )
        .bind(like_pattern(q))
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to autocomplete companies: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(id, name, country)| AutocompleteItem::labelled(id, &name, country.as_deref()))
            .collect())
    }

    /// Every company as (id, name), for select boxes
    #[instrument(skip(self))]
    pub async fn options(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT id, name FROM companies ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list company options: {}", e)))
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateCompanyRequest) -> Result<Company> {
        if let Some(name) = &request.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("Company name is required".to_string()));
            }
        }

        let now = now_iso8601();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let current = sqlx::query_as::<_, Company>(&format!(
            "SELECT {} FROM companies WHERE id = ?1",
            COMPANY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to find company by id: {}", e)))?
        .ok_or_else(|| Error::NotFound("Company not found".to_string()))?;

        let company = sqlx::query_as::<_, Company>(&format!(
            r#"
            UPDATE companies
            SET name = ?1, description = ?2, country = ?3, city = ?4, stage = ?5,
                industry = ?6, founded_date = ?7, website = ?8, logo = ?9, status = ?10,
                updated_at = ?11
            WHERE id = ?12
            RETURNING {}
            "#,
            COMPANY_COLUMNS
        ))
        .bind(request.name.map(|n| n.trim().to_string()).unwrap_or(current.name))
        .bind(request.description.or(current.description))
        .bind(request.country.or(current.country))
        .bind(request.city.or(current.city))
        .bind(request.stage.or(current.stage))
        .bind(request.industry.or(current.industry))
        .bind(request.founded_date.or(current.founded_date))
        .bind(request.website.or(current.website))
        .bind(request.logo.or(current.logo))
        .bind(request.status.unwrap_or(current.status))
        .bind(&now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error("update company", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!("Updated company: {}", company.id);
        Ok(company)
    }

    /// Delete a company; deals, jobs, pitches and links cascade
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM companies WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete company: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Team members ordered by name
    #[instrument(skip(self))]
    pub async fn team(&self, company_id: &str) -> Result<Vec<Person>> {
        sqlx::query_as::<_, Person>(
            r#"
            SELECT p.id, p.name, p.country, p.linkedin, p.role, p.status
            FROM people p
            JOIN company_people cp ON cp.person_id = p.id
            WHERE cp.company_id = ?1
            ORDER BY p.name COLLATE NOCASE
            "#,
        )
        .bind(company_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to load company team: {}", e)))
    }

    /// Link a person to the team; linking twice is a no-op
    #[instrument(skip(self))]
    pub async fn add_team_member(&self, company_id: &str, person_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO company_people (company_id, person_id) VALUES (?1, ?2)",
        )
        .bind(company_id)
        .bind(person_id)
        .execute(self.pool)
        .await
        .map_err(|e| write_error("add team member", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_team_member(&self, company_id: &str, person_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM company_people WHERE company_id = ?1 AND person_id = ?2")
                .bind(company_id)
                .bind(person_id)
                .execute(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to remove team member: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether `person_id` sits on this company's team
    #[instrument(skip(self))]
    pub async fn has_team_member(&self, company_id: &str, person_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM company_people WHERE company_id = ?1 AND person_id = ?2",
        )
        .bind(company_id)
        .bind(person_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to check team member: {}", e)))?;
        Ok(count > 0)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CompanyFilter) {
    if let Some(q) = non_blank(&filter.q) {
        let pattern = like_pattern(&q);
        qb.push(" AND (name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR description LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR industry LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(country) = non_blank(&filter.country) {
        qb.push(" AND country = ").push_bind(country);
    }
    if let Some(stage) = non_blank(&filter.stage) {
        qb.push(" AND stage = ").push_bind(stage);
    }
    if let Some(industry) = non_blank(&filter.industry) {
        qb.push(" AND industry = ").push_bind(industry);
    }
    if let Some(status) = non_blank(&filter.status) {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repositories::people::{PersonRepository, PersonRequest};
    use crate::test_helpers::create_test_db;

    pub(crate) fn company(name: &str, country: &str, stage: &str, industry: &str) -> CreateCompanyRequest {
        CreateCompanyRequest {
            name: name.to_string(),
            description: Some(format!("{} builds things", name)),
            country: Some(country.to_string()),
            city: Some("Almaty".to_string()),
            stage: Some(stage.to_string()),
            industry: Some(industry.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let db = create_test_db().await;
        let repo = CompanyRepository::new(db.pool());

        let err = repo
            .create(CreateCompanyRequest {
                name: "   ".to_string(),
                ..Default::default()
            })
            .await
            .expect_err("blank name should fail");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_filters_and_orders_by_name() {
        let db = create_test_db().await;
        let repo = CompanyRepository::new(db.pool());

        repo.create(company("Zeta Pay", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("create");
        repo.create(company("Alpha Health", "Kazakhstan", "Series A", "Healthtech"))
            .await
            .expect("create");
        repo.create(company("Bishkek Edu", "Kyrgyzstan", "Seed", "Edtech"))
            .await
            .expect("create");

        let all = repo
            .search(&CompanyFilter::active(), PageRequest::default())
            .await
            .expect("search");
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha Health", "Bishkek Edu", "Zeta Pay"]);

        let kz_seed = CompanyFilter {
            country: Some("Kazakhstan".to_string()),
            stage: Some("Seed".to_string()),
            ..CompanyFilter::active()
        };
        let found = repo.search(&kz_seed, PageRequest::default()).await.expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Zeta Pay");

        let text = CompanyFilter {
            q: Some("health".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.count(&text).await.expect("count"), 1);

        let options = repo.filter_options().await.expect("options");
        assert_eq!(options.countries, vec!["Kazakhstan", "Kyrgyzstan"]);
        assert_eq!(options.stages, vec!["Seed", "Series A"]);
    }

    #[tokio::test]
    async fn test_similar_companies_share_an_attribute() {
        let db = create_test_db().await;
        let repo = CompanyRepository::new(db.pool());

        let base = repo
            .create(company("Base", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("create");
        repo.create(company("Same Country", "Kazakhstan", "Growth", "Agro"))
            .await
            .expect("create");
        repo.create(company("Same Industry", "Uzbekistan", "Growth", "Fintech"))
            .await
            .expect("create");
        repo.create(company("Unrelated", "Uzbekistan", "Growth", "Agro"))
            .await
            .expect("create");

        let similar = repo.similar(&base, 6).await.expect("similar");
        let names: Vec<_> = similar.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Same Country", "Same Industry"]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = create_test_db().await;
        let repo = CompanyRepository::new(db.pool());
        let created = repo
            .create(company("Old Name", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("create");

        let updated = repo
            .update(
                &created.id,
                UpdateCompanyRequest {
                    name: Some("New Name".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.stage.as_deref(), Some("Seed"));

        let missing = repo.update("missing", UpdateCompanyRequest::default()).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        assert!(repo.delete(&created.id).await.expect("delete"));
        assert!(repo.find_by_id(&created.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn test_team_membership() {
        let db = create_test_db().await;
        let repo = CompanyRepository::new(db.pool());
        let people = PersonRepository::new(db.pool());

        let c = repo
            .create(company("Team Co", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("create");
        let person = people
            .create(PersonRequest {
                name: "Arman".to_string(),
                role: Some("CEO".to_string()),
                ..Default::default()
            })
            .await
            .expect("person");

        repo.add_team_member(&c.id, &person.id).await.expect("add");
        repo.add_team_member(&c.id, &person.id).await.expect("idempotent add");
        assert!(repo.has_team_member(&c.id, &person.id).await.expect("check"));

        let team = repo.team(&c.id).await.expect("team");
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].role.as_deref(), Some("CEO"));

        assert!(repo.remove_team_member(&c.id, &person.id).await.expect("remove"));
        assert!(repo.team(&c.id).await.expect("team").is_empty());
    }

    #[tokio::test]
    async fn test_autocomplete_labels_with_country_code() {
        let db = create_test_db().await;
        let repo = CompanyRepository::new(db.pool());
        repo.create(company("Kaspi Lab", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("create");

        let items = repo.autocomplete("kaspi", 20).await.expect("autocomplete");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Kaspi Lab, KA");
    }
}
