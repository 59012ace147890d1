//! ABOUTME: Investor repository with directory search, team and portfolio links
//! ABOUTME: Focus and stage filter lists are derived from comma separated columns

use super::companies::Company;
use super::people::Person;
use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

pub(crate) const INVESTOR_COLUMNS: &str = "id, name, description, country, focus, stages, website, \
     investor_type, logo, status, created_at, updated_at";

pub const INVESTOR_TYPES: [&str; 2] = ["angel", "venture"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Investor {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub focus: Option<String>,
    pub stages: Option<String>,
    pub website: Option<String>,
    pub investor_type: String,
    pub logo: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInvestorRequest {
    pub name: String,
    pub description: Option<String>,
    pub country: Option<String>,
    pub focus: Option<String>,
    pub stages: Option<String>,
    pub website: Option<String>,
    pub investor_type: Option<String>,
    pub logo: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInvestorRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub focus: Option<String>,
    pub stages: Option<String>,
    pub website: Option<String>,
    pub investor_type: Option<String>,
    pub logo: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestorFilter {
    pub q: Option<String>,
    pub country: Option<String>,
    /// Substring of the focus list
    pub focus: Option<String>,
    /// Substring of the stages list
    pub stages: Option<String>,
    pub status: Option<String>,
}

impl InvestorFilter {
    pub fn active() -> Self {
        Self {
            status: Some("active".to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvestorFilterOptions {
    pub countries: Vec<String>,
    pub focus: Vec<String>,
    pub stages: Vec<String>,
}

fn validate_type(investor_type: &str) -> Result<()> {
    if INVESTOR_TYPES.contains(&investor_type) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Investor type must be one of: {}",
            INVESTOR_TYPES.join(", ")
        )))
    }
}

/// Split comma separated values, trim, drop blanks, dedupe and sort
pub(crate) fn split_comma_values<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    values
        .into_iter()
        .flat_map(|v| {
            v.split(',')
                .map(|part| part.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|part| !part.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct InvestorRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InvestorRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateInvestorRequest) -> Result<Investor> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("Investor name is required".to_string()));
        }
        let investor_type = request
            .investor_type
            .unwrap_or_else(|| "angel".to_string());
        validate_type(&investor_type)?;

        let id = Id::new().to_string();
        let now = now_iso8601();
        debug!("Creating investor with id: {}", id);

        sqlx::query_as::<_, Investor>(&format!(
            r#"
            INSERT INTO investors (id, name, description, country, focus, stages, website,
                                   investor_type, logo, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            RETURNING {}
            "#,
            INVESTOR_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(request.description)
        .bind(request.country)
        .bind(request.focus)
        .bind(request.stages)
        .bind(request.website)
        .bind(investor_type)
        .bind(request.logo)
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create investor", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Investor>> {
        sqlx::query_as::<_, Investor>(&format!(
            "SELECT {} FROM investors WHERE id = ?1",
            INVESTOR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find investor by id: {}", e)))
    }

    /// Filtered page ordered by name
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        filter: &InvestorFilter,
        page: PageRequest,
    ) -> Result<Vec<Investor>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM investors WHERE 1=1",
            INVESTOR_COLUMNS
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY name COLLATE NOCASE LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        qb.build_query_as::<Investor>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search investors: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, filter: &InvestorFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM investors WHERE 1=1");
        push_filters(&mut qb, filter);
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count investors: {}", e)))
    }

    /// Dropdown values for the directory page
    #[instrument(skip(self))]
    pub async fn filter_options(&self) -> Result<InvestorFilterOptions> {
        let countries = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT country FROM investors \
             WHERE country IS NOT NULL AND TRIM(country) != '' ORDER BY country",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list investor countries: {}", e)))?;

        let focus = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT focus FROM investors WHERE focus IS NOT NULL",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list investor focus: {}", e)))?;

        let stages = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT stages FROM investors WHERE stages IS NOT NULL",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list investor stages: {}", e)))?;

        Ok(InvestorFilterOptions {
            countries,
            focus: split_comma_values(focus),
            stages: split_comma_values(stages),
        })
    }

    #[instrument(skip(self))]
    pub async fn latest(&self, limit: i64) -> Result<Vec<Investor>> {
        sqlx::query_as::<_, Investor>(&format!(
            "SELECT {} FROM investors WHERE status = 'active' ORDER BY created_at DESC LIMIT ?1",
            INVESTOR_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list latest investors: {}", e)))
    }

    /// Every investor as (id, name)
    #[instrument(skip(self))]
    pub async fn options(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT id, name FROM investors ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list investor options: {}", e)))
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateInvestorRequest) -> Result<Investor> {
        if let Some(name) = &request.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("Investor name is required".to_string()));
            }
        }
        if let Some(investor_type) = &request.investor_type {
            validate_type(investor_type)?;
        }

        let now = now_iso8601();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let current = sqlx::query_as::<_, Investor>(&format!(
            "SELECT {} FROM investors WHERE id = ?1",
            INVESTOR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to find investor by id: {}", e)))?
        .ok_or_else(|| Error::NotFound("Investor not found".to_string()))?;

        let investor = sqlx::query_as::<_, Investor>(&format!(
            r#"
            UPDATE investors
            SET name = ?1, description = ?2, country = ?3, focus = ?4, stages = ?5,
                website = ?6, investor_type = ?7, logo = ?8, status = ?9, updated_at = ?10
            WHERE id = ?11
            RETURNING {}
            "#,
            INVESTOR_COLUMNS
        ))
        .bind(request.name.map(|n| n.trim().to_string()).unwrap_or(current.name))
        .bind(request.description.or(current.description))
        .bind(request.country.or(current.country))
        .bind(request.focus.or(current.focus))
        .bind(request.stages.or(current.stages))
        .bind(request.website.or(current.website))
        .bind(request.investor_type.unwrap_or(current.investor_type))
        .bind(request.logo.or(current.logo))
        .bind(request.status.unwrap_or(current.status))
        .bind(&now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error("update investor", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!("Updated investor: {}", investor.id);
        Ok(investor)
    }

    /// Unlink owning users, then delete the investor
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("UPDATE users SET investor_id = NULL WHERE investor_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to unlink investor users: {}", e)))?;

        let result = sqlx::query("DELETE FROM investors WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete investor: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn team(&self, investor_id: &str) -> Result<Vec<Person>> {
        sqlx::query_as::<_, Person>(
            r#"
            SELECT p.id, p.name, p.country, p.linkedin, p.role, p.status
            FROM people p
            JOIN investor_people ip ON ip.person_id = p.id
            WHERE ip.investor_id = ?1
            ORDER BY p.name COLLATE NOCASE
            "#,
        )
        .bind(investor_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to load investor team: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn add_team_member(&self, investor_id: &str, person_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO investor_people (investor_id, person_id) VALUES (?1, ?2)",
        )
        .bind(investor_id)
        .bind(person_id)
        .execute(self.pool)
        .await
        .map_err(|e| write_error("add investor team member", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_team_member(&self, investor_id: &str, person_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM investor_people WHERE investor_id = ?1 AND person_id = ?2")
                .bind(investor_id)
                .bind(person_id)
                .execute(self.pool)
                .await
                .map_err(|e| {
                    Error::Database(format!("Failed to remove investor team member: {}", e))
                })?;
        Ok(result.rows_affected() > 0)
    }

    /// Companies directly linked as portfolio
    #[instrument(skip(self))]
    pub async fn portfolio_companies(&self, investor_id: &str) -> Result<Vec<Company>> {
        sqlx::query_as::<_, Company>(
            r#"
            SELECT c.id, c.name, c.description, c.country, c.city, c.stage, c.industry,
                   c.founded_date, c.website, c.logo, c.status, c.created_by,
                   c.created_at, c.updated_at
            FROM companies c
            JOIN investor_companies ic ON ic.company_id = c.id
            WHERE ic.investor_id = ?1
            ORDER BY c.name COLLATE NOCASE
            "#,
        )
        .bind(investor_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to load portfolio companies: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn add_portfolio_company(&self, investor_id: &str, company_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO investor_companies (investor_id, company_id) VALUES (?1, ?2)",
        )
        .bind(investor_id)
        .bind(company_id)
        .execute(self.pool)
        .await
        .map_err(|e| write_error("add portfolio company", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_portfolio_company(
        &self,
        investor_id: &str,
        company_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM investor_companies WHERE investor_id = ?1 AND company_id = ?2",
        )
        .bind(investor_id)
        .bind(company_id)
        .execute(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to remove portfolio company: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &InvestorFilter) {
    if let Some(q) = non_blank(&filter.q) {
        qb.push(" AND name LIKE ")
            .push_bind(like_pattern(&q))
            .push(" ESCAPE '\\'");
    }
    if let Some(country) = non_blank(&filter.country) {
        qb.push(" AND country = ").push_bind(country);
    }
    if let Some(focus) = non_blank(&filter.focus) {
        qb.push(" AND focus LIKE ")
            .push_bind(like_pattern(&focus))
            .push(" ESCAPE '\\'");
    }
    if let Some(stages) = non_blank(&filter.stages) {
        qb.push(" AND stages LIKE ")
            .push_bind(like_pattern(&stages))
            .push(" ESCAPE '\\'");
    }
    if let Some(status) = non_blank(&filter.status) {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repositories::companies::{tests::company, CompanyRepository};
    use crate::repositories::users::{tests::sample_user, Role, UserRepository};
    use crate::test_helpers::create_test_db;

    pub(crate) fn investor(name: &str, focus: &str, stages: &str) -> CreateInvestorRequest {
        CreateInvestorRequest {
            name: name.to_string(),
            country: Some("Kazakhstan".to_string()),
            focus: Some(focus.to_string()),
            stages: Some(stages.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_comma_values() {
        let values = vec![
            "Fintech, Edtech".to_string(),
            " edtech ,Fintech,,".to_string(),
            "Agro".to_string(),
        ];
        assert_eq!(
            split_comma_values(values),
            vec!["Agro", "Edtech", "Fintech", "edtech"]
        );
    }

    #[tokio::test]
    async fn test_create_defaults_and_type_validation() {
        let db = create_test_db().await;
        let repo = InvestorRepository::new(db.pool());

        let created = repo
            .create(investor("Steppe Capital", "Fintech", "Seed"))
            .await
            .expect("create");
        assert_eq!(created.investor_type, "angel");

        let err = repo
            .create(CreateInvestorRequest {
                investor_type: Some("hedge".to_string()),
                ..investor("Bad Type", "Fintech", "Seed")
            })
            .await
            .expect_err("invalid type");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_and_filter_lists() {
        let db = create_test_db().await;
        let repo = InvestorRepository::new(db.pool());

        repo.create(investor("Steppe Capital", "Fintech, Edtech", "Seed, Series A"))
            .await
            .expect("create");
        repo.create(investor("Altai Angels", "Agro", "Pre-seed"))
            .await
            .expect("create");

        let fintech = InvestorFilter {
            focus: Some("fintech".to_string()),
            ..InvestorFilter::active()
        };
        let found = repo.search(&fintech, PageRequest::default()).await.expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Steppe Capital");

        let all = repo
            .search(&InvestorFilter::active(), PageRequest::default())
            .await
            .expect("search");
        assert_eq!(all[0].name, "Altai Angels");
        assert_eq!(repo.count(&InvestorFilter::default()).await.expect("count"), 2);

        let options = repo.filter_options().await.expect("options");
        assert_eq!(options.countries, vec!["Kazakhstan"]);
        assert_eq!(options.focus, vec!["Agro", "Edtech", "Fintech"]);
        assert_eq!(options.stages, vec!["Pre-seed", "Seed", "Series A"]);
    }

    #[tokio::test]
    async fn test_portfolio_links_and_delete_unlinks_users() {
        let db = create_test_db().await;
        let repo = InvestorRepository::new(db.pool());
        let companies = CompanyRepository::new(db.pool());
        let users = UserRepository::new(db.pool());

        let inv = repo
            .create(investor("Steppe Capital", "Fintech", "Seed"))
            .await
            .expect("create");
        let c = companies
            .create(company("Kaspi Lab", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");

        repo.add_portfolio_company(&inv.id, &c.id).await.expect("link");
        let portfolio = repo.portfolio_companies(&inv.id).await.expect("portfolio");
        assert_eq!(portfolio.len(), 1);
        assert_eq!(portfolio[0].name, "Kaspi Lab");
        assert!(repo
            .remove_portfolio_company(&inv.id, &c.id)
            .await
            .expect("unlink"));

        let owner = users
            .create(sample_user("owner@example.com", Role::Investor))
            .await
            .expect("user");
        users
            .link_investor(&owner.id, Some(&inv.id))
            .await
            .expect("link");

        assert!(repo.delete(&inv.id).await.expect("delete"));
        let owner = users.find_by_id(&owner.id).await.expect("q").expect("user");
        assert_eq!(owner.investor_id, None);
    }
}
