//! ABOUTME: Funding deal repository, including investor portfolio derivation
//! ABOUTME: Also aggregates yearly deal volume per company country for analytics

use super::{like_pattern, non_blank, write_error, PageRequest};
use sb_core::{Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

const DEAL_COLUMNS: &str =
    "id, company_id, deal_type, amount, valuation, date, currency_id, investors, status";

/// Label for deals whose company has no country
pub const UNKNOWN_COUNTRY: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Deal {
    pub id: String,
    pub company_id: Option<String>,
    pub deal_type: Option<String>,
    pub amount: Option<f64>,
    pub valuation: Option<f64>,
    pub date: Option<String>,
    pub currency_id: Option<String>,
    pub investors: Option<String>,
    pub status: String,
}

/// Deal joined with the fields pages show next to it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct DealWithCompany {
    pub id: String,
    pub company_id: Option<String>,
    pub deal_type: Option<String>,
    pub amount: Option<f64>,
    pub valuation: Option<f64>,
    pub date: Option<String>,
    pub investors: Option<String>,
    pub status: String,
    pub company_name: Option<String>,
    pub company_stage: Option<String>,
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDealRequest {
    pub company_id: Option<String>,
    pub deal_type: Option<String>,
    pub amount: Option<f64>,
    pub valuation: Option<f64>,
    pub date: Option<String>,
    pub currency_id: Option<String>,
    pub investors: Option<String>,
    pub status: Option<String>,
}

/// Yearly volume for one country
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CountryDealStats {
    pub country: String,
    pub total_amount: f64,
    pub deal_count: i64,
}

const JOINED_SELECT: &str = r#"
    SELECT d.id, d.company_id, d.deal_type, d.amount, d.valuation, d.date, d.investors,
           d.status, c.name AS company_name, c.stage AS company_stage,
           cur.code AS currency_code
    FROM deals d
    LEFT JOIN companies c ON c.id = d.company_id
    LEFT JOIN currencies cur ON cur.id = d.currency_id
"#;

pub struct DealRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DealRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateDealRequest) -> Result<Deal> {
        let id = Id::new().to_string();
        debug!("Creating deal with id: {}", id);

        sqlx::query_as::<_, Deal>(&format!(
            "INSERT INTO deals (id, company_id, deal_type, amount, valuation, date, currency_id, \
             investors, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) RETURNING {}",
            DEAL_COLUMNS
        ))
        .bind(id)
        .bind(request.company_id)
        .bind(request.deal_type)
        .bind(request.amount)
        .bind(request.valuation)
        .bind(request.date)
        .bind(request.currency_id)
        .bind(request.investors)
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create deal", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Deal>> {
        sqlx::query_as::<_, Deal>(&format!("SELECT {} FROM deals WHERE id = ?1", DEAL_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find deal by id: {}", e)))
    }

    /// Deals of one company, newest first
    #[instrument(skip(self))]
    pub async fn list_by_company(&self, company_id: &str) -> Result<Vec<DealWithCompany>> {
        sqlx::query_as::<_, DealWithCompany>(&format!(
            "{} WHERE d.company_id = ?1 ORDER BY d.date IS NULL, d.date DESC",
            JOINED_SELECT
        ))
        .bind(company_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list company deals: {}", e)))
    }

    /// Admin list; `q` matches investors text or deal type
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<Vec<DealWithCompany>> {
        let mut qb = QueryBuilder::<Sqlite>::new(JOINED_SELECT);
        qb.push(" WHERE 1=1");
        push_filters(&mut qb, q, status, "d.");
        qb.push(" ORDER BY d.date IS NULL, d.date DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        qb.build_query_as::<DealWithCompany>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list deals: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, q: &Option<String>, status: &Option<String>) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM deals WHERE 1=1");
        push_filters(&mut qb, q, status, "");
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count deals: {}", e)))
    }

    /// Deals whose investors text mentions `investor_name`, newest first.
    /// Matching is a case-sensitive substring test.
    #[instrument(skip(self))]
    pub async fn mentioning_investor(&self, investor_name: &str) -> Result<Vec<DealWithCompany>> {
        if investor_name.trim().is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, DealWithCompany>(&format!(
            "{} WHERE d.investors IS NOT NULL AND instr(d.investors, ?1) > 0 \
             AND c.id IS NOT NULL ORDER BY d.date IS NULL, d.date DESC",
            JOINED_SELECT
        ))
        .bind(investor_name)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to derive investor portfolio: {}", e)))
    }

    /// Years that have dated deals, newest first
    #[instrument(skip(self))]
    pub async fn years(&self) -> Result<Vec<i32>> {
        let years = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT substr(date, 1, 4) AS year FROM deals \
             WHERE date IS NOT NULL AND length(date) >= 4 ORDER BY year DESC",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list deal years: {}", e)))?;

        Ok(years.into_iter().filter_map(|y| y.parse().ok()).collect())
    }

    /// Sum and count of a year's deals per company country, largest sum first
    #[instrument(skip(self))]
    pub async fn analytics_by_year(&self, year: i32) -> Result<Vec<CountryDealStats>> {
        sqlx::query_as::<_, CountryDealStats>(
            r#"
            SELECT COALESCE(NULLIF(TRIM(c.country), ''), ?1) AS country,
                   CAST(COALESCE(SUM(d.amount), 0) AS REAL) AS total_amount,
                   COUNT(*) AS deal_count
            FROM deals d
            LEFT JOIN companies c ON c.id = d.company_id
            WHERE d.date IS NOT NULL AND substr(d.date, 1, 4) = ?2
            GROUP BY 1
            ORDER BY total_amount DESC, country
            "#,
        )
        .bind(UNKNOWN_COUNTRY)
        .bind(format!("{:04}", year))
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to aggregate deals: {}", e)))
    }

    /// Replace every field of a deal
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: CreateDealRequest) -> Result<Deal> {
        sqlx::query_as::<_, Deal>(&format!(
            "UPDATE deals SET company_id = ?1, deal_type = ?2, amount = ?3, valuation = ?4, \
             date = ?5, currency_id = ?6, investors = ?7, status = COALESCE(?8, status) \
             WHERE id = ?9 RETURNING {}",
            DEAL_COLUMNS
        ))
        .bind(request.company_id)
        .bind(request.deal_type)
        .bind(request.amount)
        .bind(request.valuation)
        .bind(request.date)
        .bind(request.currency_id)
        .bind(request.investors)
        .bind(request.status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update deal", e))?
        .ok_or_else(|| Error::NotFound("Deal not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM deals WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete deal: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete only if the deal belongs to `company_id`
    #[instrument(skip(self))]
    pub async fn delete_for_company(&self, id: &str, company_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM deals WHERE id = ?1 AND company_id = ?2")
            .bind(id)
            .bind(company_id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete deal: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    q: &Option<String>,
    status: &Option<String>,
    alias: &str,
) {
    if let Some(q) = non_blank(q) {
        let pattern = like_pattern(&q);
        qb.push(format!(" AND ({}investors LIKE ", alias))
            .push_bind(pattern.clone())
            .push(format!(" ESCAPE '\\' OR {}deal_type LIKE ", alias))
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(status) = non_blank(status) {
        qb.push(format!(" AND {}status = ", alias)).push_bind(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::companies::{tests::company, CompanyRepository};
    use crate::test_helpers::create_test_db;

    fn deal(company_id: &str, amount: f64, date: &str, investors: &str) -> CreateDealRequest {
        CreateDealRequest {
            company_id: Some(company_id.to_string()),
            deal_type: Some("Seed".to_string()),
            amount: Some(amount),
            date: Some(date.to_string()),
            investors: Some(investors.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_company_deals_newest_first() {
        let db = create_test_db().await;
        let companies = CompanyRepository::new(db.pool());
        let repo = DealRepository::new(db.pool());
        let c = companies
            .create(company("Kaspi Lab", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");

        repo.create(deal(&c.id, 100.0, "2022-03-01", "A")).await.expect("deal");
        repo.create(deal(&c.id, 200.0, "2024-01-15", "B")).await.expect("deal");
        repo.create(CreateDealRequest {
            company_id: Some(c.id.clone()),
            ..Default::default()
        })
        .await
        .expect("undated deal");

        let deals = repo.list_by_company(&c.id).await.expect("list");
        let dates: Vec<_> = deals.iter().map(|d| d.date.clone()).collect();
        assert_eq!(
            dates,
            vec![
                Some("2024-01-15".to_string()),
                Some("2022-03-01".to_string()),
                None
            ]
        );
        assert_eq!(deals[0].company_name.as_deref(), Some("Kaspi Lab"));
    }

    #[tokio::test]
    async fn test_portfolio_derived_from_investor_mentions() {
        let db = create_test_db().await;
        let companies = CompanyRepository::new(db.pool());
        let repo = DealRepository::new(db.pool());
        let a = companies
            .create(company("Alpha", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let b = companies
            .create(company("Beta", "Uzbekistan", "Seed", "Agro"))
            .await
            .expect("company");

        repo.create(deal(&a.id, 1.0, "2023-05-01", "Steppe Capital, Altai Angels"))
            .await
            .expect("deal");
        repo.create(deal(&b.id, 2.0, "2024-05-01", "Steppe Capital"))
            .await
            .expect("deal");
        repo.create(deal(&b.id, 3.0, "2024-06-01", "steppe capital"))
            .await
            .expect("deal");

        let portfolio = repo
            .mentioning_investor("Steppe Capital")
            .await
            .expect("portfolio");
        let names: Vec<_> = portfolio
            .iter()
            .map(|d| d.company_name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["Beta", "Alpha"]);
        assert!(repo.mentioning_investor("  ").await.expect("empty").is_empty());
    }

    #[tokio::test]
    async fn test_analytics_buckets_by_country() {
        let db = create_test_db().await;
        let companies = CompanyRepository::new(db.pool());
        let repo = DealRepository::new(db.pool());
        let kz = companies
            .create(company("Alpha", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let uz = companies
            .create(company("Beta", "Uzbekistan", "Seed", "Agro"))
            .await
            .expect("company");

        repo.create(deal(&kz.id, 100.0, "2024-01-01", "X")).await.expect("deal");
        repo.create(deal(&kz.id, 50.0, "2024-02-01", "X")).await.expect("deal");
        repo.create(deal(&uz.id, 500.0, "2024-03-01", "X")).await.expect("deal");
        repo.create(deal(&uz.id, 999.0, "2023-03-01", "X")).await.expect("deal");
        repo.create(CreateDealRequest {
            amount: Some(10.0),
            date: Some("2024-04-01".to_string()),
            ..Default::default()
        })
        .await
        .expect("orphan deal");

        assert_eq!(repo.years().await.expect("years"), vec![2024, 2023]);

        let stats = repo.analytics_by_year(2024).await.expect("stats");
        assert_eq!(
            stats,
            vec![
                CountryDealStats {
                    country: "Uzbekistan".to_string(),
                    total_amount: 500.0,
                    deal_count: 1
                },
                CountryDealStats {
                    country: "Kazakhstan".to_string(),
                    total_amount: 150.0,
                    deal_count: 2
                },
                CountryDealStats {
                    country: UNKNOWN_COUNTRY.to_string(),
                    total_amount: 10.0,
                    deal_count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_scoped_delete_and_update() {
        let db = create_test_db().await;
        let companies = CompanyRepository::new(db.pool());
        let repo = DealRepository::new(db.pool());
        let mine = companies
            .create(company("Mine", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let other = companies
            .create(company("Other", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let d = repo.create(deal(&mine.id, 1.0, "2024-01-01", "X")).await.expect("deal");

        assert!(!repo.delete_for_company(&d.id, &other.id).await.expect("delete"));

        let updated = repo
            .update(&d.id, deal(&mine.id, 5.0, "2024-02-02", "Y"))
            .await
            .expect("update");
        assert_eq!(updated.amount, Some(5.0));
        assert_eq!(updated.status, "active");

        assert_eq!(
            repo.count(&Some("y".to_string()), &None).await.expect("count"),
            1
        );
        assert!(repo.delete_for_company(&d.id, &mine.id).await.expect("delete"));
    }
}
