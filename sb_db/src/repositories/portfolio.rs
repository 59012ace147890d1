//! ABOUTME: Itemized investor portfolio entries with amount, date and valuation
//! ABOUTME: A normalized refinement of the free-text investors field on deals

use super::write_error;
use sb_core::{time::now_iso8601, time::parse_date, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PortfolioEntry {
    pub id: String,
    pub investor_id: String,
    pub company_id: String,
    pub amount: f64,
    pub date: String,
    pub valuation: Option<f64>,
    pub created_at: String,
}

/// Entry joined with the company name for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PortfolioEntryView {
    pub id: String,
    pub company_id: String,
    pub company_name: String,
    pub amount: f64,
    pub date: String,
    pub valuation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePortfolioEntryRequest {
    pub investor_id: String,
    pub company_id: String,
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub valuation: Option<f64>,
}

pub struct PortfolioRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PortfolioRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add an entry; amount and a `YYYY-MM-DD` date are mandatory
    #[instrument(skip(self, request))]
    pub async fn add(&self, request: CreatePortfolioEntryRequest) -> Result<PortfolioEntry> {
        let amount = request
            .amount
            .filter(|a| a.is_finite() && *a >= 0.0)
            .ok_or_else(|| Error::Validation("Amount is required".to_string()))?;
        let date = request
            .date
            .as_deref()
            .and_then(parse_date)
            .ok_or_else(|| Error::Validation("Date is required (YYYY-MM-DD)".to_string()))?;

        let id = Id::new().to_string();
        debug!("Adding portfolio entry {} for investor {}", id, request.investor_id);

        sqlx::query_as::<_, PortfolioEntry>(
            r#"
            INSERT INTO portfolio_entries (id, investor_id, company_id, amount, date, valuation, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id, investor_id, company_id, amount, date, valuation, created_at
            "#,
        )
        .bind(id)
        .bind(request.investor_id)
        .bind(request.company_id)
        .bind(amount)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(request.valuation)
        .bind(now_iso8601())
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("add portfolio entry", e))
    }

    /// Entries of an investor, newest first
    #[instrument(skip(self))]
    pub async fn list_by_investor(&self, investor_id: &str) -> Result<Vec<PortfolioEntryView>> {
        sqlx::query_as::<_, PortfolioEntryView>(
            r#"
            SELECT pe.id, pe.company_id, c.name AS company_name, pe.amount, pe.date, pe.valuation
            FROM portfolio_entries pe
            JOIN companies c ON c.id = pe.company_id
            WHERE pe.investor_id = ?1
            ORDER BY pe.date DESC
            "#,
        )
        .bind(investor_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list portfolio entries: {}", e)))
    }

    /// Delete an entry belonging to `investor_id`
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, investor_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM portfolio_entries WHERE id = ?1 AND investor_id = ?2")
                .bind(id)
                .bind(investor_id)
                .execute(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to delete portfolio entry: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::companies::{tests::company, CompanyRepository};
    use crate::repositories::investors::{tests::investor, InvestorRepository};
    use crate::test_helpers::create_test_db;

    #[tokio::test]
    async fn test_add_list_delete_entries() {
        let db = create_test_db().await;
        let inv = InvestorRepository::new(db.pool())
            .create(investor("Steppe Capital", "Fintech", "Seed"))
            .await
            .expect("investor");
        let c = CompanyRepository::new(db.pool())
            .create(company("Kaspi Lab", "Kazakhstan", "Seed", "Fintech"))
            .await
            .expect("company");
        let repo = PortfolioRepository::new(db.pool());

        let missing_amount = repo
            .add(CreatePortfolioEntryRequest {
                investor_id: inv.id.clone(),
                company_id: c.id.clone(),
                amount: None,
                date: Some("2024-01-01".to_string()),
                valuation: None,
            })
            .await;
        assert!(matches!(missing_amount, Err(Error::Validation(_))));

        let bad_date = repo
            .add(CreatePortfolioEntryRequest {
                investor_id: inv.id.clone(),
                company_id: c.id.clone(),
                amount: Some(1000.0),
                date: Some("yesterday".to_string()),
                valuation: None,
            })
            .await;
        assert!(matches!(bad_date, Err(Error::Validation(_))));

        let entry = repo
            .add(CreatePortfolioEntryRequest {
                investor_id: inv.id.clone(),
                company_id: c.id.clone(),
                amount: Some(250000.0),
                date: Some("2024-03-05".to_string()),
                valuation: Some(5_000_000.0),
            })
            .await
            .expect("add");

        let listed = repo.list_by_investor(&inv.id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].company_name, "Kaspi Lab");
        assert_eq!(listed[0].valuation, Some(5_000_000.0));

        assert!(!repo.delete(&entry.id, "other").await.expect("scoped delete"));
        assert!(repo.delete(&entry.id, &inv.id).await.expect("delete"));
    }
}
