//! ABOUTME: Reference data: countries, cities, categories, company stages and currencies
//! ABOUTME: Name-only tables share one implementation keyed by NamedTable

use super::{like_pattern, non_blank, write_error, AutocompleteItem};
use sb_core::{Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Row shape shared by countries, categories and company stages
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct NamedEntry {
    pub id: String,
    pub name: String,
    pub status: String,
}

pub type Country = NamedEntry;
pub type Category = NamedEntry;
pub type CompanyStage = NamedEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedTable {
    Countries,
    Categories,
    CompanyStages,
}

impl NamedTable {
    fn table(&self) -> &'static str {
        match self {
            NamedTable::Countries => "countries",
            NamedTable::Categories => "categories",
            NamedTable::CompanyStages => "company_stages",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NamedTable::Countries => "country",
            NamedTable::Categories => "category",
            NamedTable::CompanyStages => "company stage",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct City {
    pub id: String,
    pub name: String,
    pub country_id: String,
    pub status: String,
}

/// City joined with its country name
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CityView {
    pub id: String,
    pub name: String,
    pub country_id: String,
    pub country_name: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Currency {
    pub id: String,
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
    pub status: String,
}

fn required(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{} is required", what)));
    }
    Ok(value.to_string())
}

pub struct ReferenceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReferenceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Entries ordered by name, optionally filtered by name and active status
    #[instrument(skip(self))]
    pub async fn list_named(
        &self,
        table: NamedTable,
        q: &Option<String>,
        active_only: bool,
    ) -> Result<Vec<NamedEntry>> {
        sqlx::query_as::<_, NamedEntry>(&format!(
            "SELECT id, name, status FROM {} WHERE name LIKE ?1 ESCAPE '\\' \
             AND (?2 = 0 OR status = 'active') ORDER BY name COLLATE NOCASE",
            table.table()
        ))
        .bind(like_pattern(&non_blank(q).unwrap_or_default()))
        .bind(active_only)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list {}: {}", table.table(), e)))
    }

    #[instrument(skip(self))]
    pub async fn find_named(&self, table: NamedTable, id: &str) -> Result<Option<NamedEntry>> {
        sqlx::query_as::<_, NamedEntry>(&format!(
            "SELECT id, name, status FROM {} WHERE id = ?1",
            table.table()
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find {}: {}", table.label(), e)))
    }

    /// Insert a new entry; names are unique per table
    #[instrument(skip(self))]
    pub async fn create_named(&self, table: NamedTable, name: &str) -> Result<NamedEntry> {
        let name = required(name, "Name")?;
        debug!("Creating {} {}", table.label(), name);

        sqlx::query_as::<_, NamedEntry>(&format!(
            "INSERT INTO {} (id, name, status) VALUES (?1, ?2, 'active') \
             RETURNING id, name, status",
            table.table()
        ))
        .bind(Id::new().to_string())
        .bind(name)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error(&format!("create {}", table.label()), e))
    }

    #[instrument(skip(self))]
    pub async fn update_named(
        &self,
        table: NamedTable,
        id: &str,
        name: &str,
        status: &str,
    ) -> Result<NamedEntry> {
        let name = required(name, "Name")?;
        sqlx::query_as::<_, NamedEntry>(&format!(
            "UPDATE {} SET name = ?1, status = ?2 WHERE id = ?3 RETURNING id, name, status",
            table.table()
        ))
        .bind(name)
        .bind(status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error(&format!("update {}", table.label()), e))?
        .ok_or_else(|| Error::NotFound(format!("{} not found", table.label())))
    }

    /// Delete an entry; a country takes its cities with it
    #[instrument(skip(self))]
    pub async fn delete_named(&self, table: NamedTable, id: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        if table == NamedTable::Countries {
            sqlx::query("DELETE FROM cities WHERE country_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::Database(format!("Failed to delete cities: {}", e)))?;
        }

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", table.table()))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete {}: {}", table.label(), e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Active countries by name
    pub async fn countries(&self) -> Result<Vec<Country>> {
        self.list_named(NamedTable::Countries, &None, true).await
    }

    /// Cities with country names, optionally for one country
    #[instrument(skip(self))]
    pub async fn cities(&self, country_id: Option<&str>, q: &Option<String>) -> Result<Vec<CityView>> {
        sqlx::query_as::<_, CityView>(
            r#"
            SELECT ci.id, ci.name, ci.country_id, co.name AS country_name, ci.status
            FROM cities ci
            JOIN countries co ON co.id = ci.country_id
            WHERE (?1 IS NULL OR ci.country_id = ?1) AND ci.name LIKE ?2 ESCAPE '\'
            ORDER BY co.name COLLATE NOCASE, ci.name COLLATE NOCASE
            "#,
        )
        .bind(country_id)
        .bind(like_pattern(&non_blank(q).unwrap_or_default()))
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list cities: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn find_city(&self, id: &str) -> Result<Option<City>> {
        sqlx::query_as::<_, City>("SELECT id, name, country_id, status FROM cities WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find city: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn create_city(&self, name: &str, country_id: &str) -> Result<City> {
        let name = required(name, "City name")?;
        sqlx::query_as::<_, City>(
            "INSERT INTO cities (id, name, country_id, status) VALUES (?1, ?2, ?3, 'active') \
             RETURNING id, name, country_id, status",
        )
        .bind(Id::new().to_string())
        .bind(name)
        .bind(country_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create city", e))
    }

    #[instrument(skip(self))]
    pub async fn update_city(
        &self,
        id: &str,
        name: &str,
        country_id: &str,
        status: &str,
    ) -> Result<City> {
        let name = required(name, "City name")?;
        sqlx::query_as::<_, City>(
            "UPDATE cities SET name = ?1, country_id = ?2, status = ?3 WHERE id = ?4 \
             RETURNING id, name, country_id, status",
        )
        .bind(name)
        .bind(country_id)
        .bind(status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update city", e))?
        .ok_or_else(|| Error::NotFound("City not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete_city(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cities WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete city: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    /// City picker entries labelled "Name, CC"
    #[instrument(skip(self))]
    pub async fn city_search(&self, q: &str, limit: i64) -> Result<Vec<AutocompleteItem>> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT ci.id, ci.name, co.name
            FROM cities ci
            JOIN countries co ON co.id = ci.country_id
            WHERE ci.name LIKE ?1 ESCAPE '\'
            ORDER BY ci.name COLLATE NOCASE
            LIMIT ?2
            "#,
        )
        .bind(like_pattern(q))
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to search cities: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(id, name, country)| {
                let mut item = AutocompleteItem::labelled(id, &name, Some(&country));
                item.country = Some(country);
                item
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn currencies(&self, active_only: bool) -> Result<Vec<Currency>> {
        sqlx::query_as::<_, Currency>(
            "SELECT id, code, name, symbol, status FROM currencies \
             WHERE (?1 = 0 OR status = 'active') ORDER BY code",
        )
        .bind(active_only)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list currencies: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn find_currency(&self, id: &str) -> Result<Option<Currency>> {
        sqlx::query_as::<_, Currency>(
            "SELECT id, code, name, symbol, status FROM currencies WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find currency: {}", e)))
    }

    /// Codes are stored upper-case and must be unique
    #[instrument(skip(self))]
    pub async fn create_currency(
        &self,
        code: &str,
        name: &str,
        symbol: Option<&str>,
    ) -> Result<Currency> {
        let code = required(code, "Currency code")?.to_uppercase();
        let name = required(name, "Currency name")?;
        sqlx::query_as::<_, Currency>(
            "INSERT INTO currencies (id, code, name, symbol, status) \
             VALUES (?1, ?2, ?3, ?4, 'active') RETURNING id, code, name, symbol, status",
        )
        .bind(Id::new().to_string())
        .bind(code)
        .bind(name)
        .bind(symbol)
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create currency", e))
    }

    #[instrument(skip(self))]
    pub async fn update_currency(
        &self,
        id: &str,
        code: &str,
        name: &str,
        symbol: Option<&str>,
        status: &str,
    ) -> Result<Currency> {
        let code = required(code, "Currency code")?.to_uppercase();
        let name = required(name, "Currency name")?;
        sqlx::query_as::<_, Currency>(
            "UPDATE currencies SET code = ?1, name = ?2, symbol = ?3, status = ?4 WHERE id = ?5 \
             RETURNING id, code, name, symbol, status",
        )
        .bind(code)
        .bind(name)
        .bind(symbol)
        .bind(status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update currency", e))?
        .ok_or_else(|| Error::NotFound("Currency not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete_currency(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM currencies WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete currency: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_db;

    #[tokio::test]
    async fn test_named_tables_enforce_unique_names() {
        let db = create_test_db().await;
        let repo = ReferenceRepository::new(db.pool());

        repo.create_named(NamedTable::Categories, "Fintech")
            .await
            .expect("create");
        let dup = repo.create_named(NamedTable::Categories, "Fintech").await;
        assert!(matches!(dup, Err(Error::Conflict(_))));

        let stage = repo
            .create_named(NamedTable::CompanyStages, "Seed")
            .await
            .expect("create");
        let renamed = repo
            .update_named(NamedTable::CompanyStages, &stage.id, "Pre-seed", "inactive")
            .await
            .expect("update");
        assert_eq!(renamed.name, "Pre-seed");

        let active = repo
            .list_named(NamedTable::CompanyStages, &None, true)
            .await
            .expect("list");
        assert!(active.is_empty());
        let all = repo
            .list_named(NamedTable::CompanyStages, &None, false)
            .await
            .expect("list");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_country_removes_cities() {
        let db = create_test_db().await;
        let repo = ReferenceRepository::new(db.pool());

        let kz = repo
            .create_named(NamedTable::Countries, "Kazakhstan")
            .await
            .expect("country");
        let uz = repo
            .create_named(NamedTable::Countries, "Uzbekistan")
            .await
            .expect("country");
        repo.create_city("Almaty", &kz.id).await.expect("city");
        repo.create_city("Astana", &kz.id).await.expect("city");
        repo.create_city("Tashkent", &uz.id).await.expect("city");

        assert_eq!(repo.cities(Some(&kz.id), &None).await.expect("cities").len(), 2);

        let items = repo.city_search("alm", 20).await.expect("search");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Almaty, KA");
        assert_eq!(items[0].country.as_deref(), Some("Kazakhstan"));

        assert!(repo
            .delete_named(NamedTable::Countries, &kz.id)
            .await
            .expect("delete"));
        let remaining = repo.cities(None, &None).await.expect("cities");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].country_name, "Uzbekistan");
    }

    #[tokio::test]
    async fn test_city_requires_existing_country() {
        let db = create_test_db().await;
        let repo = ReferenceRepository::new(db.pool());
        let err = repo.create_city("Nowhere", "missing").await;
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_currency_codes_are_uppercased_and_unique() {
        let db = create_test_db().await;
        let repo = ReferenceRepository::new(db.pool());

        let kzt = repo
            .create_currency("kzt", "Tenge", Some("₸"))
            .await
            .expect("create");
        assert_eq!(kzt.code, "KZT");
        assert!(matches!(
            repo.create_currency("KZT", "Tenge again", None).await,
            Err(Error::Conflict(_))
        ));

        repo.update_currency(&kzt.id, "KZT", "Kazakh tenge", Some("₸"), "inactive")
            .await
            .expect("update");
        assert!(repo.currencies(true).await.expect("list").is_empty());
        assert!(repo.delete_currency(&kzt.id).await.expect("delete"));
    }
}
