//! ABOUTME: Admin sections for reference data: countries, categories, stages, cities, currencies
//! ABOUTME: The three name-only tables share one generic resource keyed by NamedTable

use super::{page_of, register, AdminCtx, AdminResource, FormData, STATUSES};
use crate::views::{same_options, AdminRow, FormField};
use actix_web::web;
use async_trait::async_trait;
use sb_core::Result;
use sb_db::{NamedTable, PageRequest, ReferenceRepository};
use std::marker::PhantomData;

fn status_field(value: &str) -> FormField {
    FormField::text("status", "Status")
        .options(same_options(STATUSES))
        .value(value)
        .required()
}

fn status_matches(wanted: &Option<String>, status: &str) -> bool {
    wanted.as_deref().map_or(true, |w| w.is_empty() || w == status)
}

/// Names one of the name-only reference tables
pub(crate) trait NamedKind {
    const TABLE: NamedTable;
    const SECTION: &'static str;
    const TITLE: &'static str;
    const SINGULAR: &'static str;
    const CACHE_KIND: &'static str;
}

pub(crate) struct CountriesKind;
pub(crate) struct CategoriesKind;
pub(crate) struct StagesKind;

impl NamedKind for CountriesKind {
    const TABLE: NamedTable = NamedTable::Countries;
    const SECTION: &'static str = "countries";
    const TITLE: &'static str = "Countries";
    const SINGULAR: &'static str = "country";
    // countries feed both directories' filters
    const CACHE_KIND: &'static str = "all";
}

impl NamedKind for CategoriesKind {
    const TABLE: NamedTable = NamedTable::Categories;
    const SECTION: &'static str = "categories";
    const TITLE: &'static str = "Categories";
    const SINGULAR: &'static str = "category";
    const CACHE_KIND: &'static str = "companies";
}

impl NamedKind for StagesKind {
    const TABLE: NamedTable = NamedTable::CompanyStages;
    const SECTION: &'static str = "stages";
    const TITLE: &'static str = "Company stages";
    const SINGULAR: &'static str = "stage";
    const CACHE_KIND: &'static str = "all";
}

pub(crate) struct Named<K>(PhantomData<K>);

#[async_trait(?Send)]
impl<K: NamedKind + 'static> AdminResource for Named<K> {
    const SECTION: &'static str = K::SECTION;
    const TITLE: &'static str = K::TITLE;
    const SINGULAR: &'static str = K::SINGULAR;
    const CACHE_KIND: Option<&'static str> = Some(K::CACHE_KIND);

    fn headers() -> Vec<&'static str> {
        vec!["Name", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let rows = ReferenceRepository::new(ctx.pool())
            .list_named(K::TABLE, q, false)
            .await?
            .into_iter()
            .filter(|e| status_matches(status, &e.status))
            .map(|e| AdminRow {
                cells: vec![e.name, e.status],
                id: e.id,
            })
            .collect();
        Ok(page_of(rows, page))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let entry = match id {
            Some(id) => match ReferenceRepository::new(ctx.pool())
                .find_named(K::TABLE, id)
                .await?
            {
                Some(e) => Some(e),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(vec![
            FormField::text("name", "Name")
                .required()
                .value(entry.as_ref().map(|e| e.name.clone()).unwrap_or_default()),
            status_field(entry.as_ref().map(|e| e.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let repo = ReferenceRepository::new(ctx.pool());
        let entry = repo
            .create_named(K::TABLE, &form.required("name", "Name")?)
            .await?;
        // new rows start active; honour an explicit choice
        let status = form.status();
        if status != entry.status {
            repo.update_named(K::TABLE, &entry.id, &entry.name, &status)
                .await?;
        }
        Ok(entry.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        ReferenceRepository::new(ctx.pool())
            .update_named(K::TABLE, id, &form.required("name", "Name")?, &form.status())
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        ReferenceRepository::new(ctx.pool())
            .delete_named(K::TABLE, id)
            .await
    }
}

pub(crate) type Countries = Named<CountriesKind>;
pub(crate) type Categories = Named<CategoriesKind>;
pub(crate) type Stages = Named<StagesKind>;

// ---------------------------------------------------------------------------
// Cities

pub(crate) struct Cities;

#[async_trait(?Send)]
impl AdminResource for Cities {
    const SECTION: &'static str = "cities";
    const TITLE: &'static str = "Cities";
    const SINGULAR: &'static str = "city";

    fn headers() -> Vec<&'static str> {
        vec!["Name", "Country", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let rows = ReferenceRepository::new(ctx.pool())
            .cities(None, q)
            .await?
            .into_iter()
            .filter(|c| status_matches(status, &c.status))
            .map(|c| AdminRow {
                cells: vec![c.name, c.country_name, c.status],
                id: c.id,
            })
            .collect();
        Ok(page_of(rows, page))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let repo = ReferenceRepository::new(ctx.pool());
        let city = match id {
            Some(id) => match repo.find_city(id).await? {
                Some(c) => Some(c),
                None => return Ok(None),
            },
            None => None,
        };
        let countries = repo
            .countries()
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        Ok(Some(vec![
            FormField::text("name", "Name")
                .required()
                .value(city.as_ref().map(|c| c.name.clone()).unwrap_or_default()),
            FormField::text("country_id", "Country")
                .options(countries)
                .value(city.as_ref().map(|c| c.country_id.clone()).unwrap_or_default())
                .required(),
            status_field(city.as_ref().map(|c| c.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let repo = ReferenceRepository::new(ctx.pool());
        let name = form.required("name", "Name")?;
        let country_id = form.required("country_id", "Country")?;
        let city = repo.create_city(&name, &country_id).await?;
        let status = form.status();
        if status != city.status {
            repo.update_city(&city.id, &city.name, &city.country_id, &status)
                .await?;
        }
        Ok(city.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        ReferenceRepository::new(ctx.pool())
            .update_city(
                id,
                &form.required("name", "Name")?,
                &form.required("country_id", "Country")?,
                &form.status(),
            )
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        ReferenceRepository::new(ctx.pool()).delete_city(id).await
    }
}

// ---------------------------------------------------------------------------
// Currencies

pub(crate) struct Currencies;

#[async_trait(?Send)]
impl AdminResource for Currencies {
    const SECTION: &'static str = "currencies";
    const TITLE: &'static str = "Currencies";
    const SINGULAR: &'static str = "currency";

    fn headers() -> Vec<&'static str> {
        vec!["Code", "Name", "Symbol", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let needle = q.as_deref().unwrap_or("").trim().to_lowercase();
        let rows = ReferenceRepository::new(ctx.pool())
            .currencies(false)
            .await?
            .into_iter()
            .filter(|c| {
                needle.is_empty()
                    || c.code.to_lowercase().contains(&needle)
                    || c.name.to_lowercase().contains(&needle)
            })
            .filter(|c| status_matches(status, &c.status))
            .map(|c| AdminRow {
                cells: vec![c.code, c.name, c.symbol.unwrap_or_default(), c.status],
                id: c.id,
            })
            .collect();
        Ok(page_of(rows, page))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let currency = match id {
            Some(id) => match ReferenceRepository::new(ctx.pool()).find_currency(id).await? {
                Some(c) => Some(c),
                None => return Ok(None),
            },
            None => None,
        };
        let c = currency.as_ref();

        Ok(Some(vec![
            FormField::text("code", "Code")
                .required()
                .value(c.map(|c| c.code.clone()).unwrap_or_default()),
            FormField::text("name", "Name")
                .required()
                .value(c.map(|c| c.name.clone()).unwrap_or_default()),
            FormField::text("symbol", "Symbol").value_opt(&c.and_then(|c| c.symbol.clone())),
            status_field(c.map(|c| c.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let repo = ReferenceRepository::new(ctx.pool());
        let symbol = form.opt("symbol");
        let currency = repo
            .create_currency(
                &form.required("code", "Code")?,
                &form.required("name", "Name")?,
                symbol.as_deref(),
            )
            .await?;
        let status = form.status();
        if status != currency.status {
            repo.update_currency(
                &currency.id,
                &currency.code,
                &currency.name,
                currency.symbol.as_deref(),
                &status,
            )
            .await?;
        }
        Ok(currency.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        let symbol = form.opt("symbol");
        ReferenceRepository::new(ctx.pool())
            .update_currency(
                id,
                &form.required("code", "Code")?,
                &form.required("name", "Name")?,
                symbol.as_deref(),
                &form.status(),
            )
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        ReferenceRepository::new(ctx.pool()).delete_currency(id).await
    }
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    register::<Countries>(cfg);
    register::<Categories>(cfg);
    register::<Stages>(cfg);
    register::<Cities>(cfg);
    register::<Currencies>(cfg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_matches_blank_as_any() {
        assert!(status_matches(&None, "inactive"));
        assert!(status_matches(&Some(String::new()), "inactive"));
        assert!(status_matches(&Some("active".into()), "active"));
        assert!(!status_matches(&Some("active".into()), "inactive"));
    }
}
