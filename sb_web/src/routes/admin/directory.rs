//! ABOUTME: Admin sections for users, companies, investors, people, deals and pitches
//! ABOUTME: Companies and investors also edit their team and portfolio from the form page

use super::{cell, register, AdminCtx, AdminResource, FormData, STATUSES};
use crate::{
    auth::{PasswordAuth, MIN_PASSWORD_LEN},
    csrf::CSRF_FIELD,
    error::{PageError, PageResult},
    middleware::auth::AuthUser,
    models::{is_valid_phone, CsrfForm},
    routes::{redirect, require_csrf},
    views::{filters::group_thousands, same_options, AdminRow, FormField, RelatedRow, RelatedSection},
    AppState,
};
use actix_web::web;
use async_trait::async_trait;
use sb_core::{Error, Result};
use sb_db::{
    CompanyFilter, CompanyRepository, CreateCompanyRequest, CreateDealRequest,
    CreateInvestorRequest, CreatePortfolioEntryRequest, CreateUserRequest, DealRepository,
    InvestorFilter, InvestorRepository, PageRequest, PersonRepository, PersonRequest,
    PitchRepository, PortfolioRepository, ReferenceRepository, Role, UpdateCompanyRequest,
    UpdateInvestorRequest, UpdateProfileRequest, UserFilter, UserRepository, INVESTOR_TYPES,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{info, warn};
use validator::ValidateEmail;

fn status_field(value: &str) -> FormField {
    FormField::text("status", "Status")
        .options(same_options(STATUSES))
        .value(value)
        .required()
}

async fn country_names(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    Ok(same_options(
        ReferenceRepository::new(pool)
            .countries()
            .await?
            .into_iter()
            .map(|c| c.name),
    ))
}

async fn country_ids(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    Ok(ReferenceRepository::new(pool)
        .countries()
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}

async fn people_options(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    Ok(PersonRepository::new(pool)
        .list(&None, PageRequest::unbounded())
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect())
}

fn money(value: Option<f64>) -> String {
    value.map(group_thousands).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Users

pub(crate) struct Users;

#[async_trait(?Send)]
impl AdminResource for Users {
    const SECTION: &'static str = "users";
    const TITLE: &'static str = "Users";
    const SINGULAR: &'static str = "user";
    const ADMIN_ONLY: bool = true;

    fn headers() -> Vec<&'static str> {
        vec!["Email", "Name", "Role", "Status", "Joined"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = UserRepository::new(ctx.pool());
        let filter = UserFilter {
            q: q.clone(),
            status: status.clone(),
            role: None,
        };
        let rows = repo
            .list(&filter, page)
            .await?
            .into_iter()
            .map(|u| AdminRow {
                cells: vec![
                    u.email.clone(),
                    u.full_name(),
                    u.role.clone(),
                    u.status.clone(),
                    u.created_at.chars().take(10).collect(),
                ],
                id: u.id,
            })
            .collect();
        Ok((rows, repo.count(&filter).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let user = match id {
            Some(id) => match UserRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(user) => Some(user),
                None => return Ok(None),
            },
            None => None,
        };
        let roles = same_options(Role::ALL.iter().map(|r| r.as_str()));
        let password = FormField::new("password", "Password", "password");

        Ok(Some(vec![
            FormField::new("email", "Email", "email")
                .required()
                .value(user.as_ref().map(|u| u.email.clone()).unwrap_or_default()),
            FormField::text("first_name", "First name")
                .required()
                .value(user.as_ref().map(|u| u.first_name.clone()).unwrap_or_default()),
            FormField::text("last_name", "Last name")
                .value(user.as_ref().map(|u| u.last_name.clone()).unwrap_or_default()),
            FormField::text("role", "Role")
                .options(roles)
                .required()
                .value(user.as_ref().map(|u| u.role.clone()).unwrap_or_else(|| "user".to_string())),
            status_field(user.as_ref().map(|u| u.status.as_str()).unwrap_or("active")),
            FormField::text("phone", "Phone").value_opt(&user.as_ref().and_then(|u| u.phone.clone())),
            FormField::text("country_id", "Country")
                .options(country_ids(ctx.pool()).await?)
                .value_opt(&user.as_ref().and_then(|u| u.country_id.clone())),
            FormField::text("city", "City").value_opt(&user.as_ref().and_then(|u| u.city.clone())),
            FormField::text("telegram", "Telegram")
                .value_opt(&user.as_ref().and_then(|u| u.telegram.clone())),
            FormField::new("linkedin", "LinkedIn", "url")
                .value_opt(&user.as_ref().and_then(|u| u.linkedin.clone())),
            if user.is_some() {
                FormField {
                    label: "New password (leave blank to keep)",
                    ..password
                }
            } else {
                password.required()
            },
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let email = checked_email(form)?;
        let password = form.get("password");
        check_password(password)?;
        let phone = checked_phone(form)?;

        let user = UserRepository::new(ctx.pool())
            .create(CreateUserRequest {
                email,
                password_hash: PasswordAuth::hash_password(password)?,
                role: form.get("role").parse()?,
                first_name: form.required("first_name", "First name")?,
                last_name: form.get("last_name").to_string(),
                country_id: form.opt("country_id"),
                city: form.opt("city"),
                phone,
                telegram: form.opt("telegram"),
                linkedin: form.opt("linkedin"),
            })
            .await?;
        Ok(user.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        let repo = UserRepository::new(ctx.pool());
        let email = checked_email(form)?;
        if let Some(other) = repo.find_by_email(&email).await? {
            if other.id != id {
                return Err(Error::Conflict("That email is already registered".to_string()));
            }
        }
        let role: Role = form.get("role").parse()?;
        let status = form.status();
        if id == ctx.actor.id && (role != Role::Admin || status != "active") {
            return Err(Error::Validation(
                "You cannot demote or deactivate your own account".to_string(),
            ));
        }

        repo.update_profile(
            id,
            UpdateProfileRequest {
                email: Some(email),
                first_name: Some(form.required("first_name", "First name")?),
                last_name: Some(form.get("last_name").to_string()),
                country_id: form.opt("country_id"),
                city: form.opt("city"),
                phone: checked_phone(form)?,
                telegram: form.opt("telegram"),
                linkedin: form.opt("linkedin"),
            },
        )
        .await?;
        repo.set_role(id, role).await?;
        repo.set_status(id, &status).await?;

        if let Some(password) = form.opt("password") {
            check_password(&password)?;
            repo.set_password(id, &PasswordAuth::hash_password(&password)?)
                .await?;
            info!(user_id = id, "Admin reset a user's password");
        }
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        if id == ctx.actor.id {
            return Err(Error::Validation("You cannot delete your own account".to_string()));
        }
        UserRepository::new(ctx.pool()).delete(id).await
    }
}

fn checked_email(form: &FormData) -> Result<String> {
    let email = form.required("email", "Email")?.to_lowercase();
    if !email.validate_email() {
        return Err(Error::Validation("Email address is not valid".to_string()));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn checked_phone(form: &FormData) -> Result<Option<String>> {
    match form.opt("phone") {
        Some(phone) if !is_valid_phone(&phone) => Err(Error::Validation(
            "Phone must look like +77011234567".to_string(),
        )),
        phone => Ok(phone),
    }
}

// ---------------------------------------------------------------------------
// Companies

pub(crate) struct Companies;

#[async_trait(?Send)]
impl AdminResource for Companies {
    const SECTION: &'static str = "companies";
    const TITLE: &'static str = "Companies";
    const SINGULAR: &'static str = "company";
    const CACHE_KIND: Option<&'static str> = Some("companies");

    fn headers() -> Vec<&'static str> {
        vec!["Name", "Country", "Stage", "Industry", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = CompanyRepository::new(ctx.pool());
        let filter = CompanyFilter {
            q: q.clone(),
            status: status.clone(),
            ..Default::default()
        };
        let rows = repo
            .search(&filter, page)
            .await?
            .into_iter()
            .map(|c| AdminRow {
                cells: vec![
                    c.name.clone(),
                    cell(&c.country),
                    cell(&c.stage),
                    cell(&c.industry),
                    c.status.clone(),
                ],
                id: c.id,
            })
            .collect();
        Ok((rows, repo.count(&filter).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let company = match id {
            Some(id) => match CompanyRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(c) => Some(c),
                None => return Ok(None),
            },
            None => None,
        };
        let reference = ReferenceRepository::new(ctx.pool());
        let names = |entries: Vec<sb_db::NamedEntry>| same_options(entries.into_iter().map(|e| e.name));
        let stages = names(
            reference
                .list_named(sb_db::NamedTable::CompanyStages, &None, true)
                .await?,
        );
        let categories = names(
            reference
                .list_named(sb_db::NamedTable::Categories, &None, true)
                .await?,
        );
        let c = company.as_ref();

        Ok(Some(vec![
            FormField::text("name", "Name")
                .required()
                .value(c.map(|c| c.name.clone()).unwrap_or_default()),
            FormField::new("description", "Description", "textarea")
                .value_opt(&c.and_then(|c| c.description.clone())),
            FormField::text("country", "Country")
                .options(country_names(ctx.pool()).await?)
                .value_opt(&c.and_then(|c| c.country.clone())),
            FormField::text("city", "City").value_opt(&c.and_then(|c| c.city.clone())),
            FormField::text("stage", "Stage")
                .options(stages)
                .value_opt(&c.and_then(|c| c.stage.clone())),
            FormField::text("industry", "Industry")
                .options(categories)
                .value_opt(&c.and_then(|c| c.industry.clone())),
            FormField::new("founded_date", "Founded", "date")
                .value_opt(&c.and_then(|c| c.founded_date.clone())),
            FormField::new("website", "Website", "url").value_opt(&c.and_then(|c| c.website.clone())),
            FormField::new("logo", "Logo URL", "url").value_opt(&c.and_then(|c| c.logo.clone())),
            status_field(c.map(|c| c.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let company = CompanyRepository::new(ctx.pool())
            .create(CreateCompanyRequest {
                name: form.required("name", "Name")?,
                description: form.opt("description"),
                country: form.opt("country"),
                city: form.opt("city"),
                stage: form.opt("stage"),
                industry: form.opt("industry"),
                founded_date: form.opt("founded_date"),
                website: form.opt("website"),
                logo: form.opt("logo"),
                status: Some(form.status()),
                created_by: Some(ctx.actor.id.clone()),
            })
            .await?;
        Ok(company.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        CompanyRepository::new(ctx.pool())
            .update(
                id,
                UpdateCompanyRequest {
                    name: Some(form.required("name", "Name")?),
                    description: form.opt("description"),
                    country: form.opt("country"),
                    city: form.opt("city"),
                    stage: form.opt("stage"),
                    industry: form.opt("industry"),
                    founded_date: form.opt("founded_date"),
                    website: form.opt("website"),
                    logo: form.opt("logo"),
                    status: Some(form.status()),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        CompanyRepository::new(ctx.pool()).delete(id).await
    }

    async fn related(ctx: &AdminCtx<'_>, id: &str) -> Result<Vec<RelatedSection>> {
        let team = CompanyRepository::new(ctx.pool()).team(id).await?;
        Ok(vec![team_section(
            "companies",
            id,
            team,
            people_options(ctx.pool()).await?,
        )])
    }

    fn links(id: &str) -> Vec<(String, String)> {
        vec![("View on site".to_string(), format!("/company/{}", id))]
    }
}

fn team_section(
    section: &str,
    id: &str,
    team: Vec<sb_db::Person>,
    people: Vec<(String, String)>,
) -> RelatedSection {
    RelatedSection {
        title: "Team",
        headers: vec!["Name", "Role", "LinkedIn"],
        rows: team
            .into_iter()
            .map(|p| RelatedRow {
                delete_url: format!("/admin/{}/{}/team/{}/delete", section, id, p.id),
                cells: vec![p.name, cell(&p.role), cell(&p.linkedin)],
            })
            .collect(),
        add_action: format!("/admin/{}/{}/team/add", section, id),
        add_fields: vec![FormField::text("person_id", "Person")
            .options(people)
            .required()],
    }
}

// ---------------------------------------------------------------------------
// Investors

pub(crate) struct Investors;

#[async_trait(?Send)]
impl AdminResource for Investors {
    const SECTION: &'static str = "investors";
    const TITLE: &'static str = "Investors";
    const SINGULAR: &'static str = "investor";
    const CACHE_KIND: Option<&'static str> = Some("investors");

    fn headers() -> Vec<&'static str> {
        vec!["Name", "Type", "Country", "Focus", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = InvestorRepository::new(ctx.pool());
        let filter = InvestorFilter {
            q: q.clone(),
            status: status.clone(),
            ..Default::default()
        };
        let rows = repo
            .search(&filter, page)
            .await?
            .into_iter()
            .map(|i| AdminRow {
                cells: vec![
                    i.name.clone(),
                    i.investor_type.clone(),
                    cell(&i.country),
                    cell(&i.focus),
                    i.status.clone(),
                ],
                id: i.id,
            })
            .collect();
        Ok((rows, repo.count(&filter).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let investor = match id {
            Some(id) => match InvestorRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(i) => Some(i),
                None => return Ok(None),
            },
            None => None,
        };
        let i = investor.as_ref();

        Ok(Some(vec![
            FormField::text("name", "Name")
                .required()
                .value(i.map(|i| i.name.clone()).unwrap_or_default()),
            FormField::new("description", "Description", "textarea")
                .value_opt(&i.and_then(|i| i.description.clone())),
            FormField::text("investor_type", "Type")
                .options(same_options(INVESTOR_TYPES))
                .required()
                .value(i.map(|i| i.investor_type.clone()).unwrap_or_else(|| INVESTOR_TYPES[0].to_string())),
            FormField::text("country", "Country")
                .options(country_names(ctx.pool()).await?)
                .value_opt(&i.and_then(|i| i.country.clone())),
            FormField::text("focus", "Focus").value_opt(&i.and_then(|i| i.focus.clone())),
            FormField::text("stages", "Stages").value_opt(&i.and_then(|i| i.stages.clone())),
            FormField::new("website", "Website", "url").value_opt(&i.and_then(|i| i.website.clone())),
            FormField::new("logo", "Logo URL", "url").value_opt(&i.and_then(|i| i.logo.clone())),
            status_field(i.map(|i| i.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let investor = InvestorRepository::new(ctx.pool())
            .create(CreateInvestorRequest {
                name: form.required("name", "Name")?,
                description: form.opt("description"),
                country: form.opt("country"),
                focus: form.opt("focus"),
                stages: form.opt("stages"),
                website: form.opt("website"),
                investor_type: form.opt("investor_type"),
                logo: form.opt("logo"),
                status: Some(form.status()),
            })
            .await?;
        Ok(investor.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        InvestorRepository::new(ctx.pool())
            .update(
                id,
                UpdateInvestorRequest {
                    name: Some(form.required("name", "Name")?),
                    description: form.opt("description"),
                    country: form.opt("country"),
                    focus: form.opt("focus"),
                    stages: form.opt("stages"),
                    website: form.opt("website"),
                    investor_type: form.opt("investor_type"),
                    logo: form.opt("logo"),
                    status: Some(form.status()),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        InvestorRepository::new(ctx.pool()).delete(id).await
    }

    async fn related(ctx: &AdminCtx<'_>, id: &str) -> Result<Vec<RelatedSection>> {
        let pool = ctx.pool();
        let repo = InvestorRepository::new(pool);
        let companies = CompanyRepository::new(pool).options().await?;
        let entries = PortfolioRepository::new(pool).list_by_investor(id).await?;
        let portfolio = repo.portfolio_companies(id).await?;

        let entry_section = RelatedSection {
            title: "Portfolio entries",
            headers: vec!["Company", "Amount", "Date", "Valuation"],
            rows: entries
                .into_iter()
                .map(|e| RelatedRow {
                    delete_url: format!("/admin/investors/{}/entries/{}/delete", id, e.id),
                    cells: vec![
                        e.company_name,
                        group_thousands(e.amount),
                        e.date,
                        money(e.valuation),
                    ],
                })
                .collect(),
            add_action: format!("/admin/investors/{}/entries/add", id),
            add_fields: vec![
                FormField::text("company_id", "Company")
                    .options(companies.clone())
                    .required(),
                FormField::text("amount", "Amount").required(),
                FormField::new("date", "Date", "date"),
                FormField::text("valuation", "Valuation"),
            ],
        };

        let company_section = RelatedSection {
            title: "Portfolio companies",
            headers: vec!["Company", "Country", "Stage"],
            rows: portfolio
                .into_iter()
                .map(|c| RelatedRow {
                    delete_url: format!("/admin/investors/{}/companies/{}/delete", id, c.id),
                    cells: vec![c.name, cell(&c.country), cell(&c.stage)],
                })
                .collect(),
            add_action: format!("/admin/investors/{}/companies/add", id),
            add_fields: vec![FormField::text("company_id", "Company")
                .options(companies)
                .required()],
        };

        let team = team_section("investors", id, repo.team(id).await?, people_options(pool).await?);
        Ok(vec![entry_section, company_section, team])
    }

    fn links(id: &str) -> Vec<(String, String)> {
        vec![("View on site".to_string(), format!("/investor/{}", id))]
    }
}

// ---------------------------------------------------------------------------
// People

pub(crate) struct People;

#[async_trait(?Send)]
impl AdminResource for People {
    const SECTION: &'static str = "people";
    const TITLE: &'static str = "People";
    const SINGULAR: &'static str = "person";

    fn headers() -> Vec<&'static str> {
        vec!["Name", "Role", "Country", "Status"]
    }

    fn statuses() -> Vec<&'static str> {
        Vec::new()
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        _status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = PersonRepository::new(ctx.pool());
        let rows = repo
            .list(q, page)
            .await?
            .into_iter()
            .map(|p| AdminRow {
                cells: vec![p.name.clone(), cell(&p.role), cell(&p.country), p.status.clone()],
                id: p.id,
            })
            .collect();
        Ok((rows, repo.count(q).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let person = match id {
            Some(id) => match PersonRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(p) => Some(p),
                None => return Ok(None),
            },
            None => None,
        };
        let p = person.as_ref();

        Ok(Some(vec![
            FormField::text("name", "Name")
                .required()
                .value(p.map(|p| p.name.clone()).unwrap_or_default()),
            FormField::text("role", "Role").value_opt(&p.and_then(|p| p.role.clone())),
            FormField::text("country", "Country")
                .options(country_names(ctx.pool()).await?)
                .value_opt(&p.and_then(|p| p.country.clone())),
            FormField::new("linkedin", "LinkedIn", "url").value_opt(&p.and_then(|p| p.linkedin.clone())),
            status_field(p.map(|p| p.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let person = PersonRepository::new(ctx.pool())
            .create(person_request(form)?)
            .await?;
        Ok(person.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        PersonRepository::new(ctx.pool())
            .update(id, person_request(form)?)
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        PersonRepository::new(ctx.pool()).delete(id).await
    }
}

fn person_request(form: &FormData) -> Result<PersonRequest> {
    Ok(PersonRequest {
        name: form.required("name", "Name")?,
        country: form.opt("country"),
        linkedin: form.opt("linkedin"),
        role: form.opt("role"),
        status: Some(form.status()),
    })
}

// ---------------------------------------------------------------------------
// Deals

pub(crate) struct Deals;

#[async_trait(?Send)]
impl AdminResource for Deals {
    const SECTION: &'static str = "deals";
    const TITLE: &'static str = "Deals";
    const SINGULAR: &'static str = "deal";
    const CACHE_KIND: Option<&'static str> = Some("companies");

    fn headers() -> Vec<&'static str> {
        vec!["Company", "Type", "Amount", "Date", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = DealRepository::new(ctx.pool());
        let rows = repo
            .list(q, status, page)
            .await?
            .into_iter()
            .map(|d| AdminRow {
                cells: vec![
                    cell(&d.company_name),
                    cell(&d.deal_type),
                    money(d.amount),
                    cell(&d.date),
                    d.status.clone(),
                ],
                id: d.id,
            })
            .collect();
        Ok((rows, repo.count(q, status).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let pool = ctx.pool();
        let deal = match id {
            Some(id) => match DealRepository::new(pool).find_by_id(id).await? {
                Some(d) => Some(d),
                None => return Ok(None),
            },
            None => None,
        };
        let d = deal.as_ref();
        let currencies = ReferenceRepository::new(pool)
            .currencies(false)
            .await?
            .into_iter()
            .map(|c| (c.id, c.code))
            .collect();

        Ok(Some(vec![
            FormField::text("company_id", "Company")
                .options(CompanyRepository::new(pool).options().await?)
                .required()
                .value_opt(&d.and_then(|d| d.company_id.clone())),
            FormField::text("deal_type", "Type").value_opt(&d.and_then(|d| d.deal_type.clone())),
            FormField::text("amount", "Amount").value(money(d.and_then(|d| d.amount))),
            FormField::text("valuation", "Valuation").value(money(d.and_then(|d| d.valuation))),
            FormField::new("date", "Date", "date").value_opt(&d.and_then(|d| d.date.clone())),
            FormField::text("currency_id", "Currency")
                .options(currencies)
                .value_opt(&d.and_then(|d| d.currency_id.clone())),
            FormField::new("investors", "Investors", "textarea")
                .value_opt(&d.and_then(|d| d.investors.clone())),
            status_field(d.map(|d| d.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let deal = DealRepository::new(ctx.pool())
            .create(deal_request(form)?)
            .await?;
        Ok(deal.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        DealRepository::new(ctx.pool())
            .update(id, deal_request(form)?)
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        DealRepository::new(ctx.pool()).delete(id).await
    }
}

fn deal_request(form: &FormData) -> Result<CreateDealRequest> {
    Ok(CreateDealRequest {
        company_id: Some(form.required("company_id", "Company")?),
        deal_type: form.opt("deal_type"),
        amount: form.amount("amount")?,
        valuation: form.amount("valuation")?,
        date: form.opt("date"),
        currency_id: form.opt("currency_id"),
        investors: form.opt("investors"),
        status: Some(form.status()),
    })
}

// ---------------------------------------------------------------------------
// Pitches

pub(crate) struct Pitches;

#[async_trait(?Send)]
impl AdminResource for Pitches {
    const SECTION: &'static str = "pitches";
    const TITLE: &'static str = "Pitches";
    const SINGULAR: &'static str = "pitch";

    fn headers() -> Vec<&'static str> {
        vec!["Name", "URL", "Status", "Added"]
    }

    fn statuses() -> Vec<&'static str> {
        Vec::new()
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        _status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = PitchRepository::new(ctx.pool());
        let rows = repo
            .list(q, page)
            .await?
            .into_iter()
            .map(|p| AdminRow {
                cells: vec![
                    p.name.clone(),
                    p.url.clone(),
                    p.status.clone(),
                    p.created_at.chars().take(10).collect(),
                ],
                id: p.id,
            })
            .collect();
        Ok((rows, repo.count(q).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let pool = ctx.pool();
        let pitch = match id {
            Some(id) => match PitchRepository::new(pool).find_by_id(id).await? {
                Some(p) => Some(p),
                None => return Ok(None),
            },
            None => None,
        };

        let company = match &pitch {
            Some(p) => FormField::new("company_id", "Company", "readonly").value(p.company_id.clone()),
            None => FormField::text("company_id", "Company")
                .options(CompanyRepository::new(pool).options().await?)
                .required(),
        };
        let p = pitch.as_ref();

        Ok(Some(vec![
            company,
            FormField::text("name", "Name")
                .required()
                .value(p.map(|p| p.name.clone()).unwrap_or_default()),
            FormField::new("url", "URL", "url")
                .required()
                .value(p.map(|p| p.url.clone()).unwrap_or_default()),
            status_field(p.map(|p| p.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let company_id = form.required("company_id", "Company")?;
        let (name, url) = pitch_fields(form)?;
        let pitch = PitchRepository::new(ctx.pool())
            .create(&company_id, &name, &url)
            .await?;
        Ok(pitch.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        let (name, url) = pitch_fields(form)?;
        PitchRepository::new(ctx.pool())
            .update(id, &name, &url, &form.status())
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        PitchRepository::new(ctx.pool()).delete_any(id).await
    }
}

fn pitch_fields(form: &FormData) -> Result<(String, String)> {
    let name = form.required("name", "Name")?;
    let url = form.required("url", "URL")?;
    url::Url::parse(&url).map_err(|_| Error::Validation("URL is not valid".to_string()))?;
    Ok((name, url))
}

// ---------------------------------------------------------------------------
// Child records edited from the company and investor forms

fn checked_form(
    state: &AppState,
    auth: &AuthUser,
    form: web::Form<HashMap<String, String>>,
) -> std::result::Result<FormData, PageError> {
    let form = FormData(form.into_inner());
    require_csrf(state, auth, form.get(CSRF_FIELD))?;
    Ok(form)
}

fn back_to(section: &str, id: &str) -> PageResult {
    Ok(redirect(format!("/admin/{}/{}", section, id)))
}

async fn team_add(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<(String, String)>,
    form: web::Form<HashMap<String, String>>,
) -> PageResult {
    let (section, id) = path.into_inner();
    let form = checked_form(&state, &auth, form)?;
    let Some(person_id) = form.opt("person_id") else {
        return back_to(&section, &id);
    };

    let pool = state.db.pool();
    match section.as_str() {
        "companies" => {
            CompanyRepository::new(pool).add_team_member(&id, &person_id).await?;
            state.invalidator.companies().await;
        }
        "investors" => {
            InvestorRepository::new(pool).add_team_member(&id, &person_id).await?;
            state.invalidator.investors().await;
        }
        _ => return Err(PageError::NotFound),
    }
    back_to(&section, &id)
}

async fn team_remove(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<(String, String, String)>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let (section, id, person_id) = path.into_inner();

    let pool = state.db.pool();
    match section.as_str() {
        "companies" => {
            CompanyRepository::new(pool).remove_team_member(&id, &person_id).await?;
            state.invalidator.companies().await;
        }
        "investors" => {
            InvestorRepository::new(pool).remove_team_member(&id, &person_id).await?;
            state.invalidator.investors().await;
        }
        _ => return Err(PageError::NotFound),
    }
    back_to(&section, &id)
}

async fn portfolio_entry_add(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<HashMap<String, String>>,
) -> PageResult {
    let investor_id = path.into_inner();
    let form = checked_form(&state, &auth, form)?;

    let request = match (form.opt("company_id"), form.amount("amount"), form.amount("valuation")) {
        (Some(company_id), Ok(amount), Ok(valuation)) => CreatePortfolioEntryRequest {
            investor_id: investor_id.clone(),
            company_id,
            amount,
            date: form.opt("date"),
            valuation,
        },
        _ => return back_to("investors", &investor_id),
    };

    match PortfolioRepository::new(state.db.pool()).add(request).await {
        Ok(_) => {}
        Err(Error::Validation(message)) => {
            warn!(investor_id = %investor_id, %message, "Portfolio entry rejected");
        }
        Err(e) => return Err(e.into()),
    }
    state.invalidator.investors().await;
    back_to("investors", &investor_id)
}

async fn portfolio_entry_remove(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<(String, String)>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let (investor_id, entry_id) = path.into_inner();
    PortfolioRepository::new(state.db.pool())
        .delete(&entry_id, &investor_id)
        .await?;
    state.invalidator.investors().await;
    back_to("investors", &investor_id)
}

async fn portfolio_company_add(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<HashMap<String, String>>,
) -> PageResult {
    let investor_id = path.into_inner();
    let form = checked_form(&state, &auth, form)?;
    if let Some(company_id) = form.opt("company_id") {
        InvestorRepository::new(state.db.pool())
            .add_portfolio_company(&investor_id, &company_id)
            .await?;
        state.invalidator.investors().await;
    }
    back_to("investors", &investor_id)
}

async fn portfolio_company_remove(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<(String, String)>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let (investor_id, company_id) = path.into_inner();
    InvestorRepository::new(state.db.pool())
        .remove_portfolio_company(&investor_id, &company_id)
        .await?;
    state.invalidator.investors().await;
    back_to("investors", &investor_id)
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    register::<Users>(cfg);
    register::<Companies>(cfg);
    register::<Investors>(cfg);
    register::<People>(cfg);
    register::<Deals>(cfg);
    register::<Pitches>(cfg);

    cfg.route("/{section}/{id}/team/add", web::post().to(team_add))
        .route(
            "/{section}/{id}/team/{person_id}/delete",
            web::post().to(team_remove),
        )
        .route("/investors/{id}/entries/add", web::post().to(portfolio_entry_add))
        .route(
            "/investors/{id}/entries/{entry_id}/delete",
            web::post().to(portfolio_entry_remove),
        )
        .route("/investors/{id}/companies/add", web::post().to(portfolio_company_add))
        .route(
            "/investors/{id}/companies/{company_id}/delete",
            web::post().to(portfolio_company_remove),
        );
}
