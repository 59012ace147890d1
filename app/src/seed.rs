//! ABOUTME: Idempotent seeding of reference data and default email templates
//! ABOUTME: Central Asian countries with their main cities, stages, categories and currencies

use sb_core::{Error, Result};
use sb_db::{
    Db, EmailTemplateRepository, EmailTemplateRequest, NamedTable, ReferenceRepository,
    PASSWORD_RESET_TEMPLATE, WELCOME_TEMPLATE,
};
use std::collections::HashSet;
use tracing::{debug, info};

/// Countries and their main cities, capital first
pub const COUNTRIES: &[(&str, &[&str])] = &[
    ("Kazakhstan", &["Astana", "Almaty", "Shymkent", "Karaganda", "Aktobe"]),
    ("Uzbekistan", &["Tashkent", "Samarkand", "Bukhara", "Namangan", "Andijan"]),
    ("Kyrgyzstan", &["Bishkek", "Osh", "Jalal-Abad", "Karakol", "Tokmok"]),
    ("Tajikistan", &["Dushanbe", "Khujand", "Bokhtar", "Kulob", "Istaravshan"]),
    ("Turkmenistan", &["Ashgabat", "Turkmenabat", "Dashoguz", "Mary", "Balkanabat"]),
];

pub const STAGES: &[&str] = &["Idea", "Seed", "Growth", "Scale", "Series A", "Series B"];

pub const CATEGORIES: &[&str] = &[
    "Fintech",
    "SaaS",
    "AgriTech",
    "HealthTech",
    "Mobility",
    "CleanTech",
    "AI",
    "EdTech",
    "RetailTech",
    "LogisticsTech",
];

/// (code, name, symbol)
pub const CURRENCIES: &[(&str, &str, &str)] = &[
    ("USD", "US dollar", "$"),
    ("EUR", "Euro", "€"),
    ("KZT", "Kazakhstani tenge", "₸"),
    ("UZS", "Uzbekistani som", "so'm"),
    ("KGS", "Kyrgyzstani som", "с"),
    ("RUB", "Russian ruble", "₽"),
];

const WELCOME_SUBJECT: &str = "Welcome to {{ site_name }}";
const WELCOME_HTML: &str = "<p>Hello {{ name }},</p>\n\
<p>Thanks for joining {{ site_name }}. You can now list your company, publish an \
investor profile and follow the Central Asian startup scene.</p>\n\
<p><a href=\"{{ site_url }}/dashboard\">Open your dashboard</a></p>";

const RESET_SUBJECT: &str = "Reset your {{ site_name }} password";
const RESET_HTML: &str = "<p>Hello {{ name }},</p>\n\
<p>Someone asked to reset the password for your {{ site_name }} account.</p>\n\
<p><a href=\"{{ reset_url }}\">Choose a new password</a></p>\n\
<p>The link works once. If you did not ask for it, ignore this message.</p>";

/// Rows inserted by one seeding run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub countries: usize,
    pub cities: usize,
    pub stages: usize,
    pub categories: usize,
    pub currencies: usize,
    pub email_templates: usize,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.countries
            + self.cities
            + self.stages
            + self.categories
            + self.currencies
            + self.email_templates
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Insert whichever names are missing; returns how many were added
async fn seed_names(repo: &ReferenceRepository<'_>, table: NamedTable, names: &[&str]) -> Result<usize> {
    let existing: HashSet<String> = repo
        .list_named(table, &None, false)
        .await?
        .into_iter()
        .map(|e| key(&e.name))
        .collect();

    let mut added = 0;
    for name in names.iter().filter(|n| !existing.contains(&key(n))) {
        repo.create_named(table, name).await?;
        added += 1;
    }
    debug!(table = table.label(), added, "Seeded names");
    Ok(added)
}

async fn seed_cities(repo: &ReferenceRepository<'_>) -> Result<usize> {
    let countries = repo.countries().await?;
    let mut added = 0;

    for (country_name, cities) in COUNTRIES {
        let Some(country) = countries.iter().find(|c| key(&c.name) == key(country_name)) else {
            continue;
        };
        let existing: HashSet<String> = repo
            .cities(Some(country.id.as_str()), &None)
            .await?
            .into_iter()
            .map(|c| key(&c.name))
            .collect();

        for city in cities.iter().filter(|c| !existing.contains(&key(c))) {
            repo.create_city(city, &country.id).await?;
            added += 1;
        }
    }
    Ok(added)
}

async fn seed_currencies(repo: &ReferenceRepository<'_>) -> Result<usize> {
    let existing: HashSet<String> = repo
        .currencies(false)
        .await?
        .into_iter()
        .map(|c| c.code.to_uppercase())
        .collect();

    let mut added = 0;
    for (code, name, symbol) in CURRENCIES.iter().filter(|(code, _, _)| !existing.contains(*code)) {
        repo.create_currency(code, name, Some(*symbol)).await?;
        added += 1;
    }
    Ok(added)
}

async fn seed_templates(db: &Db) -> Result<usize> {
    let repo = EmailTemplateRepository::new(db.pool());
    let defaults = [
        (WELCOME_TEMPLATE, WELCOME_SUBJECT, WELCOME_HTML),
        (PASSWORD_RESET_TEMPLATE, RESET_SUBJECT, RESET_HTML),
    ];

    let mut added = 0;
    for (code, subject, html) in defaults {
        let created = repo
            .create(EmailTemplateRequest {
                code: code.to_string(),
                subject: subject.to_string(),
                html_content: html.to_string(),
                is_active: true,
            })
            .await;
        match created {
            Ok(_) => added += 1,
            // an edited template with the same code wins
            Err(Error::Conflict(_)) => debug!(code, "Email template already present"),
            Err(e) => return Err(e),
        }
    }
    Ok(added)
}

/// Fill in missing reference data; running it twice adds nothing the second time
pub async fn seed(db: &Db) -> Result<SeedReport> {
    let repo = ReferenceRepository::new(db.pool());
    let countries: Vec<&str> = COUNTRIES.iter().map(|(name, _)| *name).collect();

    let report = SeedReport {
        countries: seed_names(&repo, NamedTable::Countries, &countries).await?,
        cities: seed_cities(&repo).await?,
        stages: seed_names(&repo, NamedTable::CompanyStages, STAGES).await?,
        categories: seed_names(&repo, NamedTable::Categories, CATEGORIES).await?,
        currencies: seed_currencies(&repo).await?,
        email_templates: seed_templates(db).await?,
    };

    info!(?report, "Seeding finished");
    Ok(report)
}
