//! ABOUTME: Repository modules providing database operations per table family
//! ABOUTME: Shared paging window, LIKE escaping and write-error mapping live here

use sb_core::Error;

pub mod authors;
pub mod comments;
pub mod companies;
pub mod deals;
pub mod email_templates;
pub mod events;
pub mod feedback;
pub mod investors;
pub mod jobs;
pub mod news;
pub mod notifications;
pub mod password_resets;
pub mod people;
pub mod pitches;
pub mod podcasts;
pub mod portfolio;
pub mod reference;
pub mod search;
pub mod users;

/// Offset/limit window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

impl PageRequest {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(1),
            offset: offset.max(0),
        }
    }

    /// SQLite treats a negative LIMIT as unbounded
    pub fn unbounded() -> Self {
        Self {
            limit: -1,
            offset: 0,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(20, 0)
    }
}

/// Escape LIKE wildcards; pair with `ESCAPE '\'`
pub(crate) fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `%q%` over the trimmed, escaped query
pub(crate) fn like_pattern(q: &str) -> String {
    format!("%{}%", escape_like(q.trim()))
}

/// Trimmed value, or None when blank
pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Two-letter upper-case code shown in autocomplete labels, e.g. "Almaty, KA"
pub(crate) fn country_code(country: Option<&str>) -> String {
    country
        .unwrap_or("")
        .trim()
        .to_uppercase()
        .chars()
        .take(2)
        .collect()
}

/// Autocomplete entry for admin pickers
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AutocompleteItem {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl AutocompleteItem {
    pub(crate) fn labelled(id: String, name: &str, country: Option<&str>) -> Self {
        let code = country_code(country);
        let text = if code.is_empty() {
            name.to_string()
        } else {
            format!("{}, {}", name, code)
        };
        Self {
            id,
            text,
            country: None,
        }
    }
}

/// Map insert/update failures, turning unique violations into conflicts
pub(crate) fn write_error(action: &str, e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return Error::Conflict(format!("Failed to {}: already exists", action));
        }
        if db_err.is_foreign_key_violation() {
            return Error::Validation(format!("Failed to {}: referenced record missing", action));
        }
    }
    Error::Database(format!("Failed to {}: {}", action, e))
}
