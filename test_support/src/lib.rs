//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common test fixtures for all stanbase crates

use serde_json::{json, Value};

/// Unique SQLite file name for a test run, e.g. `test_web_01HV....db`
pub fn unique_db_name(prefix: &str) -> String {
    format!("test_{}_{}.db", prefix, ulid::Ulid::new())
}

/// Remove a test database together with its WAL side files
pub fn remove_db_files(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path, suffix));
    }
}

/// Helper for creating temporary directories in tests
pub fn temp_dir_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("stanbase-test-{}", ulid::Ulid::new()))
}

/// A JWT secret long enough to pass config validation
pub fn test_jwt_secret() -> String {
    "test_secret_key_32_characters_minimum".to_string()
}

/// Feedback payload as the browser widget posts it
pub fn sample_feedback_payload() -> Value {
    json!({
        "type": "bug",
        "description": "Search button does nothing",
        "suggestion": "Make it submit the form",
        "name": "Aida",
        "email": "aida@example.com",
        "page_url": "https://stanbase.test/companies",
        "page_title": "Companies",
        "user_agent": "Mozilla/5.0",
        "screen_size": "1920x1080"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_names_are_unique() {
        assert_ne!(unique_db_name("a"), unique_db_name("a"));
    }

    #[test]
    fn secret_is_long_enough() {
        assert!(test_jwt_secret().len() >= 32);
    }
}
