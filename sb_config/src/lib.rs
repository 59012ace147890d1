//! ABOUTME: Stanbase settings layered from defaults, an optional TOML file and STANBASE_* variables
//! ABOUTME: Validates every section and keeps secrets out of Debug output

use config::{Config as ConfigBuilder, Environment, File};
use sb_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

const INSECURE_SECRET_PREFIX: &str = "INSECURE-RANDOM-";

/// Every setting the binary reads at startup
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Config {
    /// `development`, `test` or `production`; selects the log format
    #[validate(length(min = 1))]
    pub environment: String,
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub security: SecurityConfig,
    #[validate(nested)]
    pub cache: CacheConfig,
    pub telegram: TelegramConfig,
    #[validate(nested)]
    pub mail: MailConfig,
    #[validate(nested)]
    pub site: SiteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            security: SecurityConfig::default(),
            cache: CacheConfig::default(),
            telegram: TelegramConfig::default(),
            mail: MailConfig::default(),
            site: SiteConfig::default(),
        }
    }
}

/// Listener addresses, static assets and abuse limits
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    #[validate(range(min = 1, max = 65535))]
    pub obs_port: u16,
    /// Directory served under /static (css, js, robots assets)
    pub static_dir: String,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            obs_port: 9000,
            static_dir: "./static".to_string(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting for login, registration and feedback endpoints
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    #[validate(range(min = 1, max = 10000))]
    pub requests_per_minute: u32,
    #[validate(range(min = 1, max = 3600))]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            window_seconds: 60,
        }
    }
}

/// SQLite file and pool sizing
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub path: String,
    #[validate(range(min = 1, max = 100))]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "stanbase.db".to_string(),
            pool_size: 10,
        }
    }
}

/// Security configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SecurityConfig {
    #[validate(length(min = 32))]
    pub jwt_secret: String,
    /// Whether to use secure cookies (requires HTTPS)
    pub secure_cookies: bool,
    /// Lifetime of password reset links
    #[validate(range(min = 60, max = 86400))]
    pub password_reset_ttl_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: insecure_random_secret(),
            secure_cookies: false,
            password_reset_ttl_secs: 3600,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("secure_cookies", &self.secure_cookies)
            .field("password_reset_ttl_secs", &self.password_reset_ttl_secs)
            .finish()
    }
}

/// File cache configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub dir: String,
    #[validate(range(min = 1, max = 86400))]
    pub default_ttl_secs: u64,
    /// Entries kept in the in-process tier in front of the files
    #[validate(range(min = 1, max = 100000))]
    pub memory_capacity: usize,
    #[validate(range(min = 10, max = 86400))]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "./cache".to_string(),
            default_ttl_secs: 300,
            memory_capacity: 256,
            sweep_interval_secs: 600,
        }
    }
}

/// Telegram bot used to forward feedback
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        matches!((&self.bot_token, &self.chat_id), (Some(t), Some(c)) if !t.is_empty() && !c.is_empty())
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Outgoing mail settings
#[derive(Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct MailConfig {
    #[validate(nested)]
    pub smtp: Option<SmtpConfig>,
    #[validate(email)]
    pub from_address: Option<String>,
    pub from_name: Option<String>,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp", &self.smtp)
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .finish()
    }
}

/// Outbound SMTP relay; absent means mail is disabled
#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct SmtpConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Public site identity, used for absolute links in mail and the sitemap
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SiteConfig {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub name: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            name: "Stanbase".to_string(),
        }
    }
}

fn insecure_random_secret() -> String {
    format!(
        "{}{}-CHANGE-IN-PRODUCTION",
        INSECURE_SECRET_PREFIX,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    )
}

/// Overrides for keys whose names contain underscores, which the `_` separator would split
const UNDERSCORE_KEYS: &[(&str, &str)] = &[
    ("STANBASE_SECURITY_JWT_SECRET", "security.jwt_secret"),
    ("STANBASE_SECURITY_SECURE_COOKIES", "security.secure_cookies"),
    (
        "STANBASE_SECURITY_PASSWORD_RESET_TTL_SECS",
        "security.password_reset_ttl_secs",
    ),
    ("STANBASE_DATABASE_POOL_SIZE", "database.pool_size"),
    ("STANBASE_SERVER_OBS_PORT", "server.obs_port"),
    ("STANBASE_SERVER_STATIC_DIR", "server.static_dir"),
    ("STANBASE_CACHE_DEFAULT_TTL_SECS", "cache.default_ttl_secs"),
    ("STANBASE_CACHE_MEMORY_CAPACITY", "cache.memory_capacity"),
    ("STANBASE_CACHE_SWEEP_INTERVAL_SECS", "cache.sweep_interval_secs"),
    ("STANBASE_TELEGRAM_BOT_TOKEN", "telegram.bot_token"),
    ("STANBASE_TELEGRAM_CHAT_ID", "telegram.chat_id"),
    ("STANBASE_TELEGRAM_API_BASE", "telegram.api_base"),
    ("STANBASE_MAIL_FROM_ADDRESS", "mail.from_address"),
    ("STANBASE_MAIL_FROM_NAME", "mail.from_name"),
];

impl Config {
    /// Load configuration from defaults, an optional TOML file and environment variables
    ///
    /// The file is `STANBASE_CONFIG_FILE` when set, otherwise `stanbase.toml` if present.
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.obs_port", 9000)?
            .set_default("server.static_dir", "./static")?
            .set_default("server.rate_limit.requests_per_minute", 30)?
            .set_default("server.rate_limit.window_seconds", 60)?
            .set_default("database.path", "stanbase.db")?
            .set_default("database.pool_size", 10)?
            .set_default("security.secure_cookies", false)?
            .set_default("security.password_reset_ttl_secs", 3600)?
            .set_default("security.jwt_secret", insecure_random_secret())?
            .set_default("cache.enabled", true)?
            .set_default("cache.dir", "./cache")?
            .set_default("cache.default_ttl_secs", 300)?
            .set_default("cache.memory_capacity", 256)?
            .set_default("cache.sweep_interval_secs", 600)?
            .set_default("telegram.api_base", "https://api.telegram.org")?
            .set_default("site.url", "http://localhost:8080")?
            .set_default("site.name", "Stanbase")?;

        let config_file = std::env::var("STANBASE_CONFIG_FILE")
            .unwrap_or_else(|_| "stanbase.toml".to_string());
        if std::path::Path::new(&config_file).exists() {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        }

        // Environment variables with STANBASE_ prefix (highest priority)
        builder = builder.add_source(
            Environment::with_prefix("STANBASE")
                .try_parsing(true)
                .separator("_"),
        );

        for (var, key) in UNDERSCORE_KEYS {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        // SMTP is optional as a whole; only build it when a host is given
        if let Ok(host) = std::env::var("STANBASE_MAIL_SMTP_HOST") {
            builder = builder
                .set_override("mail.smtp.host", host)?
                .set_override(
                    "mail.smtp.port",
                    std::env::var("STANBASE_MAIL_SMTP_PORT").unwrap_or_else(|_| "587".into()),
                )?
                .set_override(
                    "mail.smtp.username",
                    std::env::var("STANBASE_MAIL_SMTP_USERNAME").unwrap_or_default(),
                )?
                .set_override(
                    "mail.smtp.password",
                    std::env::var("STANBASE_MAIL_SMTP_PASSWORD").unwrap_or_default(),
                )?;
        }

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed.check()?;
        Ok(parsed)
    }

    /// Run field validation plus the cross-field rules
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        if self.is_production() && self.security.jwt_secret.starts_with(INSECURE_SECRET_PREFIX) {
            return Err(Error::Config(
                "STANBASE_SECURITY_JWT_SECRET must be set in production".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "STANBASE_ENVIRONMENT",
        "STANBASE_SERVER_HOST",
        "STANBASE_SERVER_PORT",
        "STANBASE_DATABASE_PATH",
        "STANBASE_DATABASE_POOL_SIZE",
        "STANBASE_SECURITY_JWT_SECRET",
        "STANBASE_TELEGRAM_BOT_TOKEN",
        "STANBASE_TELEGRAM_CHAT_ID",
        "STANBASE_CACHE_DEFAULT_TTL_SECS",
        "STANBASE_MAIL_SMTP_HOST",
        "STANBASE_CONFIG_FILE",
    ];

    fn clear_env() {
        for key in VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load().expect("Should load with defaults");

        assert_eq!(config.environment, "development");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "stanbase.db");
        assert_eq!(config.database.pool_size, 10);
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.cache.dir, "./cache");
        assert!(!config.telegram.is_configured());
        assert!(config.mail.smtp.is_none());
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("STANBASE_SERVER_HOST", "0.0.0.0");
        env::set_var("STANBASE_SERVER_PORT", "9100");
        env::set_var(
            "STANBASE_SECURITY_JWT_SECRET",
            "valid32characterjwtsecretfortest",
        );
        env::set_var("STANBASE_TELEGRAM_BOT_TOKEN", "123:abc");
        env::set_var("STANBASE_TELEGRAM_CHAT_ID", "-100200300");
        env::set_var("STANBASE_CACHE_DEFAULT_TTL_SECS", "120");

        let config = Config::load().expect("Should load from env");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(
            config.security.jwt_secret,
            "valid32characterjwtsecretfortest"
        );
        assert!(config.telegram.is_configured());
        assert_eq!(config.cache.default_ttl_secs, 120);

        clear_env();
    }

    #[test]
    fn test_smtp_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("STANBASE_MAIL_SMTP_HOST", "smtp.example.com");
        env::set_var("STANBASE_MAIL_SMTP_USERNAME", "mailer");
        env::set_var("STANBASE_MAIL_SMTP_PASSWORD", "hunter2");

        let config = Config::load().expect("Should load smtp settings");
        let smtp = config.mail.smtp.expect("smtp configured");
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);

        env::remove_var("STANBASE_MAIL_SMTP_USERNAME");
        env::remove_var("STANBASE_MAIL_SMTP_PASSWORD");
        clear_env();
    }

    #[test]
    fn test_config_validation_failure() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("STANBASE_DATABASE_POOL_SIZE", "200");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_production_requires_explicit_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("STANBASE_ENVIRONMENT", "production");
        assert!(Config::load().is_err());

        env::set_var(
            "STANBASE_SECURITY_JWT_SECRET",
            "a-production-secret-that-is-long-enough",
        );
        let config = Config::load().expect("explicit secret is accepted");
        assert!(config.is_production());

        clear_env();
    }

    #[test]
    fn test_secret_redaction() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("STANBASE_TELEGRAM_BOT_TOKEN", "123:very-secret");

        let config = Config::load().expect("Should load with defaults");
        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(INSECURE_SECRET_PREFIX));
        assert!(!debug_output.contains("very-secret"));

        clear_env();
    }

    #[test]
    fn test_jwt_secret_too_short() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("STANBASE_SECURITY_JWT_SECRET", "short");
        assert!(Config::load().is_err());

        clear_env();
    }
}
