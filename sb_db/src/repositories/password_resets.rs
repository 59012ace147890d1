//! ABOUTME: Single-use password reset tokens stored as SHA-256 digests
//! ABOUTME: The raw token only ever exists in the emailed link

use chrono::{Duration, SecondsFormat, Utc};
use rand_core::{OsRng, RngCore};
use sb_core::{time::now_iso8601, Error, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

pub const DEFAULT_RESET_TTL_SECS: i64 = 3600;

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct PasswordResetRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PasswordResetRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue a token for `user_id`, returning the raw value to embed in the link
    #[instrument(skip(self))]
    pub async fn create(&self, user_id: &str) -> Result<String> {
        self.create_with_ttl(user_id, Duration::seconds(DEFAULT_RESET_TTL_SECS))
            .await
    }

    #[instrument(skip(self))]
    pub async fn create_with_ttl(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let token = generate_token();
        let expires_at = (Utc::now() + ttl).to_rfc3339_opts(SecondsFormat::Micros, true);

        sqlx::query(
            "INSERT INTO password_resets (token_hash, user_id, expires_at, used, created_at) \
             VALUES (?1, ?2, ?3, FALSE, ?4)",
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(&expires_at)
        .bind(now_iso8601())
        .execute(self.pool)
        .await
        .map_err(|e| super::write_error("create password reset", e))?;

        debug!(user_id, %expires_at, "Issued password reset token");
        Ok(token)
    }

    /// Redeem a token: valid, unused and unexpired tokens yield the user id
    /// and are marked used in the same statement
    #[instrument(skip(self, token))]
    pub async fn consume(&self, token: &str) -> Result<String> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Validation("Reset token is required".to_string()));
        }

        sqlx::query_scalar::<_, String>(
            "UPDATE password_resets SET used = TRUE \
             WHERE token_hash = ?1 AND used = FALSE AND expires_at > ?2 \
             RETURNING user_id",
        )
        .bind(hash_token(token))
        .bind(now_iso8601())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to consume password reset: {}", e)))?
        .ok_or_else(|| Error::Validation("Reset link is invalid or has expired".to_string()))
    }

    /// Drop expired and used tokens; returns how many were removed
    #[instrument(skip(self))]
    pub async fn purge_stale(&self) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM password_resets WHERE used = TRUE OR expires_at <= ?1")
                .bind(now_iso8601())
                .execute(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to purge password resets: {}", e)))?;
        Ok(result.rows_affected())
    }
}
