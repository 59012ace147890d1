//! ABOUTME: Authentication utilities for password hashing and JWT sessions
//! ABOUTME: Issues the auth_token cookie shared by pages and the JSON API

use crate::models::Claims;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use sb_core::{Error, Result};
use sb_db::Role;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// Cookie holding the session JWT
pub const AUTH_COOKIE: &str = "auth_token";

/// Shortest password accepted anywhere a user picks one
pub const MIN_PASSWORD_LEN: usize = 6;

/// Password hashing utilities
pub struct PasswordAuth;

impl PasswordAuth {
    /// Hash a password using Argon2
    #[instrument(skip(password))]
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("Failed to hash password: {}", e)))?
            .to_string();

        debug!("Password hashed successfully");
        Ok(password_hash)
    }

    /// Verify a password against a stored hash
    #[instrument(skip(password, hash))]
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("Invalid password hash format: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

/// JWT token utilities
pub struct JwtAuth;

impl JwtAuth {
    /// JWT token expiration time in seconds (24 hours)
    const TOKEN_EXPIRATION_SECS: u64 = 24 * 60 * 60;

    #[instrument(skip(secret))]
    pub fn create_token(user_id: &str, email: &str, role: Role, secret: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Config(format!("Time error: {}", e)))?
            .as_secs() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            exp: now + Self::TOKEN_EXPIRATION_SECS as usize,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .map_err(|e| Error::Config(format!("Failed to create JWT: {}", e)))
    }

    #[instrument(skip(token, secret))]
    pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|e| Error::Unauthorized(format!("Invalid JWT: {}", e)))?;

        Ok(token_data.claims)
    }

    pub fn token_expiration_secs() -> u64 {
        Self::TOKEN_EXPIRATION_SECS
    }
}

/// Session cookie carrying a freshly issued token
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(JwtAuth::token_expiration_secs() as i64))
        .finish()
}

/// Expired cookie that clears the session
pub fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(AUTH_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_and_verify() {
        let hash = PasswordAuth::hash_password("test_password_123").expect("hash");
        assert!(hash.starts_with("$argon2"));

        assert!(PasswordAuth::verify_password("test_password_123", &hash).expect("verify"));
        assert!(!PasswordAuth::verify_password("wrong_password", &hash).expect("verify"));
        assert!(PasswordAuth::verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_jwt_create_and_verify() {
        let secret = "test_secret_key";
        let token = JwtAuth::create_token("user_123", "aida@example.com", Role::Startuper, secret)
            .expect("token");

        let claims = JwtAuth::verify_token(&token, secret).expect("claims");
        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.role, "startuper");
        assert!(claims.exp > claims.iat);

        assert!(matches!(
            JwtAuth::verify_token(&token, "wrong_secret"),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("abc".to_string(), true);
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));

        let removal = clear_session_cookie();
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(CookieDuration::ZERO));
    }
}
