//! ABOUTME: Stateless CSRF tokens bound to the signed-in user
//! ABOUTME: Token is "{unix_ts}.{sha256(user:ts:secret)}" and expires after an hour

use sb_core::time::unix_now_secs;
use sha2::{Digest, Sha256};

/// Form field carrying the token
pub const CSRF_FIELD: &str = "csrf_token";

pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

fn now_secs() -> u64 {
    unix_now_secs() as u64
}

fn signature(user_id: &str, ts: u64, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", user_id, ts, secret).as_bytes());
    hex::encode(hasher.finalize())
}

/// Issue a token for `user_id` at the current time
pub fn issue(user_id: &str, secret: &str) -> String {
    issue_at(user_id, secret, now_secs())
}

fn issue_at(user_id: &str, secret: &str, ts: u64) -> String {
    format!("{}.{}", ts, signature(user_id, ts, secret))
}

/// Check signature and age; tokens from the future are rejected too
pub fn verify(token: &str, user_id: &str, secret: &str, max_age_secs: u64) -> bool {
    verify_at(token, user_id, secret, max_age_secs, now_secs())
}

fn verify_at(token: &str, user_id: &str, secret: &str, max_age_secs: u64, now: u64) -> bool {
    let Some((ts, sig)) = token.split_once('.') else {
        return false;
    };
    let Ok(ts) = ts.parse::<u64>() else {
        return false;
    };
    if ts > now || now - ts > max_age_secs {
        return false;
    }
    constant_time_eq(sig.as_bytes(), signature(user_id, ts, secret).as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_32_characters_minimum";

    #[test]
    fn test_issued_token_verifies_for_same_user() {
        let token = issue("user-1", SECRET);
        assert!(verify(&token, "user-1", SECRET, DEFAULT_MAX_AGE_SECS));
        assert!(!verify(&token, "user-2", SECRET, DEFAULT_MAX_AGE_SECS));
        assert!(!verify(&token, "user-1", "other-secret", DEFAULT_MAX_AGE_SECS));
    }

    #[test]
    fn test_token_expiry_window() {
        let token = issue_at("u", SECRET, 1_000);
        assert!(verify_at(&token, "u", SECRET, 3600, 1_000 + 3600));
        assert!(!verify_at(&token, "u", SECRET, 3600, 1_000 + 3601));
        assert!(!verify_at(&token, "u", SECRET, 3600, 999));
    }

    #[test]
    fn test_token_is_stamped_with_the_shared_clock() {
        let before = unix_now_secs() as u64;
        let token = issue("u", SECRET);
        let after = unix_now_secs() as u64;
        let ts: u64 = token
            .split_once('.')
            .and_then(|(ts, _)| ts.parse().ok())
            .expect("timestamp");
        assert!(before <= ts && ts <= after);
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        for token in ["", "abc", "123", "x.y", "123.", ".abcdef"] {
            assert!(!verify(token, "u", SECRET, DEFAULT_MAX_AGE_SECS), "{}", token);
        }
    }
}
