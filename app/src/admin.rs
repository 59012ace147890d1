//! ABOUTME: Bootstrap of administrator accounts from the command line
//! ABOUTME: Creates a new admin or promotes an existing account to admin

use sb_core::{Error, Result};
use sb_db::{CreateUserRequest, Db, Role, User, UserRepository};
use sb_web::auth::{PasswordAuth, MIN_PASSWORD_LEN};
use tracing::info;
use validator::ValidateEmail;

/// What `create_admin` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOutcome {
    Created,
    Promoted,
}

/// Create an admin, or promote and re-password the account that owns `email`
pub async fn create_admin(db: &Db, email: &str, password: &str) -> Result<(User, AdminOutcome)> {
    let email = email.trim().to_lowercase();
    if !email.validate_email() {
        return Err(Error::Validation(format!("'{}' is not a valid email", email)));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let repo = UserRepository::new(db.pool());
    let password_hash = PasswordAuth::hash_password(password)?;

    if let Some(existing) = repo.find_by_email(&email).await? {
        repo.set_role(&existing.id, Role::Admin).await?;
        repo.set_password(&existing.id, &password_hash).await?;
        repo.set_status(&existing.id, "active").await?;
        info!(user_id = %existing.id, "Promoted existing user to admin");
        let user = repo
            .find_by_id(&existing.id)
            .await?
            .ok_or_else(|| Error::NotFound("User vanished during promotion".to_string()))?;
        return Ok((user, AdminOutcome::Promoted));
    }

    let user = repo
        .create(CreateUserRequest {
            email,
            password_hash,
            role: Role::Admin,
            first_name: "Admin".to_string(),
            last_name: String::new(),
            country_id: None,
            city: None,
            phone: None,
            telegram: None,
            linkedin: None,
        })
        .await?;
    info!(user_id = %user.id, "Created admin user");
    Ok((user, AdminOutcome::Created))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Db {
        let dir = test_support::temp_dir_path();
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join(test_support::unique_db_name("admin"));
        Db::new(&path.to_string_lossy()).await.expect("db")
    }

    #[tokio::test]
    async fn test_create_then_promote() {
        let db = test_db().await;

        let (user, outcome) = create_admin(&db, "Root@Example.com", "secret123")
            .await
            .expect("create");
        assert_eq!(outcome, AdminOutcome::Created);
        assert_eq!(user.email, "root@example.com");
        assert_eq!(user.role(), Role::Admin);

        let (again, outcome) = create_admin(&db, "root@example.com", "another123")
            .await
            .expect("promote");
        assert_eq!(outcome, AdminOutcome::Promoted);
        assert_eq!(again.id, user.id);
        assert!(PasswordAuth::verify_password("another123", &again.password_hash).expect("verify"));
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let db = test_db().await;
        assert!(matches!(
            create_admin(&db, "nope", "secret123").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            create_admin(&db, "a@example.com", "123").await,
            Err(Error::Validation(_))
        ));
    }
}
