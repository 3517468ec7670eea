// src/services/auth_providers.rs
//! Queries over `user_auth_providers`.

use sqlx::{FromRow, SqlitePool};

use super::users::insert_binding;
use crate::auth::models::{AuthProvider, PASSWORD_PROVIDER};

/// Password credential joined with its owning user
#[derive(FromRow, Debug)]
pub struct PasswordCredential {
    pub user_id: String,
    pub password_hash: Option<String>,
}

pub async fn get_password_auth_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<PasswordCredential>, sqlx::Error> {
    sqlx::query_as::<_, PasswordCredential>(
        r#"
        SELECT u.id AS user_id, uap.password_hash AS password_hash
        FROM user_auth_providers uap
        JOIN users u ON uap.user_id = u.id
        WHERE uap.provider = ? AND u.email = ?
        "#,
    )
    .bind(PASSWORD_PROVIDER)
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn get_auth_provider_by_provider_id(
    pool: &SqlitePool,
    provider: &str,
    provider_id: &str,
) -> Result<Option<AuthProvider>, sqlx::Error> {
    sqlx::query_as::<_, AuthProvider>(
        "SELECT id, user_id, provider, provider_id, password_hash, created_at FROM user_auth_providers WHERE provider = ? AND provider_id = ?",
    )
    .bind(provider)
    .bind(provider_id)
    .fetch_optional(pool)
    .await
}

/// Bind an existing user to an external identity.
pub async fn create_oauth_provider(
    pool: &SqlitePool,
    user_id: &str,
    provider: &str,
    provider_id: &str,
) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    insert_binding(&mut conn, user_id, provider, Some(provider_id), None).await
}
