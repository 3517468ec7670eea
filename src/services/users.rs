// src/services/users.rs
//! Queries over `users`, plus the transactional create paths that also write
//! the user's first credential binding.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::auth::models::{Role, User, PASSWORD_PROVIDER};
use crate::common::{generate_auth_provider_id, generate_user_id, safe_email_log};

const USER_COLUMNS: &str = "id, email, name, role, created_at, updated_at";

pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users ORDER BY created_at DESC, id ASC",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Set a user's role. Returns `None` when the user does not exist.
pub async fn update_user_role(
    pool: &SqlitePool,
    id: &str,
    role: Role,
) -> Result<Option<User>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET role = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(role.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    info!(user_id = %id, role = %role, "User role updated");
    find_user_by_id(pool, id).await
}

async fn insert_user(
    conn: &mut SqliteConnection,
    email: &str,
    name: Option<&str>,
    role: Role,
) -> Result<String, sqlx::Error> {
    let id = generate_user_id();
    sqlx::query("INSERT INTO users (id, email, name, role) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(role.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(id)
}

pub(crate) async fn insert_binding(
    conn: &mut SqliteConnection,
    user_id: &str,
    provider: &str,
    provider_id: Option<&str>,
    password_hash: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_auth_providers (id, user_id, provider, provider_id, password_hash) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(generate_auth_provider_id())
    .bind(user_id)
    .bind(provider)
    .bind(provider_id)
    .bind(password_hash)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Create a user together with its password binding in one transaction.
///
/// A duplicate email surfaces as a unique-constraint violation; see
/// [`is_unique_violation`].
pub async fn create_password_user(
    pool: &SqlitePool,
    email: &str,
    name: Option<&str>,
    role: Role,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let user_id = insert_user(&mut tx, email, name, role).await?;
    insert_binding(&mut tx, &user_id, PASSWORD_PROVIDER, None, Some(password_hash)).await?;
    tx.commit().await?;

    debug!(user_id = %user_id, email = %safe_email_log(email), role = %role, "Created password user");
    find_user_by_id(pool, &user_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// Create a user that signs in through an external provider, with its binding.
pub async fn create_oauth_user(
    pool: &SqlitePool,
    email: &str,
    name: Option<&str>,
    provider: &str,
    provider_id: &str,
) -> Result<User, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let user_id = insert_user(&mut tx, email, name, Role::User).await?;
    insert_binding(&mut tx, &user_id, provider, Some(provider_id), None).await?;
    tx.commit().await?;

    debug!(user_id = %user_id, provider = %provider, "Created OAuth user");
    find_user_by_id(pool, &user_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Single-connection in-memory pool with the full schema.
    pub async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::common::migrations::run_migrations(&pool).await.unwrap();
        pool
    }
}
