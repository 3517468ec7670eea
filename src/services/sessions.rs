// src/services/sessions.rs
//! Opaque-token session store backed by the `sessions` table.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::common::{generate_secret_token, generate_session_id, SESSION_TOKEN_BYTES};

pub const SESSION_TTL_DAYS: i64 = 7;

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Timestamps are stored as fixed-width RFC 3339 UTC so that string
/// comparison in SQL matches chronological order.
fn to_db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    db: SqlitePool,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    /// Create a session. The returned record is the only place the plaintext
    /// token is handed out.
    pub async fn create(&self, user_id: &str) -> Result<Session, sqlx::Error> {
        self.create_at(user_id, Utc::now()).await
    }

    async fn create_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<Session, sqlx::Error> {
        let session = Session {
            id: generate_session_id(),
            user_id: user_id.to_string(),
            token: generate_secret_token(SESSION_TOKEN_BYTES),
            expires_at: to_db_timestamp(now + self.ttl),
            created_at: to_db_timestamp(now),
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token)
        .bind(&session.expires_at)
        .bind(&session.created_at)
        .execute(&self.db)
        .await?;

        info!(session_id = %session.id, user_id = %user_id, expires_at = %session.expires_at, "Session created");
        Ok(session)
    }

    /// Look up a live session. Unknown and expired tokens both yield `None`.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<Session>, sqlx::Error> {
        self.get_by_token_at(token, Utc::now()).await
    }

    async fn get_by_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "SELECT id, user_id, token, expires_at, created_at FROM sessions WHERE token = ? AND expires_at > ?",
        )
        .bind(token)
        .bind(to_db_timestamp(now))
        .fetch_optional(&self.db)
        .await
    }

    /// Remove a session. Unknown tokens are not an error.
    pub async fn delete(&self, token: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.db)
            .await?;
        debug!(removed = result.rows_affected(), "Session delete");
        Ok(())
    }

    /// Invalidate every session of a user. Returns the number removed.
    pub async fn delete_all_for_user(&self, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        info!(user_id = %user_id, removed = result.rows_affected(), "User sessions invalidated");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use crate::services::users::{create_password_user, test_support::test_pool};

    async fn store_with_user() -> (SessionStore, String) {
        let pool = test_pool().await;
        let user = create_password_user(&pool, "a@x.com", None, Role::User, "{}")
            .await
            .unwrap();
        (SessionStore::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_create_then_lookup() {
        let (store, user_id) = store_with_user().await;
        let session = store.create(&user_id).await.unwrap();

        assert_ne!(session.id, session.token);
        assert!(session.id.starts_with("S_"));

        let found = store.get_by_token(&session.token).await.unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.user_id, user_id);
    }

    #[tokio::test]
    async fn test_expiry_is_seven_days() {
        let (store, user_id) = store_with_user().await;
        let now = Utc::now();
        let session = store.create_at(&user_id, now).await.unwrap();

        let expires = DateTime::parse_from_rfc3339(&session.expires_at).unwrap();
        let created = DateTime::parse_from_rfc3339(&session.created_at).unwrap();
        assert_eq!(expires - created, Duration::days(7));
    }

    #[tokio::test]
    async fn test_expired_session_is_not_found() {
        let (store, user_id) = store_with_user().await;
        let now = Utc::now();
        let session = store.create_at(&user_id, now).await.unwrap();

        let just_before = now + Duration::days(7) - Duration::seconds(1);
        assert!(store
            .get_by_token_at(&session.token, just_before)
            .await
            .unwrap()
            .is_some());

        let at_expiry = now + Duration::days(7);
        assert!(store
            .get_by_token_at(&session.token, at_expiry)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_row_in_past() {
        let (store, user_id) = store_with_user().await;
        let session = store
            .create_at(&user_id, Utc::now() - Duration::days(8))
            .await
            .unwrap();
        assert!(store.get_by_token(&session.token).await.unwrap().is_none());
        // Expired rows are filtered, not swept
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, user_id) = store_with_user().await;
        let session = store.create(&user_id).await.unwrap();

        store.delete(&session.token).await.unwrap();
        assert!(store.get_by_token(&session.token).await.unwrap().is_none());

        store.delete(&session.token).await.unwrap();
        store.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let (store, user_id) = store_with_user().await;
        let a = store.create(&user_id).await.unwrap();
        let b = store.create(&user_id).await.unwrap();
        assert_ne!(a.token, b.token);

        assert_eq!(store.delete_all_for_user(&user_id).await.unwrap(), 2);
        assert!(store.get_by_token(&a.token).await.unwrap().is_none());
        assert!(store.get_by_token(&b.token).await.unwrap().is_none());
        assert_eq!(store.delete_all_for_user(&user_id).await.unwrap(), 0);
    }
}
