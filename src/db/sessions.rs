//! Login session storage.
//!
//! Only the digest of a session token is stored; see [`crate::security::session`].

use super::{DbError, now};
use crate::security::session::{generate_token, token_digest};
use sqlx::SqlitePool;

/// Repository for login sessions.
pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a session for `user_id`, returning the raw token for the cookie.
    pub async fn create(&self, user_id: i64, ttl_secs: i64) -> Result<String, DbError> {
        let token = generate_token();
        let now = now();
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token_digest(&token))
        .bind(user_id)
        .bind(now)
        .bind(now + ttl_secs)
        .execute(self.pool)
        .await?;
        Ok(token)
    }

    /// Resolve a raw token to the owning active user id, if the session is live.
    pub async fn resolve(&self, token: &str) -> Result<Option<i64>, DbError> {
        let user_id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT s.user_id
            FROM sessions s JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ? AND s.expires_at > ? AND u.is_active = 1
            "#,
        )
        .bind(token_digest(token))
        .bind(now())
        .fetch_optional(self.pool)
        .await?;
        Ok(user_id)
    }

    /// Delete the session behind a raw token.
    pub async fn delete(&self, token: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_digest(token))
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Drop every expired session, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
