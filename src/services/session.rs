//! Session validation: opaque bearer tokens mapped to user ids.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::errors::{FilesError, FilesResult};

/// Lifetime of tokens minted by [`SqliteSessions::issue`] unless overridden.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolves a bearer token to the user it was issued to.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// `Ok(None)` for unknown or expired tokens.
    async fn validate(&self, token: &str) -> FilesResult<Option<Uuid>>;
}

/// Token store kept in the `sessions` table.
#[derive(Clone)]
pub struct SqliteSessions {
    db: Arc<SqlitePool>,
}

impl SqliteSessions {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Mint a token for `user_id` that expires after `ttl`.
    pub async fn issue(&self, user_id: Uuid, ttl: Duration) -> FilesResult<String> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id.to_string())
            .bind(expires_at)
            .execute(&*self.db)
            .await?;
        Ok(token)
    }
}

#[async_trait]
impl SessionValidator for SqliteSessions {
    async fn validate(&self, token: &str) -> FilesResult<Option<Uuid>> {
        if token.is_empty() {
            return Ok(None);
        }
        let user_id: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM sessions WHERE token = ? AND expires_at > ?")
                .bind(token)
                .bind(Utc::now().timestamp_millis())
                .fetch_optional(&*self.db)
                .await?;

        match user_id {
            Some(raw) => Uuid::parse_str(&raw)
                .map(Some)
                .map_err(|_| FilesError::Upstream("corrupt session row".into())),
            None => Ok(None),
        }
    }
}
