use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewUserRecord, User};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryUserStore;
pub use sqlite::SqliteUserStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User already exists")]
    Duplicate,
    #[error("User not found")]
    NotFound,
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence for users and their single live refresh token.
///
/// Refresh tokens are stored as opaque strings; the caller decides what it
/// hands over (the auth service stores digests, not raw tokens).
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user and return its new id. Fails with `Duplicate` if the
    /// username or email is taken.
    async fn create_user(&self, user: NewUserRecord) -> Result<Uuid, StoreError>;

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError>;

    async fn get_user_by_id(&self, id: &Uuid) -> Result<User, StoreError>;

    /// Set the user's refresh token, replacing whatever was there.
    async fn save_refresh_token(&self, id: &Uuid, token: &str) -> Result<(), StoreError>;

    async fn get_refresh_token(&self, id: &Uuid) -> Result<Option<String>, StoreError>;

    /// Replace the refresh token only if it still equals `expected`.
    ///
    /// Returns `false` when the stored value changed underneath the caller,
    /// which is how a concurrent rotation of the same token is detected.
    async fn replace_refresh_token(
        &self,
        id: &Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError>;

    async fn delete_refresh_token(&self, id: &Uuid) -> Result<(), StoreError>;
}

/// Open a SQLite pool, retrying while the database is not reachable yet.
pub async fn connect_with_retry(
    database_url: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<SqlitePool, sqlx::Error> {
    let mut attempt = 1;

    loop {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < max_attempts => {
                log::warn!(
                    "Database connection attempt {}/{} failed: {}",
                    attempt,
                    max_attempts,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                log::error!("Database connection failed after {} attempts", attempt);
                return Err(e);
            }
        }
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_with_retry_in_memory() {
        let pool = connect_with_retry("sqlite::memory:", 1, Duration::from_millis(10))
            .await
            .unwrap();

        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let result = connect_with_retry(
            "sqlite:/nonexistent-dir/missing.db",
            2,
            Duration::from_millis(10),
        )
        .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(StoreError::Duplicate.to_string(), "User already exists");
        assert_eq!(StoreError::NotFound.to_string(), "User not found");
    }
}
