use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{StoreError, UserStore};
use crate::models::{NewUserRecord, User, UserRow};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, refresh_token, created_at";

/// `UserStore` backed by the `users` table.
#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, column: &str, value: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?");
        let row: UserRow = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        User::try_from(row).map_err(|e| StoreError::InvalidRow(e.to_string()))
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create_user(&self, user: NewUserRecord) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(id)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.fetch_user("username", username).await
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<User, StoreError> {
        self.fetch_user("id", &id.to_string()).await
    }

    async fn save_refresh_token(&self, id: &Uuid, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ?")
            .bind(token)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_refresh_token(&self, id: &Uuid) -> Result<Option<String>, StoreError> {
        let token: Option<Option<String>> =
            sqlx::query_scalar("SELECT refresh_token FROM users WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        token.ok_or(StoreError::NotFound)
    }

    async fn replace_refresh_token(
        &self,
        id: &Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        // Single statement: SQLite serialises writers, so only one of two
        // racing rotations can still see `expected`.
        let result =
            sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ? AND refresh_token = ?")
                .bind(new)
                .bind(id.to_string())
                .bind(expected)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_refresh_token(&self, id: &Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET refresh_token = NULL WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
