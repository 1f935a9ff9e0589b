use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{StoreError, UserStore};
use crate::models::{NewUserRecord, User};

/// `UserStore` kept in process memory. Every operation holds one lock for its
/// whole duration, so conditional replacement is atomic.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: NewUserRecord) -> Result<Uuid, StoreError> {
        let mut users = self.users.lock().await;

        if users
            .values()
            .any(|existing| existing.username == user.username || existing.email == user.email)
        {
            return Err(StoreError::Duplicate);
        }

        let id = Uuid::new_v4();
        users.insert(
            id,
            User {
                id,
                username: user.username,
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                password_hash: user.password_hash,
                refresh_token: None,
                created_at: Utc::now(),
            },
        );

        Ok(id)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.users
            .lock()
            .await
            .values()
            .find(|user| user.username == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<User, StoreError> {
        self.users
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save_refresh_token(&self, id: &Uuid, token: &str) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;
        user.refresh_token = Some(token.to_string());
        Ok(())
    }

    async fn get_refresh_token(&self, id: &Uuid) -> Result<Option<String>, StoreError> {
        let users = self.users.lock().await;
        let user = users.get(id).ok_or(StoreError::NotFound)?;
        Ok(user.refresh_token.clone())
    }

    async fn replace_refresh_token(
        &self,
        id: &Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;

        if user.refresh_token.as_deref() != Some(expected) {
            return Ok(false);
        }

        user.refresh_token = Some(new.to_string());
        Ok(true)
    }

    async fn delete_refresh_token(&self, id: &Uuid) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;
        user.refresh_token = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUserRecord {
        NewUserRecord {
            username: username.to_string(),
            email: email.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_user() {
        let store = InMemoryUserStore::new();
        let id = store
            .create_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert_eq!(store.get_user_by_username("alice").await.unwrap().id, id);
        assert_eq!(store.get_user_by_id(&id).await.unwrap().username, "alice");
        assert!(matches!(
            store.get_user_by_username("bob").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_user() {
        let store = InMemoryUserStore::new();
        store
            .create_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(matches!(
            store.create_user(new_user("alice", "new@example.com")).await,
            Err(StoreError::Duplicate)
        ));
        assert!(matches!(
            store.create_user(new_user("alicia", "alice@example.com")).await,
            Err(StoreError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_replace_semantics() {
        let store = InMemoryUserStore::new();
        let id = store
            .create_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        store.save_refresh_token(&id, "one").await.unwrap();
        assert!(!store.replace_refresh_token(&id, "zero", "two").await.unwrap());
        assert!(store.replace_refresh_token(&id, "one", "two").await.unwrap());
        assert_eq!(store.get_refresh_token(&id).await.unwrap().as_deref(), Some("two"));

        store.delete_refresh_token(&id).await.unwrap();
        assert_eq!(store.get_refresh_token(&id).await.unwrap(), None);
        assert!(!store.replace_refresh_token(&id, "two", "three").await.unwrap());
    }
}
