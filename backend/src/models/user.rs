use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for users
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored user. Deliberately not `Serialize`: the password hash and the
/// refresh-token digest stay inside the server.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn to_profile(&self) -> shared::UserProfile {
        shared::UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            created_at: self.created_at,
        }
    }
}

impl TryFrom<UserRow> for User {
    type Error = uuid::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
        })
    }
}

/// Fields needed to create a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: String) -> UserRow {
        UserRow {
            id,
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            password_hash: "hashed".to_string(),
            refresh_token: Some("digest".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_row_to_profile() {
        let id = Uuid::new_v4();

        let user = User::try_from(row(id.to_string())).unwrap();
        let profile = user.to_profile();

        assert_eq!(profile.id, id);
        assert_eq!(profile.username, "testuser");
        assert_eq!(profile.email, "test@example.com");
        assert_eq!(profile.first_name, "Test");
        assert_eq!(profile.last_name, "User");
        assert_eq!(user.refresh_token.as_deref(), Some("digest"));
    }

    #[test]
    fn test_user_row_with_bad_id() {
        assert!(User::try_from(row("not-a-uuid".to_string())).is_err());
    }
}
