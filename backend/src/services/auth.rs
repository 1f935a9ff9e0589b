use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{StoreError, UserStore};
use crate::models::NewUserRecord;
use crate::services::password::{hash_password, verify_password};
use crate::services::tokens::{TokenCodec, TokenError, TokenKind};
use shared::{RegisterRequest, TokenPair, UserProfile};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already exists")]
    DuplicateUser,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("Password hashing error")]
    Hashing,
    #[error("Token issue error: {0}")]
    TokenIssue(TokenError),
}

/// Registration, login and the refresh-token lifecycle.
///
/// Holds no per-request state; clones share the same store and codec.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenCodec>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: Arc<dyn TokenCodec>) -> Self {
        Self { store, tokens }
    }

    /// Create a user. The request shape is checked at the HTTP boundary.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Uuid, AuthError> {
        let password_hash = hash_password(&request.password).map_err(|_| AuthError::Hashing)?;

        let id = self
            .store
            .create_user(NewUserRecord {
                username: request.username.clone(),
                email: request.email.clone(),
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                password_hash,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => AuthError::DuplicateUser,
                other => AuthError::StoreUnavailable(other),
            })?;

        log::info!("Registered user {}", id);
        Ok(id)
    }

    /// Check credentials and start a session, replacing any previous one.
    ///
    /// Unknown usernames and wrong passwords fail identically.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = match self.store.get_user_by_username(username).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                if let Some(hash) = dummy_hash() {
                    let _ = verify_password(password, hash);
                }
                log::debug!("Login failed: unknown username");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        verify_password(password, &user.password_hash).map_err(|_| {
            log::debug!("Login failed: wrong password for user {}", user.id);
            AuthError::InvalidCredentials
        })?;

        let pair = self.issue_pair(&user.id)?;
        self.store
            .save_refresh_token(&user.id, &token_digest(&pair.refresh_token))
            .await?;

        log::info!("User {} logged in", user.id);
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. Each refresh token is accepted once.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let user_id = self
            .tokens
            .validate(refresh_token, TokenKind::Refresh)
            .map_err(|e| {
                log::debug!("Refresh token rejected: {}", e);
                AuthError::InvalidRefreshToken
            })?;

        let presented = token_digest(refresh_token);
        let stored = match self.store.get_refresh_token(&user_id).await {
            Ok(stored) => stored,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidRefreshToken),
            Err(e) => return Err(e.into()),
        };

        if stored.as_deref() != Some(presented.as_str()) {
            log::warn!("Superseded or revoked refresh token presented for user {}", user_id);
            return Err(AuthError::InvalidRefreshToken);
        }

        let pair = self.issue_pair(&user_id)?;
        let rotated = match self
            .store
            .replace_refresh_token(&user_id, &presented, &token_digest(&pair.refresh_token))
            .await
        {
            Ok(rotated) => rotated,
            Err(StoreError::NotFound) => false,
            Err(e) => return Err(e.into()),
        };

        if !rotated {
            log::warn!("Concurrent refresh lost the race for user {}", user_id);
            return Err(AuthError::InvalidRefreshToken);
        }

        log::debug!("Rotated refresh token for user {}", user_id);
        Ok(pair)
    }

    /// End the session of the access token's owner.
    pub async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let user_id = self.identify_from_access_token(access_token)?;
        self.end_session(&user_id).await
    }

    /// Clear the stored refresh token of an already identified user.
    pub async fn end_session(&self, user_id: &Uuid) -> Result<(), AuthError> {
        match self.store.delete_refresh_token(user_id).await {
            Ok(()) => {
                log::info!("User {} logged out", user_id);
                Ok(())
            }
            Err(StoreError::NotFound) => Err(AuthError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn me(&self, access_token: &str) -> Result<UserProfile, AuthError> {
        let user_id = self.identify_from_access_token(access_token)?;
        self.profile(&user_id).await
    }

    /// Public profile of an already identified user.
    pub async fn profile(&self, user_id: &Uuid) -> Result<UserProfile, AuthError> {
        match self.store.get_user_by_id(user_id).await {
            Ok(user) => Ok(user.to_profile()),
            Err(StoreError::NotFound) => Err(AuthError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve an access token to its user id without touching the store.
    pub fn identify_from_access_token(&self, access_token: &str) -> Result<Uuid, AuthError> {
        self.tokens
            .validate(access_token, TokenKind::Access)
            .map_err(|e| {
                log::debug!("Access token rejected: {}", e);
                AuthError::Unauthorized
            })
    }

    fn issue_pair(&self, user_id: &Uuid) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self
                .tokens
                .issue(user_id, TokenKind::Access)
                .map_err(AuthError::TokenIssue)?,
            refresh_token: self
                .tokens
                .issue(user_id, TokenKind::Refresh)
                .map_err(AuthError::TokenIssue)?,
        })
    }
}

/// Refresh tokens are stored as SHA-256 hex digests, never in the clear.
fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Hash verified against when the username is unknown, so both failure
/// paths cost one Argon2 verification.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("dummy-password-for-timing").ok())
        .as_deref()
}
