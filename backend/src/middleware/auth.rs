use std::future::{ready, Ready};

use actix_web::{dev::Payload, error::InternalError, web, FromRequest, HttpRequest, HttpResponse};
use shared::ApiError;
use uuid::Uuid;

use crate::models::AppState;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(req: &HttpRequest) -> Result<String, AuthMiddlewareError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .ok_or(AuthMiddlewareError::MissingToken)?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthMiddlewareError::InvalidToken)?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthMiddlewareError::InvalidToken)?;

    if token.is_empty() {
        return Err(AuthMiddlewareError::MissingToken);
    }

    Ok(token.to_string())
}

/// Caller identified by a valid access token.
///
/// Using this as a handler argument rejects the request with 401 before the
/// handler runs when the header is missing or the token does not validate.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req).map_err(|e| {
            InternalError::from_response(
                e,
                HttpResponse::Unauthorized().json(ApiError::new(
                    "unauthorized",
                    "Invalid or missing token",
                )),
            )
            .into()
        }))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AuthMiddlewareError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or(AuthMiddlewareError::NotConfigured)?;

    let token = extract_bearer_token(req)?;
    let user_id = state
        .auth
        .identify_from_access_token(&token)
        .map_err(|_| AuthMiddlewareError::InvalidToken)?;

    Ok(AuthenticatedUser { user_id })
}

#[derive(Debug)]
pub enum AuthMiddlewareError {
    MissingToken,
    InvalidToken,
    NotConfigured,
}

impl std::fmt::Display for AuthMiddlewareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMiddlewareError::MissingToken => write!(f, "Missing authorization token"),
            AuthMiddlewareError::InvalidToken => write!(f, "Invalid authorization token"),
            AuthMiddlewareError::NotConfigured => write!(f, "Authentication is not configured"),
        }
    }
}

impl std::error::Error for AuthMiddlewareError {}
