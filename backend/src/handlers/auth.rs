use actix_web::{web, HttpResponse, Result};
use shared::{
    ApiError, ApiSuccess, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
    RegisterResponse, ValidationError,
};

use crate::middleware::AuthenticatedUser;
use crate::models::AppState;
use crate::services::auth::AuthError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/logout", web::post().to(logout))
            .route("/me", web::get().to(me)),
    );
}

async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match state.auth.register(&request).await {
        Ok(user_id) => Ok(HttpResponse::Created().json(ApiSuccess::new(RegisterResponse { user_id }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    // The attempt is counted before the password check runs; success clears it.
    if let Err(wait) = state.login_rate_limiter.try_acquire(&request.username) {
        log::warn!("Login rate limit hit for username {:?}", request.username);
        return Ok(HttpResponse::TooManyRequests()
            .insert_header(("Retry-After", wait.as_secs().max(1).to_string()))
            .json(ApiError::new(
                "too_many_requests",
                "Too many failed login attempts, try again later",
            )));
    }

    match state.auth.login(&request.username, &request.password).await {
        Ok(pair) => {
            state.login_rate_limiter.clear(&request.username);
            Ok(HttpResponse::Ok().json(ApiSuccess::new(pair)))
        }
        Err(e) => Ok(error_response(e)),
    }
}

async fn refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match state.auth.refresh(&request.refresh_token).await {
        Ok(pair) => Ok(HttpResponse::Ok().json(ApiSuccess::new(pair))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn logout(state: web::Data<AppState>, user: AuthenticatedUser) -> Result<HttpResponse> {
    match state.auth.end_session(&user.user_id).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiSuccess::new(MessageResponse {
            message: "logged out".to_string(),
        }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn me(state: web::Data<AppState>, user: AuthenticatedUser) -> Result<HttpResponse> {
    match state.auth.profile(&user.user_id).await {
        Ok(profile) => Ok(HttpResponse::Ok().json(ApiSuccess::new(profile))),
        Err(e) => Ok(error_response(e)),
    }
}

fn validation_error(e: ValidationError) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiError::new("validation_error", e.to_string()))
}

/// Translate a service error into a response. Token failures never reveal
/// which check failed.
fn error_response(e: AuthError) -> HttpResponse {
    match e {
        AuthError::DuplicateUser => HttpResponse::Conflict().json(ApiError::new(
            "duplicate_user",
            "Username or email is already taken",
        )),
        AuthError::InvalidCredentials => HttpResponse::Unauthorized().json(ApiError::new(
            "invalid_credentials",
            "Invalid username or password",
        )),
        AuthError::InvalidRefreshToken => HttpResponse::Unauthorized().json(ApiError::new(
            "invalid_refresh_token",
            "Invalid refresh token",
        )),
        AuthError::Unauthorized => HttpResponse::Unauthorized().json(ApiError::new(
            "unauthorized",
            "Invalid or missing token",
        )),
        AuthError::StoreUnavailable(e) => {
            log::error!("Store error: {:?}", e);
            HttpResponse::ServiceUnavailable().json(ApiError::new(
                "store_unavailable",
                "Storage is temporarily unavailable",
            ))
        }
        e @ (AuthError::Hashing | AuthError::TokenIssue(_)) => {
            log::error!("Internal auth error: {:?}", e);
            HttpResponse::InternalServerError().json(ApiError::new(
                "internal_error",
                "Internal server error",
            ))
        }
    }
}
