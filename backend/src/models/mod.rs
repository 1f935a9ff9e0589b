use std::sync::Arc;

use crate::middleware::RateLimiter;
use crate::services::auth::AuthService;

pub mod user;

pub use user::*;

/// Application state shared across all handlers
pub struct AppState {
    pub auth: AuthService,
    pub login_rate_limiter: Arc<RateLimiter>,
}
