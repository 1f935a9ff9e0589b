use std::env;
use std::str::FromStr;

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::services::tokens::TokenSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSecret,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub cors_origins: Vec<String>,
    pub login_max_attempts: usize,
    pub login_window_secs: u64,
    pub db_connect_attempts: u32,
    pub db_connect_delay_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_access_secret = required("JWT_ACCESS_SECRET")?;
        let jwt_refresh_secret = required("JWT_REFRESH_SECRET")?;
        if jwt_access_secret == jwt_refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parsed("PORT", 8080)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:auth.db?mode=rwc".to_string()),
            jwt_access_secret,
            jwt_refresh_secret,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "auth-service".to_string()),
            access_token_ttl: ttl("ACCESS_TOKEN_TTL_MINUTES", 30, Duration::try_minutes)?,
            refresh_token_ttl: ttl("REFRESH_TOKEN_TTL_DAYS", 7, Duration::try_days)?,
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            login_max_attempts: parsed("LOGIN_MAX_ATTEMPTS", 5)?,
            login_window_secs: parsed("LOGIN_WINDOW_SECS", 15 * 60)?,
            db_connect_attempts: parsed("DB_CONNECT_ATTEMPTS", 10)?,
            db_connect_delay_secs: parsed("DB_CONNECT_DELAY_SECS", 3)?,
        })
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_ttl: self.access_token_ttl,
            refresh_ttl: self.refresh_token_ttl,
            issuer: self.jwt_issuer.clone(),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// A positive lifetime that still yields a representable expiry from now.
fn ttl(
    name: &'static str,
    default: i64,
    unit: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    let value = parsed(name, default)?;
    unit(value)
        .filter(|ttl| *ttl > Duration::zero())
        .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
        .ok_or_else(|| ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
}
