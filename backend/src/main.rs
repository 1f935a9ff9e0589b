use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use auth_server::config::Config;
use auth_server::db::{self, SqliteUserStore};
use auth_server::handlers;
use auth_server::middleware::RateLimiter;
use auth_server::models::AppState;
use auth_server::services::auth::AuthService;
use auth_server::services::tokens::JwtTokenCodec;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Starting server at {}:{}", config.host, config.port);

    let pool = db::connect_with_retry(
        &config.database_url,
        config.db_connect_attempts,
        Duration::from_secs(config.db_connect_delay_secs),
    )
    .await
    .map_err(std::io::Error::other)?;

    db::run_migrations(&pool)
        .await
        .map_err(std::io::Error::other)?;

    log::info!("Database migrations completed");

    let tokens = JwtTokenCodec::new(
        &config.jwt_access_secret,
        &config.jwt_refresh_secret,
        config.token_settings(),
    );
    log::info!(
        "Issuing tokens as {:?} (access {} min, refresh {} days)",
        tokens.settings().issuer,
        tokens.settings().access_ttl.num_minutes(),
        tokens.settings().refresh_ttl.num_days()
    );

    let app_state = web::Data::new(AppState {
        auth: AuthService::new(Arc::new(SqliteUserStore::new(pool)), Arc::new(tokens)),
        login_rate_limiter: Arc::new(RateLimiter::new(
            config.login_max_attempts,
            config.login_window_secs,
        )),
    });

    let allowed_origins = config.cors_origins.clone();

    HttpServer::new(move || {
        let allowed_origins = allowed_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origin_str = origin.to_str().unwrap_or("");
                allowed_origins.iter().any(|allowed| origin_str == allowed)
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type"])
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
