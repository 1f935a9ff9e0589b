use actix_web::web;

pub mod auth;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1").configure(auth::configure));
}
