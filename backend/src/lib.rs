//! Authentication server: registration, credential checks and the
//! access/refresh token lifecycle behind a small JSON API.

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
