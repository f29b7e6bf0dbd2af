//! Administrative HTTP API for a single self-hosted application instance:
//! instance metadata, first-admin bootstrap, admin management and
//! instance-wide configuration with encrypted secrets.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

pub use error::ApiError;
pub use models::AppState;
pub use routes::build_router;
