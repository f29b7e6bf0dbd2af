pub mod admin_service;
pub mod configuration_service;
pub mod instance_service;
pub mod user_service;

// Re-export commonly used functions
pub use user_service::{generate_password_hash, random_session_id, verify_password};
