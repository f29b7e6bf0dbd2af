// Request payload validation
pub mod validation;

pub use validation::is_valid_email;
