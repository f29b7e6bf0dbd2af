pub mod admins;
pub mod auth;
pub mod configurations;
pub mod helpers;
pub mod instances;
pub mod middleware;

pub use admins::{admin_sign_in, admins_create, admins_delete, admins_list};
pub use auth::{sign_in, sign_out};
pub use configurations::{configurations_list, configurations_patch, public_configs};
pub use instances::{instance_get, instance_patch, signup_screen_visited};
