pub mod app_state;
pub mod current_user;
pub mod instance;
pub mod instance_admin;
pub mod instance_configuration;
pub mod user;

pub use app_state::AppState;
pub use current_user::CurrentUser;
pub use instance::{ActivatedInstance, InactiveInstance, Instance, InstancePatch};
pub use instance_admin::InstanceAdmin;
pub use instance_configuration::{ConfigValue, InstanceConfiguration};
pub use user::{LoginContext, User, UserLite, UserProfile};
