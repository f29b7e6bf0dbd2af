use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const USER_COLUMNS: &str = "id, email, username, password, display_name, first_name, last_name, \
     avatar, is_active, is_password_autoset, last_active, last_login_time, last_login_ip, \
     last_login_uagent, token_updated_at, date_joined";

#[derive(Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// PBKDF2 hash, never serialized.
    pub password: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
    pub is_active: bool,
    pub is_password_autoset: bool,
    pub last_active: Option<DateTime<Utc>>,
    pub last_login_time: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub last_login_uagent: Option<String>,
    pub token_updated_at: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Request metadata recorded on sign-in.
#[derive(Clone, Debug, Default)]
pub struct LoginContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// What a user sees about themselves after signing in.
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
    pub is_active: bool,
    pub is_password_autoset: bool,
    pub last_login_time: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar: user.avatar.clone(),
            is_active: user.is_active,
            is_password_autoset: user.is_password_autoset,
            last_login_time: user.last_login_time,
            date_joined: user.date_joined,
        }
    }
}

/// Compact user summary nested in other resources.
#[derive(Clone, Debug, Serialize)]
pub struct UserLite {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
}
