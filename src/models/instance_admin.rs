use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DbRow;
use crate::models::user::UserLite;

/// Select list for admin rows joined with their user (`a` = admins, `u` = users).
pub const INSTANCE_ADMIN_SELECT: &str = "SELECT a.id, a.instance_id, a.user_id, a.role, a.created_at, \
     a.updated_at, u.email AS user_email, u.username AS user_username, \
     u.display_name AS user_display_name, u.first_name AS user_first_name, \
     u.last_name AS user_last_name, u.avatar AS user_avatar \
     FROM instance_admins a JOIN users u ON u.id = a.user_id";

#[derive(Clone, Debug, Serialize)]
pub struct InstanceAdmin {
    pub id: Uuid,
    pub instance: Uuid,
    pub user: Uuid,
    pub role: i64,
    pub user_detail: UserLite,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceAdmin {
    pub fn from_row(row: &DbRow) -> Result<Self, sqlx::Error> {
        let user: Uuid = row.try_get("user_id")?;
        Ok(Self {
            id: row.try_get("id")?,
            instance: row.try_get("instance_id")?,
            user,
            role: row.try_get("role")?,
            user_detail: UserLite {
                id: user,
                email: row.try_get("user_email")?,
                username: row.try_get("user_username")?,
                display_name: row.try_get("user_display_name")?,
                first_name: row.try_get("user_first_name")?,
                last_name: row.try_get("user_last_name")?,
                avatar: row.try_get("user_avatar")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
