use chrono::Utc;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::db::{DbPool, DbRow};
use crate::error::ApiError;
use crate::models::instance_admin::INSTANCE_ADMIN_SELECT;
use crate::models::{InstanceAdmin, LoginContext, User};
use crate::services::{instance_service, user_service};
use crate::utils::is_valid_email;

/// Credentials posted to the first-admin sign-in endpoint. Fields are kept
/// optional so a missing value reports the same error as a blank one.
#[derive(Debug, Default)]
pub struct BootstrapRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Role of `user_id` on the registered instance, if they are an admin.
pub async fn admin_role_for(pool: &DbPool, user_id: Uuid) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT a.role FROM instance_admins a JOIN instances i ON i.id = a.instance_id \
         WHERE i.singleton = 1 AND a.user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

async fn admin_exists<'e, E: SqliteExecutor<'e>>(db: E, instance_id: Uuid) -> Result<bool, sqlx::Error> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM instance_admins WHERE instance_id = ? LIMIT 1")
        .bind(instance_id)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

async fn get_admin(pool: &DbPool, id: Uuid) -> Result<Option<InstanceAdmin>, sqlx::Error> {
    let row: Option<DbRow> = sqlx::query(&format!("{INSTANCE_ADMIN_SELECT} WHERE a.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(InstanceAdmin::from_row).transpose()
}

pub async fn list_admins(pool: &DbPool) -> Result<Vec<InstanceAdmin>, ApiError> {
    let instance = instance_service::get_instance(pool)
        .await?
        .ok_or_else(ApiError::instance_not_registered)?;
    let rows = sqlx::query(&format!(
        "{INSTANCE_ADMIN_SELECT} WHERE a.instance_id = ? ORDER BY a.created_at, u.email"
    ))
    .bind(instance.id)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(InstanceAdmin::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError::from)
}

/// Grants `role` on the instance to the existing user with `email`.
pub async fn create_admin(pool: &DbPool, email: &str, role: i64) -> Result<InstanceAdmin, ApiError> {
    let instance = instance_service::get_instance(pool)
        .await?
        .ok_or_else(ApiError::instance_not_registered)?;
    let email = user_service::normalize_email(email);
    let user = user_service::find_user_by_email(pool, &email)
        .await?
        .ok_or_else(|| ApiError::not_found("user_not_found", "User with this email does not exist"))?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let inserted = sqlx::query(
        "INSERT INTO instance_admins (id, instance_id, user_id, role, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(instance.id)
    .bind(user.id)
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(ApiError::conflict(
                "already_admin",
                "User is already an admin of this instance",
            ));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(admin_id = %id, user_id = %user.id, role, "Instance admin added");
    get_admin(pool, id).await?.ok_or(ApiError::Database(sqlx::Error::RowNotFound))
}

/// Removes the admin row `id` of the registered instance. Unknown ids are a no-op.
pub async fn delete_admin(pool: &DbPool, id: Uuid) -> Result<(), ApiError> {
    let result = sqlx::query(
        "DELETE FROM instance_admins WHERE id = ? \
         AND instance_id IN (SELECT id FROM instances WHERE singleton = 1)",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() > 0 {
        tracing::info!(admin_id = %id, "Instance admin removed");
    }
    Ok(())
}

/// Inserts the admin row only while the instance has none, so two racing
/// bootstraps cannot both succeed.
async fn insert_first_admin<'e, E: SqliteExecutor<'e>>(
    db: E,
    instance_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO instance_admins (id, instance_id, user_id, role, created_at, updated_at) \
         SELECT ?, ?, ?, ?, ?, ? \
         WHERE NOT EXISTS (SELECT 1 FROM instance_admins WHERE instance_id = ?)",
    )
    .bind(Uuid::new_v4())
    .bind(instance_id)
    .bind(user_id)
    .bind(crate::config::DEFAULT_ADMIN_ROLE)
    .bind(now)
    .bind(now)
    .bind(instance_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Signs in (or signs up) the first instance admin and completes setup.
///
/// Checks run in order: instance registered, no admin yet, both fields given,
/// email well formed, password matches an existing account. The admin insert,
/// the user's login stamp and `is_setup_done` commit together.
pub async fn bootstrap_first_admin(
    pool: &DbPool,
    request: BootstrapRequest,
    ctx: &LoginContext,
) -> Result<User, ApiError> {
    let instance = instance_service::get_instance(pool)
        .await?
        .ok_or_else(ApiError::instance_not_configured)?;
    if admin_exists(pool, instance.id).await? {
        return Err(ApiError::admin_already_registered());
    }

    let password = request.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (present(request.email), password) else {
        return Err(ApiError::bad_request(
            "missing_credentials",
            "Email and password are required",
        ));
    };
    let email = user_service::normalize_email(&email);
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("invalid_email", "Please provide a valid email address."));
    }

    let existing = user_service::find_user_by_email(pool, &email).await?;
    let new_hash = match &existing {
        Some(user) => {
            if !user_service::check_password(user.password.clone(), password).await? {
                return Err(ApiError::invalid_credentials());
            }
            None
        }
        None => Some(user_service::hash_password(password).await?),
    };

    let mut tx = pool.begin().await?;
    let mut user = match (existing, new_hash) {
        (Some(user), _) => user,
        (None, Some(hash)) => user_service::insert_user(&mut *tx, &email, hash).await?,
        (None, None) => return Err(ApiError::Internal("password hash missing for new user".into())),
    };
    user_service::record_login(&mut *tx, &mut user, ctx).await?;
    if !insert_first_admin(&mut *tx, instance.id, user.id).await? {
        // Dropping the transaction rolls back the user insert and login stamp.
        return Err(ApiError::admin_already_registered());
    }
    instance_service::mark_setup_done(&mut *tx).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, instance_id = %instance.id, "First instance admin registered");
    Ok(user)
}
