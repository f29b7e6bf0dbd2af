use chrono::Utc;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::instance::INSTANCE_COLUMNS;
use crate::models::{Instance, InstancePatch};

pub async fn get_instance<'e, E: SqliteExecutor<'e>>(db: E) -> Result<Option<Instance>, sqlx::Error> {
    sqlx::query_as::<_, Instance>(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM instances WHERE singleton = 1"
    ))
    .fetch_optional(db)
    .await
}

/// Creates the instance row if none exists. Returns the row and whether it was
/// created by this call.
pub async fn register_instance(
    pool: &DbPool,
    instance_name: &str,
    version: &str,
) -> Result<(Instance, bool), sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO instances (id, instance_name, display_name, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT(singleton) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(instance_name)
    .bind(instance_name)
    .bind(version)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let created = result.rows_affected() == 1;
    let instance = get_instance(pool)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    if created {
        tracing::info!(instance_id = %instance.id, name = %instance.instance_name, "Instance registered");
    }
    Ok((instance, created))
}

async fn save_instance<'e, E: SqliteExecutor<'e>>(db: E, instance: &Instance) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE instances SET instance_name = ?, display_name = ?, whitelist_emails = ?, namespace = ?, \
         is_telemetry_enabled = ?, is_support_required = ?, is_setup_done = ?, \
         is_signup_screen_visited = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&instance.instance_name)
    .bind(&instance.display_name)
    .bind(&instance.whitelist_emails)
    .bind(&instance.namespace)
    .bind(instance.is_telemetry_enabled)
    .bind(instance.is_support_required)
    .bind(instance.is_setup_done)
    .bind(instance.is_signup_screen_visited)
    .bind(instance.updated_at)
    .bind(instance.id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn update_instance(pool: &DbPool, patch: InstancePatch) -> Result<Instance, ApiError> {
    let mut instance = get_instance(pool)
        .await?
        .ok_or_else(ApiError::instance_not_registered)?;
    patch.apply(&mut instance);
    instance.updated_at = Utc::now();
    save_instance(pool, &instance).await?;
    Ok(instance)
}

pub async fn mark_setup_done<'e, E: SqliteExecutor<'e>>(db: E) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE instances SET is_setup_done = 1, updated_at = ? WHERE singleton = 1")
        .bind(Utc::now())
        .execute(db)
        .await?;
    Ok(())
}

pub async fn mark_signup_screen_visited(pool: &DbPool) -> Result<(), ApiError> {
    let result = sqlx::query(
        "UPDATE instances SET is_signup_screen_visited = 1, updated_at = ? WHERE singleton = 1",
    )
    .bind(Utc::now())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::instance_not_configured());
    }
    Ok(())
}
