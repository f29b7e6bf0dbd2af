use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::cache::CacheKey;
use crate::error::ApiError;
use crate::models::{ActivatedInstance, AppState, CurrentUser, InactiveInstance, InstancePatch};
use crate::routes::INSTANCES_PATH;
use crate::services::instance_service;

use super::helpers::{cached_json, json_object};

pub async fn instance_get(State(state): State<AppState>) -> Result<Response, ApiError> {
    let db = state.db.clone();
    cached_json(&state, CacheKey::shared(INSTANCES_PATH), || async move {
        let body = match instance_service::get_instance(&db).await? {
            Some(instance) => serde_json::to_value(ActivatedInstance::from(&instance))?,
            None => serde_json::to_value(InactiveInstance::default())?,
        };
        Ok::<_, ApiError>(body)
    })
    .await
}

pub async fn instance_patch(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_object(payload)?;
    let patch = InstancePatch::from_json(&body).map_err(ApiError::Validation)?;
    let instance = instance_service::update_instance(&state.db, patch).await?;
    tracing::info!(user_id = %user.id, instance_id = %instance.id, "Instance updated");
    state.cache.invalidate(&CacheKey::shared(INSTANCES_PATH)).await;
    Ok(Json(ActivatedInstance::from(&instance)).into_response())
}

pub async fn signup_screen_visited(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    instance_service::mark_signup_screen_visited(&state.db).await?;
    state.cache.invalidate(&CacheKey::shared(INSTANCES_PATH)).await;
    Ok(StatusCode::NO_CONTENT)
}
