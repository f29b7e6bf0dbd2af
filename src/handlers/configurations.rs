use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::cache::CacheKey;
use crate::error::ApiError;
use crate::models::{AppState, CurrentUser};
use crate::routes::{CONFIGURATIONS_PATH, MOBILE_CONFIGS_PATH, PUBLIC_CONFIGS_PATH};
use crate::services::configuration_service;

use super::helpers::{cached_json, json_object};

pub async fn configurations_list(State(state): State<AppState>, _user: CurrentUser) -> Result<Response, ApiError> {
    let db = state.db.clone();
    cached_json(&state, CacheKey::shared(CONFIGURATIONS_PATH), || async move {
        Ok::<_, ApiError>(configuration_service::list_configurations(&db).await?)
    })
    .await
}

pub async fn configurations_patch(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_object(payload)?;
    let updated = configuration_service::patch_configurations(&state.db, &state.secrets, &body).await?;
    tracing::info!(user_id = %user.id, keys = updated.len(), "Configurations patched");

    for path in [CONFIGURATIONS_PATH, PUBLIC_CONFIGS_PATH, MOBILE_CONFIGS_PATH] {
        state.cache.invalidate(&CacheKey::shared(path)).await;
    }
    Ok(Json(updated).into_response())
}

pub async fn public_configs(State(state): State<AppState>) -> Result<Response, ApiError> {
    let db = state.db.clone();
    cached_json(&state, CacheKey::shared(PUBLIC_CONFIGS_PATH), || async move {
        Ok::<_, ApiError>(configuration_service::public_values(&db).await?)
    })
    .await
}
