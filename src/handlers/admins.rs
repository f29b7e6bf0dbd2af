use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::Value;
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::config::DEFAULT_ADMIN_ROLE;
use crate::error::ApiError;
use crate::models::{AppState, CurrentUser, UserProfile};
use crate::routes::{ADMINS_PATH, INSTANCES_PATH};
use crate::services::admin_service::{self, BootstrapRequest};

use super::helpers::{cached_json, json_object, json_object_or_empty, login_context, session_cookie, string_field};

async fn invalidate_admin_views(state: &AppState) {
    state.cache.invalidate(&CacheKey::shared(INSTANCES_PATH)).await;
    state.cache.invalidate_path(ADMINS_PATH).await;
}

pub async fn admins_create(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_object(payload)?;
    let email = string_field(&body, "email")
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("email_required", "Please provide the email of the admin."))?;
    let role = match body.get("role") {
        None | Some(Value::Null) => DEFAULT_ADMIN_ROLE,
        Some(value) => value.as_i64().ok_or_else(|| {
            ApiError::Validation(
                [("role".to_string(), vec!["A valid integer is required.".to_string()])].into(),
            )
        })?,
    };

    let admin = admin_service::create_admin(&state.db, &email, role).await?;
    tracing::info!(by = %user.id, admin_id = %admin.id, "Admin created through API");
    invalidate_admin_views(&state).await;
    Ok((StatusCode::CREATED, Json(admin)).into_response())
}

pub async fn admins_list(State(state): State<AppState>, user: CurrentUser) -> Result<Response, ApiError> {
    let db = state.db.clone();
    cached_json(&state, CacheKey::for_user(ADMINS_PATH, user.id), || async move {
        admin_service::list_admins(&db).await
    })
    .await
}

pub async fn admins_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    // An id that cannot name a row is treated like any other missing row.
    if let Ok(id) = Uuid::parse_str(&id) {
        admin_service::delete_admin(&state.db, id).await?;
        tracing::debug!(by = %user.id, admin_id = %id, "Admin delete requested");
    }
    invalidate_admin_views(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

/// First-admin sign-in. Only usable until the instance has an admin.
pub async fn admin_sign_in(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_object_or_empty(payload);
    let request = BootstrapRequest {
        email: string_field(&body, "email"),
        password: string_field(&body, "password"),
    };
    let ctx = login_context(&headers, peer);

    let user = {
        let _guard = state.bootstrap_lock.lock().await;
        admin_service::bootstrap_first_admin(&state.db, request, &ctx).await?
    };
    invalidate_admin_views(&state).await;

    let sid = state.start_session(user.id).await;
    Ok((jar.add(session_cookie(sid)), Json(UserProfile::from(&user))).into_response())
}
