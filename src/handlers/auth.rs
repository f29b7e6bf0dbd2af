use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{AppState, UserProfile};
use crate::services::user_service;

use super::helpers::{
    expired_session_cookie, json_object_or_empty, login_context, session_cookie, session_id_from_jar,
    string_field,
};

pub async fn sign_in(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_object_or_empty(payload);
    let email = string_field(&body, "email").filter(|v| !v.trim().is_empty());
    let password = string_field(&body, "password").filter(|v| !v.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::bad_request(
            "missing_credentials",
            "Email and password are required",
        ));
    };

    let ctx = login_context(&headers, peer);
    let user = user_service::authenticate(&state.db, &email, &password, &ctx).await?;
    if let Some(old) = session_id_from_jar(&jar) {
        state.end_session(&old).await;
    }
    let sid = state.start_session(user.id).await;
    tracing::info!(user_id = %user.id, "User signed in");
    Ok((jar.add(session_cookie(sid)), Json(UserProfile::from(&user))).into_response())
}

pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(sid) = session_id_from_jar(&jar) {
        state.end_session(&sid).await;
    }
    (jar.remove(expired_session_cookie()), StatusCode::NO_CONTENT)
}
