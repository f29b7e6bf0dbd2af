use std::future::Future;
use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cache::{CacheKey, CachedResponse};
use crate::config::SESSION_COOKIE;
use crate::error::ApiError;
use crate::models::{AppState, LoginContext};

pub fn session_id_from_jar(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

pub async fn current_user_id_from_jar(state: &AppState, jar: &CookieJar) -> Option<Uuid> {
    let sid = session_id_from_jar(jar)?;
    state.session_user(&sid).await
}

pub fn session_cookie(sid: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, sid);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie
}

pub fn expired_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookie
}

/// Unwraps a JSON body that must be an object.
pub fn json_object(payload: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, ApiError> {
    match payload {
        Ok(Json(Value::Object(map))) => Ok(map),
        Ok(Json(_)) => Err(ApiError::bad_request("invalid_body", "Expected a JSON object")),
        Err(rejection) => Err(ApiError::bad_request("invalid_body", rejection.body_text())),
    }
}

/// Like [`json_object`], but an absent or unreadable body counts as `{}`.
pub fn json_object_or_empty(payload: Result<Json<Value>, JsonRejection>) -> Map<String, Value> {
    match payload {
        Ok(Json(Value::Object(map))) => map,
        _ => Map::new(),
    }
}

pub fn string_field(body: &Map<String, Value>, field: &str) -> Option<String> {
    body.get(field).and_then(Value::as_str).map(str::to_string)
}

pub fn login_context(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> LoginContext {
    LoginContext {
        ip: peer.map(|ConnectInfo(addr)| addr.ip().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Serves `key` from the response cache, producing and storing it on a miss.
/// Errors are returned as-is and never cached.
pub async fn cached_json<T, F, Fut>(state: &AppState, key: CacheKey, produce: F) -> Result<Response, ApiError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let ttl = state.cache.default_ttl();
    let response = state
        .cache
        .get_or_insert_with(key, ttl, move || async move {
            let value = produce().await?;
            CachedResponse::json(StatusCode::OK, &value).map_err(ApiError::from)
        })
        .await?;
    Ok(response.into_response())
}
