use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::config::MIN_INSTANCE_ADMIN_ROLE;
use crate::error::ApiError;
use crate::handlers::helpers::current_user_id_from_jar;
use crate::models::{AppState, CurrentUser};
use crate::services::{admin_service, user_service};

/// Lets through callers whose session belongs to an instance admin with a
/// role of at least [`MIN_INSTANCE_ADMIN_ROLE`]; the caller is stored in the
/// request extensions as [`CurrentUser`].
pub async fn require_instance_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = current_user_id_from_jar(&state, &jar)
        .await
        .ok_or(ApiError::Unauthorized)?;
    let user = user_service::find_user(&state.db, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::Unauthorized)?;

    match admin_service::admin_role_for(&state.db, user.id).await? {
        Some(role) if role >= MIN_INSTANCE_ADMIN_ROLE => {
            request.extensions_mut().insert(CurrentUser {
                id: user.id,
                email: user.email,
                admin_role: role,
            });
            Ok(next.run(request).await)
        }
        _ => {
            tracing::debug!(user_id = %user.id, "Instance admin permission denied");
            Err(ApiError::forbidden(
                "permission_denied",
                "You do not have permission to perform this action.",
            ))
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}
