use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::models::AppState;

/// Paths used both to route requests and to key cached responses.
pub const INSTANCES_PATH: &str = "/api/instances/";
pub const ADMINS_PATH: &str = "/api/instances/admins/";
pub const CONFIGURATIONS_PATH: &str = "/api/instances/configurations/";
pub const PUBLIC_CONFIGS_PATH: &str = "/api/configs/";
pub const MOBILE_CONFIGS_PATH: &str = "/api/mobile-configs/";

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/instances/", axum::routing::patch(handlers::instance_patch))
        .route(
            "/instances/admins/",
            get(handlers::admins_list).post(handlers::admins_create),
        )
        .route("/instances/admins/:id/", delete(handlers::admins_delete))
        .route(
            "/instances/configurations/",
            get(handlers::configurations_list).patch(handlers::configurations_patch),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            handlers::middleware::require_instance_admin,
        ));

    let public_routes = Router::new()
        .route("/instances/", get(handlers::instance_get))
        .route("/instances/admins/sign-in/", post(handlers::admin_sign_in))
        .route(
            "/instances/signup-screen-visited/",
            post(handlers::signup_screen_visited),
        )
        .route("/configs/", get(handlers::public_configs))
        .route("/sign-in/", post(handlers::sign_in))
        .route("/sign-out/", post(handlers::sign_out));

    Router::new()
        .nest("/api", public_routes.merge(admin_routes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
