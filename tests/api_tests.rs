use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use instance_admin::cache::CacheKey;
use instance_admin::crypto::SecretBox;
use instance_admin::db;
use instance_admin::models::AppState;
use instance_admin::routes::ADMINS_PATH;
use instance_admin::services::configuration_service::{self, ConfigSeed};
use instance_admin::services::{generate_password_hash, instance_service, user_service};

const ADMIN_EMAIL: &str = "owner@example.com";
const ADMIN_PASSWORD: &str = "hunter22";

const TEST_SEEDS: &[ConfigSeed] = &[
    ConfigSeed { key: "EMAIL_HOST", env: "IA_TEST_UNSET_EMAIL_HOST", default: "smtp.local", category: "SMTP", is_encrypted: false },
    ConfigSeed { key: "EMAIL_HOST_PASSWORD", env: "IA_TEST_UNSET_EMAIL_HOST_PASSWORD", default: "", category: "SMTP", is_encrypted: true },
    ConfigSeed { key: "EMAIL_PORT", env: "IA_TEST_UNSET_EMAIL_PORT", default: "587", category: "SMTP", is_encrypted: false },
];

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

async fn setup() -> (Router, AppState) {
    let pool = db::init_memory_db().await.unwrap();
    let state = AppState::new(pool, SecretBox::from_secret("test-secret"), Duration::from_secs(60));
    (instance_admin::build_router(state.clone()), state)
}

async fn register(state: &AppState) {
    instance_service::register_instance(&state.db, "plane", "0.1.0").await.unwrap();
}

async fn send(app: &Router, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply { status, cookie, body }
}

async fn bootstrap_admin(app: &Router) -> String {
    let reply = send(
        app,
        Method::POST,
        "/api/instances/admins/sign-in/",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply.cookie.unwrap()
}

async fn count(state: &AppState, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&state.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_get_instance_before_registration() {
    let (app, _state) = setup().await;
    let reply = send(&app, Method::GET, "/api/instances/", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "is_activated": false, "is_setup_done": false }));
}

#[tokio::test]
async fn test_bootstrap_creates_single_admin_once() {
    let (app, state) = setup().await;
    register(&state).await;

    // Prime the cache so the bootstrap has to evict it.
    let before = send(&app, Method::GET, "/api/instances/", None, None).await;
    assert_eq!(before.body["is_setup_done"], json!(false));

    let reply = send(
        &app,
        Method::POST,
        "/api/instances/admins/sign-in/",
        None,
        Some(json!({ "email": "  Owner@Example.com ", "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["email"], json!(ADMIN_EMAIL));
    assert_eq!(reply.body["is_password_autoset"], json!(false));
    assert!(reply.body.get("password").is_none());
    assert!(reply.cookie.as_deref().is_some_and(|c| c.starts_with("session_id=")));
    assert_eq!(count(&state, "users").await, 1);
    assert_eq!(count(&state, "instance_admins").await, 1);

    let after = send(&app, Method::GET, "/api/instances/", None, None).await;
    assert_eq!(after.body["is_activated"], json!(true));
    assert_eq!(after.body["is_setup_done"], json!(true));

    let again = send(
        &app,
        Method::POST,
        "/api/instances/admins/sign-in/",
        None,
        Some(json!({ "email": "second@example.com", "password": "another-pass" })),
    )
    .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.body["code"], json!("admin_already_registered"));
    assert_eq!(count(&state, "users").await, 1);
    assert_eq!(count(&state, "instance_admins").await, 1);
}

#[tokio::test]
async fn test_bootstrap_gates() {
    let (app, state) = setup().await;
    let path = "/api/instances/admins/sign-in/";

    let reply = send(&app, Method::POST, path, None, Some(json!({ "email": ADMIN_EMAIL, "password": "x" }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["code"], json!("instance_not_configured"));

    register(&state).await;

    let reply = send(&app, Method::POST, path, None, Some(json!({ "email": ADMIN_EMAIL }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["code"], json!("missing_credentials"));

    let reply = send(&app, Method::POST, path, None, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::POST, path, None, Some(json!({ "email": "not-an-email", "password": "x" }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["code"], json!("invalid_email"));

    assert_eq!(count(&state, "users").await, 0);
}

#[tokio::test]
async fn test_bootstrap_existing_user_wrong_password() {
    let (app, state) = setup().await;
    register(&state).await;
    user_service::insert_user(&state.db, ADMIN_EMAIL, generate_password_hash("right-password"))
        .await
        .unwrap();

    let reply = send(
        &app,
        Method::POST,
        "/api/instances/admins/sign-in/",
        None,
        Some(json!({ "email": ADMIN_EMAIL, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(
        reply.body["error"],
        json!("Sorry, we could not find a user with the provided credentials. Please try again.")
    );
    assert_eq!(count(&state, "instance_admins").await, 0);
    let instance = instance_service::get_instance(&state.db).await.unwrap().unwrap();
    assert!(!instance.is_setup_done);
}

#[tokio::test]
async fn test_patch_instance() {
    let (app, state) = setup().await;
    register(&state).await;

    let reply = send(&app, Method::PATCH, "/api/instances/", None, Some(json!({ "display_name": "Acme" }))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let cookie = bootstrap_admin(&app).await;
    let reply = send(&app, Method::PATCH, "/api/instances/", Some(cookie.as_str()), Some(json!({ "display_name": "Acme" }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["display_name"], json!("Acme"));
    assert_eq!(reply.body["is_activated"], json!(true));

    let reply = send(&app, Method::PATCH, "/api/instances/", Some(cookie.as_str()), Some(json!({ "display_name": "" }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "display_name": ["This field may not be blank."] }));

    let reply = send(
        &app,
        Method::PATCH,
        "/api/instances/",
        Some(cookie.as_str()),
        Some(json!({ "version": "9.9.9", "is_telemetry_enabled": false })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["version"], json!("0.1.0"));
    assert_eq!(reply.body["is_telemetry_enabled"], json!(false));
}

#[tokio::test]
async fn test_cached_instance_served_until_invalidated() {
    let (app, state) = setup().await;
    register(&state).await;
    let cookie = bootstrap_admin(&app).await;

    let first = send(&app, Method::GET, "/api/instances/", None, None).await;
    assert_eq!(first.body["display_name"], json!("plane"));

    sqlx::query("UPDATE instances SET display_name = 'changed behind the cache'")
        .execute(&state.db)
        .await
        .unwrap();
    let cached = send(&app, Method::GET, "/api/instances/", None, None).await;
    assert_eq!(cached.body["display_name"], json!("plane"));

    send(&app, Method::PATCH, "/api/instances/", Some(cookie.as_str()), Some(json!({ "display_name": "Acme" }))).await;
    let fresh = send(&app, Method::GET, "/api/instances/", None, None).await;
    assert_eq!(fresh.body["display_name"], json!("Acme"));
}

#[tokio::test]
async fn test_non_admin_is_forbidden() {
    let (app, state) = setup().await;
    register(&state).await;
    bootstrap_admin(&app).await;
    user_service::insert_user(&state.db, "member@example.com", generate_password_hash("member-pass"))
        .await
        .unwrap();

    let login = send(
        &app,
        Method::POST,
        "/api/sign-in/",
        None,
        Some(json!({ "email": "member@example.com", "password": "member-pass" })),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    let cookie = login.cookie.unwrap();

    let reply = send(&app, Method::GET, "/api/instances/admins/", Some(cookie.as_str()), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["code"], json!("permission_denied"));

    let bad = send(
        &app,
        Method::POST,
        "/api/sign-in/",
        None,
        Some(json!({ "email": "member@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(bad.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_management() {
    let (app, state) = setup().await;
    register(&state).await;
    let cookie = bootstrap_admin(&app).await;
    let path = "/api/instances/admins/";

    let listed = send(&app, Method::GET, path, Some(cookie.as_str()), None).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body.as_array().map(Vec::len), Some(1));
    assert_eq!(listed.body[0]["user_detail"]["email"], json!(ADMIN_EMAIL));
    assert_eq!(listed.body[0]["role"], json!(20));

    let reply = send(&app, Method::POST, path, Some(cookie.as_str()), Some(json!({}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::POST, path, Some(cookie.as_str()), Some(json!({ "email": "ghost@example.com" }))).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["code"], json!("user_not_found"));

    user_service::insert_user(&state.db, "second@example.com", generate_password_hash("pw"))
        .await
        .unwrap();
    let created = send(
        &app,
        Method::POST,
        path,
        Some(cookie.as_str()),
        Some(json!({ "email": "second@example.com", "role": 15 })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["role"], json!(15));
    let created_id = created.body["id"].as_str().unwrap().to_string();

    let duplicate = send(&app, Method::POST, path, Some(cookie.as_str()), Some(json!({ "email": "second@example.com" }))).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let listed = send(&app, Method::GET, path, Some(cookie.as_str()), None).await;
    assert_eq!(listed.body.as_array().map(Vec::len), Some(2));

    let missing = send(
        &app,
        Method::DELETE,
        "/api/instances/admins/00000000-0000-4000-8000-000000000000/",
        Some(cookie.as_str()),
        None,
    )
    .await;
    assert_eq!(missing.status, StatusCode::NO_CONTENT);

    let deleted = send(&app, Method::DELETE, &format!("{path}{created_id}/"), Some(cookie.as_str()), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(count(&state, "instance_admins").await, 1);

    let listed = send(&app, Method::GET, path, Some(cookie.as_str()), None).await;
    assert_eq!(listed.body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_patch_configurations() {
    let (app, state) = setup().await;
    register(&state).await;
    configuration_service::seed_configurations(&state.db, &state.secrets, TEST_SEEDS)
        .await
        .unwrap();
    let cookie = bootstrap_admin(&app).await;

    let public = send(&app, Method::GET, "/api/configs/", None, None).await;
    assert_eq!(public.body["EMAIL_HOST"], json!("smtp.local"));
    assert!(public.body.get("EMAIL_HOST_PASSWORD").is_none());

    let reply = send(
        &app,
        Method::PATCH,
        "/api/instances/configurations/",
        Some(cookie.as_str()),
        Some(json!({
            "EMAIL_HOST": "smtp.acme.io",
            "EMAIL_HOST_PASSWORD": "s3cret",
            "NOT_A_KEY": "ignored",
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let rows = reply.body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let secret = rows.iter().find(|r| r["key"] == json!("EMAIL_HOST_PASSWORD")).unwrap();
    assert_eq!(secret["value"], json!("********"));

    let stored: Vec<(String, String)> = sqlx::query_as(r#"SELECT "key", value FROM instance_configurations ORDER BY "key""#)
        .fetch_all(&state.db)
        .await
        .unwrap();
    let lookup = |key: &str| stored.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()).unwrap();
    assert_eq!(lookup("EMAIL_HOST"), "smtp.acme.io");
    assert_eq!(lookup("EMAIL_PORT"), "587");
    let ciphertext = lookup("EMAIL_HOST_PASSWORD");
    assert_ne!(ciphertext, "s3cret");
    assert_eq!(state.secrets.decrypt(&ciphertext).unwrap(), "s3cret");
    assert!(stored.iter().all(|(k, _)| k != "NOT_A_KEY"));

    let public = send(&app, Method::GET, "/api/configs/", None, None).await;
    assert_eq!(public.body["EMAIL_HOST"], json!("smtp.acme.io"));

    let listed = send(&app, Method::GET, "/api/instances/configurations/", Some(cookie.as_str()), None).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body.as_array().map(Vec::len), Some(3));

    let reply = send(&app, Method::PATCH, "/api/instances/configurations/", Some(cookie.as_str()), Some(json!(["EMAIL_HOST"]))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

fn config_value(listed: &Value, key: &str) -> Value {
    listed
        .as_array()
        .and_then(|rows| rows.iter().find(|r| r["key"] == json!(key)))
        .map(|r| r["value"].clone())
        .unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_configuration_list_evicted_by_patch() {
    let (app, state) = setup().await;
    register(&state).await;
    configuration_service::seed_configurations(&state.db, &state.secrets, TEST_SEEDS)
        .await
        .unwrap();
    let cookie = bootstrap_admin(&app).await;
    let path = "/api/instances/configurations/";

    let first = send(&app, Method::GET, path, Some(cookie.as_str()), None).await;
    assert_eq!(config_value(&first.body, "EMAIL_HOST"), json!("smtp.local"));

    sqlx::query(r#"UPDATE instance_configurations SET value = 'changed.behind.cache' WHERE "key" = 'EMAIL_HOST'"#)
        .execute(&state.db)
        .await
        .unwrap();
    let cached = send(&app, Method::GET, path, Some(cookie.as_str()), None).await;
    assert_eq!(config_value(&cached.body, "EMAIL_HOST"), json!("smtp.local"));

    let reply = send(&app, Method::PATCH, path, Some(cookie.as_str()), Some(json!({ "EMAIL_PORT": "2525" }))).await;
    assert_eq!(reply.status, StatusCode::OK);

    let fresh = send(&app, Method::GET, path, Some(cookie.as_str()), None).await;
    assert_eq!(config_value(&fresh.body, "EMAIL_HOST"), json!("changed.behind.cache"));
    assert_eq!(config_value(&fresh.body, "EMAIL_PORT"), json!("2525"));
}

#[tokio::test]
async fn test_admin_list_cached_per_caller_and_evicted_on_create() {
    let (app, state) = setup().await;
    register(&state).await;
    let owner_cookie = bootstrap_admin(&app).await;

    user_service::insert_user(&state.db, "second@example.com", generate_password_hash("second-pass"))
        .await
        .unwrap();
    let created = send(
        &app,
        Method::POST,
        ADMINS_PATH,
        Some(owner_cookie.as_str()),
        Some(json!({ "email": "second@example.com" })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let login = send(
        &app,
        Method::POST,
        "/api/sign-in/",
        None,
        Some(json!({ "email": "second@example.com", "password": "second-pass" })),
    )
    .await;
    let second_cookie = login.cookie.unwrap();

    let owner_id = user_service::find_user_by_email(&state.db, ADMIN_EMAIL).await.unwrap().unwrap().id;
    let second_id = user_service::find_user_by_email(&state.db, "second@example.com")
        .await
        .unwrap()
        .unwrap()
        .id;
    let owner_key = CacheKey::for_user(ADMINS_PATH, owner_id);
    let second_key = CacheKey::for_user(ADMINS_PATH, second_id);

    let listed = send(&app, Method::GET, ADMINS_PATH, Some(owner_cookie.as_str()), None).await;
    assert_eq!(listed.body.as_array().map(Vec::len), Some(2));
    assert!(state.cache.contains(&owner_key).await);
    assert!(!state.cache.contains(&second_key).await);

    let listed = send(&app, Method::GET, ADMINS_PATH, Some(second_cookie.as_str()), None).await;
    assert_eq!(listed.body.as_array().map(Vec::len), Some(2));
    assert!(state.cache.contains(&second_key).await);

    user_service::insert_user(&state.db, "third@example.com", generate_password_hash("pw"))
        .await
        .unwrap();
    let created = send(
        &app,
        Method::POST,
        ADMINS_PATH,
        Some(owner_cookie.as_str()),
        Some(json!({ "email": "third@example.com" })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert!(!state.cache.contains(&owner_key).await);
    assert!(!state.cache.contains(&second_key).await);

    for cookie in [&owner_cookie, &second_cookie] {
        let listed = send(&app, Method::GET, ADMINS_PATH, Some(cookie.as_str()), None).await;
        assert_eq!(listed.body.as_array().map(Vec::len), Some(3));
    }
}

#[tokio::test]
async fn test_signup_screen_visited() {
    let (app, state) = setup().await;
    let path = "/api/instances/signup-screen-visited/";

    let reply = send(&app, Method::POST, path, None, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["code"], json!("instance_not_configured"));

    register(&state).await;
    let reply = send(&app, Method::POST, path, None, None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(reply.body, Value::Null);

    let instance = send(&app, Method::GET, "/api/instances/", None, None).await;
    assert_eq!(instance.body["is_signup_screen_visited"], json!(true));
}

#[tokio::test]
async fn test_sign_out_ends_session() {
    let (app, state) = setup().await;
    register(&state).await;
    let cookie = bootstrap_admin(&app).await;

    let reply = send(&app, Method::GET, "/api/instances/configurations/", Some(cookie.as_str()), None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(&app, Method::POST, "/api/sign-out/", Some(cookie.as_str()), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(&app, Method::GET, "/api/instances/configurations/", Some(cookie.as_str()), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_concurrent_bootstrap_has_one_winner() {
    let (app, state) = setup().await;
    register(&state).await;
    let path = "/api/instances/admins/sign-in/";

    let (a, b) = tokio::join!(
        send(&app, Method::POST, path, None, Some(json!({ "email": "a@example.com", "password": "pw-a" }))),
        send(&app, Method::POST, path, None, Some(json!({ "email": "b@example.com", "password": "pw-b" }))),
    );
    let mut statuses = vec![a.status, b.status];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::BAD_REQUEST]);
    assert_eq!(count(&state, "instance_admins").await, 1);
    assert_eq!(count(&state, "users").await, 1);
}
