use chrono::Utc;
use hex::encode as hex_encode;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use sqlx::SqliteExecutor;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::DEFAULT_PBKDF2_ITERATIONS;
use crate::error::ApiError;
use crate::models::user::USER_COLUMNS;
use crate::models::{LoginContext, User};

pub fn generate_password_hash(password: &str) -> String {
    let mut salt_bytes = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt = hex_encode(salt_bytes);
    let mut dk = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), DEFAULT_PBKDF2_ITERATIONS, &mut dk);
    let hash_hex = hex_encode(dk);
    format!("pbkdf2:sha256:{}${}${}", DEFAULT_PBKDF2_ITERATIONS, salt, hash_hex)
}

pub fn verify_password(stored: &str, candidate: &str) -> bool {
    let Some(rest) = stored.strip_prefix("pbkdf2:sha256:") else {
        return false;
    };
    let Some((iter_s, salt_hash)) = rest.split_once('$') else {
        return false;
    };
    let Some((salt, expected_hash)) = salt_hash.split_once('$') else {
        return false;
    };
    let Ok(iter) = iter_s.parse::<u32>() else {
        return false;
    };
    let mut dk = [0u8; 32];
    pbkdf2_hmac::<Sha256>(candidate.as_bytes(), salt.as_bytes(), iter, &mut dk);
    hex_encode(dk).as_bytes().ct_eq(expected_hash.as_bytes()).into()
}

/// Hashes on the blocking pool; PBKDF2 is deliberately slow.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || generate_password_hash(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {e}")))
}

pub async fn check_password(stored: String, candidate: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&stored, &candidate))
        .await
        .map_err(|e| ApiError::Internal(format!("password check task failed: {e}")))
}

pub fn random_session_id() -> String {
    let mut b = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut b);
    hex_encode(b)
}

pub fn random_username() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub async fn find_user<'e, E: SqliteExecutor<'e>>(db: E, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_email<'e, E: SqliteExecutor<'e>>(
    db: E,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(db)
        .await
}

/// Inserts a user who chose their own password.
pub async fn insert_user<'e, E: SqliteExecutor<'e>>(
    db: E,
    email: &str,
    password_hash: String,
) -> Result<User, sqlx::Error> {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        username: random_username(),
        password: password_hash,
        display_name: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        avatar: String::new(),
        is_active: true,
        is_password_autoset: false,
        last_active: None,
        last_login_time: None,
        last_login_ip: None,
        last_login_uagent: None,
        token_updated_at: None,
        date_joined: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO users (id, email, username, password, is_active, is_password_autoset, date_joined) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.password)
    .bind(user.is_active)
    .bind(user.is_password_autoset)
    .bind(user.date_joined)
    .execute(db)
    .await?;
    tracing::info!(user_id = %user.id, "Created user");
    Ok(user)
}

/// Marks the user active and stamps login/activity fields.
pub async fn record_login<'e, E: SqliteExecutor<'e>>(
    db: E,
    user: &mut User,
    ctx: &LoginContext,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    user.is_active = true;
    user.last_active = Some(now);
    user.last_login_time = Some(now);
    user.last_login_ip = ctx.ip.clone();
    user.last_login_uagent = ctx.user_agent.clone();
    user.token_updated_at = Some(now);

    sqlx::query(
        "UPDATE users SET is_active = ?, last_active = ?, last_login_time = ?, last_login_ip = ?, \
         last_login_uagent = ?, token_updated_at = ? WHERE id = ?",
    )
    .bind(user.is_active)
    .bind(user.last_active)
    .bind(user.last_login_time)
    .bind(&user.last_login_ip)
    .bind(&user.last_login_uagent)
    .bind(user.token_updated_at)
    .bind(user.id)
    .execute(db)
    .await?;
    Ok(())
}

/// Email/password sign-in for an existing, active user. Every failure reports
/// the same generic message.
pub async fn authenticate(
    pool: &crate::db::DbPool,
    email: &str,
    password: &str,
    ctx: &LoginContext,
) -> Result<User, ApiError> {
    let email = normalize_email(email);
    let Some(mut user) = find_user_by_email(pool, &email).await? else {
        return Err(ApiError::invalid_credentials());
    };
    if !user.is_active || !check_password(user.password.clone(), password.to_string()).await? {
        return Err(ApiError::invalid_credentials());
    }
    record_login(pool, &mut user, ctx).await?;
    Ok(user)
}
