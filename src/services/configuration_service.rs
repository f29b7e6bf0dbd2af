use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::config::CONFIGURATION_BATCH_SIZE;
use crate::crypto::SecretBox;
use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::instance_configuration::CONFIGURATION_COLUMNS;
use crate::models::{ConfigValue, InstanceConfiguration};

/// A configuration key the CLI knows how to seed from the environment.
#[derive(Clone, Copy, Debug)]
pub struct ConfigSeed {
    pub key: &'static str,
    pub env: &'static str,
    pub default: &'static str,
    pub category: &'static str,
    pub is_encrypted: bool,
}

const fn seed(key: &'static str, default: &'static str, category: &'static str, is_encrypted: bool) -> ConfigSeed {
    ConfigSeed { key, env: key, default, category, is_encrypted }
}

pub const DEFAULT_CONFIGURATIONS: &[ConfigSeed] = &[
    seed("ENABLE_SIGNUP", "1", "AUTHENTICATION", false),
    seed("ENABLE_EMAIL_PASSWORD", "1", "AUTHENTICATION", false),
    seed("ENABLE_MAGIC_LINK_LOGIN", "0", "AUTHENTICATION", false),
    seed("GOOGLE_CLIENT_ID", "", "GOOGLE", false),
    seed("GITHUB_CLIENT_ID", "", "GITHUB", false),
    seed("GITHUB_CLIENT_SECRET", "", "GITHUB", true),
    seed("EMAIL_HOST", "", "SMTP", false),
    seed("EMAIL_HOST_USER", "", "SMTP", false),
    seed("EMAIL_HOST_PASSWORD", "", "SMTP", true),
    seed("EMAIL_PORT", "587", "SMTP", false),
    seed("EMAIL_FROM", "", "SMTP", false),
    seed("EMAIL_USE_TLS", "1", "SMTP", false),
    seed("EMAIL_USE_SSL", "0", "SMTP", false),
    seed("OPENAI_API_KEY", "", "OPENAI", true),
    seed("GPT_ENGINE", "gpt-3.5-turbo", "OPENAI", false),
    seed("UNSPLASH_ACCESS_KEY", "", "UNSPLASH", true),
];

pub async fn list_configurations(pool: &DbPool) -> Result<Vec<InstanceConfiguration>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"SELECT {CONFIGURATION_COLUMNS} FROM instance_configurations ORDER BY "key""#
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(InstanceConfiguration::from_row).collect()
}

/// Text stored for a submitted JSON value. `None` means keep the current value.
fn submitted_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Applies `key -> value` pairs to existing rows. Keys with no row are ignored.
/// All writes commit together, in batches of [`CONFIGURATION_BATCH_SIZE`].
/// Returns every matched row after the update, ordered by key.
pub async fn patch_configurations(
    pool: &DbPool,
    secrets: &SecretBox,
    body: &Map<String, Value>,
) -> Result<Vec<InstanceConfiguration>, ApiError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let rows = sqlx::query(&format!(
        r#"SELECT {CONFIGURATION_COLUMNS} FROM instance_configurations ORDER BY "key""#
    ))
    .fetch_all(&mut *tx)
    .await?;

    let now = Utc::now();
    let mut matched = Vec::new();
    let mut changed: Vec<(Uuid, String)> = Vec::new();
    for row in &rows {
        let mut configuration = InstanceConfiguration::from_row(row)?;
        let Some(value) = body.get(&configuration.key) else {
            continue;
        };
        if let Some(text) = submitted_text(value) {
            configuration.value = ConfigValue::seal(&text, configuration.is_encrypted, secrets)?;
            configuration.updated_at = now;
            changed.push((configuration.id, configuration.value.stored().to_string()));
        }
        matched.push(configuration);
    }

    for batch in changed.chunks(CONFIGURATION_BATCH_SIZE) {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE instance_configurations SET value = CASE id");
        for (id, stored) in batch {
            query.push(" WHEN ").push_bind(*id).push(" THEN ").push_bind(stored.clone());
        }
        query.push(" ELSE value END, updated_at = ").push_bind(now);
        query.push(" WHERE id IN (");
        let mut ids = query.separated(", ");
        for (id, _) in batch {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
        query.build().execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(
        submitted = body.len(),
        matched = matched.len(),
        updated = changed.len(),
        "Instance configuration updated"
    );
    Ok(matched)
}

/// Non-secret configuration values, keyed by configuration key.
pub async fn public_values(pool: &DbPool) -> Result<BTreeMap<String, String>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"SELECT "key", value FROM instance_configurations WHERE is_encrypted = 0 ORDER BY "key""#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Inserts any missing keys from `seeds`, taking values from the environment
/// (falling back to each seed's default). Existing rows are never overwritten.
/// Returns the number of rows inserted.
pub async fn seed_configurations(
    pool: &DbPool,
    secrets: &SecretBox,
    seeds: &[ConfigSeed],
) -> Result<u64, ApiError> {
    let now = Utc::now();
    let mut inserted = 0;
    for seed in seeds {
        let plaintext = std::env::var(seed.env).unwrap_or_else(|_| seed.default.to_string());
        let value = ConfigValue::seal(&plaintext, seed.is_encrypted, secrets)?;
        let result = sqlx::query(
            r#"INSERT INTO instance_configurations (id, "key", value, category, is_encrypted, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT("key") DO NOTHING"#,
        )
        .bind(Uuid::new_v4())
        .bind(seed.key)
        .bind(value.stored())
        .bind(seed.category)
        .bind(seed.is_encrypted)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        if result.rows_affected() == 1 {
            tracing::info!(key = seed.key, "Configuration seeded");
            inserted += 1;
        } else {
            tracing::debug!(key = seed.key, "Configuration already present");
        }
    }
    Ok(inserted)
}
