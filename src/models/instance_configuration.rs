use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sqlx::Row;
use uuid::Uuid;

use crate::crypto::{CryptoError, SecretBox};
use crate::db::DbRow;

/// Placeholder returned instead of a stored secret.
pub const SECRET_MASK: &str = "********";

pub const CONFIGURATION_COLUMNS: &str =
    r#"id, "key", value, category, is_encrypted, created_at, updated_at"#;

/// A configuration value as persisted. The variant follows the row's
/// `is_encrypted` flag; `Encrypted` holds ciphertext and serializes masked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigValue {
    Plain(String),
    Encrypted(String),
}

impl ConfigValue {
    pub fn from_stored(stored: String, is_encrypted: bool) -> Self {
        if is_encrypted {
            ConfigValue::Encrypted(stored)
        } else {
            ConfigValue::Plain(stored)
        }
    }

    /// Builds the stored form of `plaintext` for a row with the given flag.
    pub fn seal(plaintext: &str, is_encrypted: bool, secrets: &SecretBox) -> Result<Self, CryptoError> {
        if is_encrypted {
            Ok(ConfigValue::Encrypted(secrets.encrypt(plaintext)?))
        } else {
            Ok(ConfigValue::Plain(plaintext.to_string()))
        }
    }

    /// The exact text written to the `value` column.
    pub fn stored(&self) -> &str {
        match self {
            ConfigValue::Plain(v) | ConfigValue::Encrypted(v) => v,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, ConfigValue::Encrypted(_))
    }

    pub fn reveal(&self, secrets: &SecretBox) -> Result<String, CryptoError> {
        match self {
            ConfigValue::Plain(v) => Ok(v.clone()),
            ConfigValue::Encrypted(v) => secrets.decrypt(v),
        }
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConfigValue::Plain(v) => serializer.serialize_str(v),
            ConfigValue::Encrypted(v) if v.is_empty() => serializer.serialize_str(""),
            ConfigValue::Encrypted(_) => serializer.serialize_str(SECRET_MASK),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceConfiguration {
    pub id: Uuid,
    pub key: String,
    pub value: ConfigValue,
    pub category: String,
    pub is_encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceConfiguration {
    pub fn from_row(row: &DbRow) -> Result<Self, sqlx::Error> {
        let is_encrypted: bool = row.try_get("is_encrypted")?;
        Ok(Self {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            value: ConfigValue::from_stored(row.try_get("value")?, is_encrypted),
            category: row.try_get("category")?,
            is_encrypted,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
