use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::FieldErrors;
use crate::utils::validation::{self, push_error, MSG_UNKNOWN_FIELD};

const NAME_MAX_LEN: usize = 255;

/// Column list matching [`Instance`]'s `FromRow` layout.
pub const INSTANCE_COLUMNS: &str = "id, instance_name, display_name, whitelist_emails, namespace, \
     version, is_telemetry_enabled, is_support_required, is_verified, is_setup_done, \
     is_signup_screen_visited, created_at, updated_at";

/// The singleton row describing this deployment.
#[derive(Clone, Debug, Serialize, FromRow)]
pub struct Instance {
    pub id: Uuid,
    pub instance_name: String,
    pub display_name: String,
    pub whitelist_emails: Option<String>,
    pub namespace: Option<String>,
    pub version: String,
    pub is_telemetry_enabled: bool,
    pub is_support_required: bool,
    pub is_verified: bool,
    pub is_setup_done: bool,
    pub is_signup_screen_visited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response shape of `GET /api/instances/` once an instance exists.
#[derive(Serialize)]
pub struct ActivatedInstance<'a> {
    #[serde(flatten)]
    pub instance: &'a Instance,
    pub is_activated: bool,
}

impl<'a> From<&'a Instance> for ActivatedInstance<'a> {
    fn from(instance: &'a Instance) -> Self {
        Self { instance, is_activated: true }
    }
}

/// Response shape of `GET /api/instances/` before registration.
#[derive(Serialize)]
pub struct InactiveInstance {
    pub is_activated: bool,
    pub is_setup_done: bool,
}

impl Default for InactiveInstance {
    fn default() -> Self {
        Self { is_activated: false, is_setup_done: false }
    }
}

/// Validated partial update. `None` leaves a column untouched.
#[derive(Debug, Default, PartialEq)]
pub struct InstancePatch {
    pub instance_name: Option<String>,
    pub display_name: Option<String>,
    pub whitelist_emails: Option<Option<String>>,
    pub namespace: Option<Option<String>>,
    pub is_telemetry_enabled: Option<bool>,
    pub is_support_required: Option<bool>,
    pub is_setup_done: Option<bool>,
    pub is_signup_screen_visited: Option<bool>,
}

impl InstancePatch {
    /// Fields a client may send but never change.
    pub const READ_ONLY: [&'static str; 5] = ["id", "version", "is_verified", "created_at", "updated_at"];

    pub fn from_json(body: &Map<String, Value>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut patch = InstancePatch::default();

        for (field, value) in body {
            match field.as_str() {
                "instance_name" => {
                    patch.instance_name =
                        validation::required_string(&mut errors, field, value, NAME_MAX_LEN);
                }
                "display_name" => {
                    patch.display_name =
                        validation::required_string(&mut errors, field, value, NAME_MAX_LEN);
                }
                "whitelist_emails" => {
                    patch.whitelist_emails =
                        validation::nullable_string(&mut errors, field, value, NAME_MAX_LEN);
                }
                "namespace" => {
                    patch.namespace =
                        validation::nullable_string(&mut errors, field, value, NAME_MAX_LEN);
                }
                "is_telemetry_enabled" => {
                    patch.is_telemetry_enabled = validation::boolean(&mut errors, field, value);
                }
                "is_support_required" => {
                    patch.is_support_required = validation::boolean(&mut errors, field, value);
                }
                "is_setup_done" => {
                    patch.is_setup_done = validation::boolean(&mut errors, field, value);
                }
                "is_signup_screen_visited" => {
                    patch.is_signup_screen_visited = validation::boolean(&mut errors, field, value);
                }
                other if Self::READ_ONLY.iter().any(|f| *f == other) => {}
                _ => push_error(&mut errors, field, MSG_UNKNOWN_FIELD),
            }
        }

        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(errors)
        }
    }

    pub fn apply(self, instance: &mut Instance) {
        if let Some(v) = self.instance_name {
            instance.instance_name = v;
        }
        if let Some(v) = self.display_name {
            instance.display_name = v;
        }
        if let Some(v) = self.whitelist_emails {
            instance.whitelist_emails = v;
        }
        if let Some(v) = self.namespace {
            instance.namespace = v;
        }
        if let Some(v) = self.is_telemetry_enabled {
            instance.is_telemetry_enabled = v;
        }
        if let Some(v) = self.is_support_required {
            instance.is_support_required = v;
        }
        if let Some(v) = self.is_setup_done {
            instance.is_setup_done = v;
        }
        if let Some(v) = self.is_signup_screen_visited {
            instance.is_signup_screen_visited = v;
        }
    }
}
