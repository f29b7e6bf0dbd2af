use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::FieldErrors;

pub const MSG_NULL: &str = "This field may not be null.";
pub const MSG_BLANK: &str = "This field may not be blank.";
pub const MSG_NOT_STRING: &str = "Not a valid string.";
pub const MSG_NOT_BOOLEAN: &str = "Must be a valid boolean.";
pub const MSG_UNKNOWN_FIELD: &str = "This field is not recognized.";

// local@domain.tld; dot-atom local part, hostname labels without leading/trailing dashes
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
    )
    .expect("email pattern is a valid regex")
});

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

pub fn push_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(message.into());
}

fn max_length_message(max_len: usize) -> String {
    format!("Ensure this field has no more than {} characters.", max_len)
}

/// Required, non-blank string. Surrounding whitespace is trimmed before checks.
pub fn required_string(
    errors: &mut FieldErrors,
    field: &str,
    value: &Value,
    max_len: usize,
) -> Option<String> {
    match value {
        Value::Null => {
            push_error(errors, field, MSG_NULL);
            None
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                push_error(errors, field, MSG_BLANK);
                None
            } else if trimmed.chars().count() > max_len {
                push_error(errors, field, max_length_message(max_len));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => {
            push_error(errors, field, MSG_NOT_STRING);
            None
        }
    }
}

/// Nullable string. `Some(None)` means "set to null"; `None` means the value was rejected.
pub fn nullable_string(
    errors: &mut FieldErrors,
    field: &str,
    value: &Value,
    max_len: usize,
) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.chars().count() > max_len {
                push_error(errors, field, max_length_message(max_len));
                None
            } else {
                Some(Some(trimmed.to_string()))
            }
        }
        _ => {
            push_error(errors, field, MSG_NOT_STRING);
            None
        }
    }
}

pub fn boolean(errors: &mut FieldErrors, field: &str, value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Null => {
            push_error(errors, field, MSG_NULL);
            None
        }
        _ => {
            push_error(errors, field, MSG_NOT_BOOLEAN);
            None
        }
    }
}
