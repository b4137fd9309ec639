//! Diet, fitness and tips operations over the injected backend services.

pub mod accounts;
pub mod assistant;
pub mod nutrition;
pub mod tips;
pub mod tracker;

use serde_json::Value;

use crate::backend::{Document, Fields};

pub const USERS: &str = "users";
pub const DIETICIANS: &str = "dietician";
pub const HEALTH_TIPS: &str = "healthTips";
pub const LIKES: &str = "likes";

/// Read a field as display text. Profiles are written from free-text forms,
/// so numbers and lists show up where strings are expected.
pub(crate) fn text(doc: &Document, field: &str) -> Option<String> {
    let rendered = match doc.get(field)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!rendered.is_empty()).then_some(rendered)
}

/// Reject blank required form fields with the field's name.
pub(crate) fn require(field: &str, value: &str) -> Result<String, crate::error::AtemateError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(crate::error::AtemateError::InvalidInput(format!(
            "{field} is required"
        )));
    }
    Ok(value.to_string())
}

/// Body of a `json!` object literal.
pub(crate) fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
