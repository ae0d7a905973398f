//! Error taxonomy and backend error-envelope normalization.
//!
//! The backend reports failures as `{detail: string | [{loc, msg}] | object}`
//! (optionally with a top-level `message`). Everything that turns such a body
//! into something displayable goes through [`normalize_detail`] and
//! [`display_message`], so no call site ever walks the envelope by hand.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One canonical `{field, message}` pair extracted from an error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Dotted location (`body.amount`), absent for non-field messages.
    pub field: Option<String>,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: Option<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    /// A message that is not tied to a field.
    pub fn general(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

/// Errors surfaced by fetch and mutation bindings.
///
/// Errors are stored as data on cache entries and mutation state, so the type
/// is `Clone` and comparable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Validation failed with status {status}")]
    Validation { status: u16, issues: Vec<FieldIssue> },

    #[error("Request rejected with status {status}")]
    Business { status: u16, message: Option<String> },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server error with status {status}")]
    Server { status: u16, message: Option<String> },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Unexpected failure: {message}")]
    Unexpected { message: String },
}

pub type SyncResult<T> = Result<T, SyncError>;

const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Classify a non-success response by status and body shape.
    pub fn from_response(status: u16, body: &Value) -> Self {
        match status {
            401 => return Self::Unauthorized,
            408 => return Self::Timeout,
            500..=599 => {
                return Self::Server {
                    status,
                    message: display_message(&extract_issues(body)),
                }
            }
            _ => {}
        }

        let detail = envelope_detail(body);
        if matches!(detail, Some(Value::Array(_))) {
            return Self::Validation {
                status,
                issues: detail.map(normalize_detail).unwrap_or_default(),
            };
        }

        let issues = extract_issues(body);
        if issues.iter().any(|issue| issue.field.is_some()) {
            return Self::Validation { status, issues };
        }
        Self::Business {
            status,
            message: display_message(&issues),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { status, .. }
            | Self::Business { status, .. }
            | Self::Server { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            _ => None,
        }
    }

    /// Only transport-level and server-side failures are retried; anything
    /// the user has to correct is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout | Self::Server { .. }
        )
    }

    /// Display string for a notification. Never empty and never a raw dump
    /// of the error body.
    pub fn user_message(&self, fallback: &str) -> String {
        let message = match self {
            Self::Validation { issues, .. } => display_message(issues),
            Self::Business { message, .. } => message.clone(),
            Self::Unauthorized => Some(SESSION_EXPIRED.to_string()),
            _ => None,
        };
        message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

// ============================================================================
// ENVELOPE NORMALIZATION
// ============================================================================

/// Accepts either the full `{response: {data: ..}}` envelope, a bare `data`
/// object, or the `detail` value itself.
fn envelope_data(body: &Value) -> &Value {
    body.get("response")
        .and_then(|response| response.get("data"))
        .unwrap_or(body)
}

fn envelope_detail(body: &Value) -> Option<&Value> {
    match envelope_data(body) {
        Value::Object(map) => map.get("detail"),
        _ => None,
    }
}

/// Map a `detail` value to canonical issues.
///
/// - string → one general issue
/// - array → one issue per `{loc, msg}` item (strings inside are general issues)
/// - object → one issue from its `msg`/`message`
/// - anything else → nothing
pub fn normalize_detail(detail: &Value) -> Vec<FieldIssue> {
    match detail {
        Value::String(message) if !message.trim().is_empty() => {
            vec![FieldIssue::general(message.clone())]
        }
        Value::Array(items) => items.iter().filter_map(normalize_item).collect(),
        Value::Object(_) => normalize_item(detail).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn normalize_item(item: &Value) -> Option<FieldIssue> {
    match item {
        Value::String(message) if !message.trim().is_empty() => {
            Some(FieldIssue::general(message.clone()))
        }
        Value::Object(map) => {
            let message = map
                .get("msg")
                .or_else(|| map.get("message"))
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())?;
            let field = map.get("loc").and_then(location_path);
            Some(FieldIssue::new(field, message))
        }
        _ => None,
    }
}

fn location_path(loc: &Value) -> Option<String> {
    let parts: Vec<String> = match loc {
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    };
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

/// Issues from an error body: `detail` first, then a top-level `message`.
pub fn extract_issues(body: &Value) -> Vec<FieldIssue> {
    let issues = envelope_detail(body)
        .map(normalize_detail)
        .unwrap_or_default();
    if !issues.is_empty() {
        return issues;
    }
    server_message(body)
        .map(|message| vec![FieldIssue::general(message)])
        .unwrap_or_default()
}

/// A server-supplied `message` string, if the body carries one.
pub fn server_message(body: &Value) -> Option<String> {
    envelope_data(body)
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Flatten issues into `field: message, field: message`.
pub fn display_message(issues: &[FieldIssue]) -> Option<String> {
    if issues.is_empty() {
        return None;
    }
    let rendered = issues
        .iter()
        .map(|issue| match &issue.field {
            Some(field) => format!("{}: {}", field, issue.message),
            None => issue.message.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_list_flattens_to_field_messages() {
        let body = json!({
            "detail": [
                {"loc": ["body", "amount"], "msg": "required"},
                {"loc": ["body", "lines", 0, "qty"], "msg": "must be positive"}
            ]
        });
        let err = SyncError::from_response(422, &body);
        assert!(matches!(err, SyncError::Validation { status: 422, .. }));
        assert_eq!(
            err.user_message("Failed to create requisition"),
            "body.amount: required, body.lines.0.qty: must be positive"
        );
    }

    #[test]
    fn test_full_envelope_is_accepted() {
        let body = json!({
            "response": {
                "status": 422,
                "data": {"detail": [{"loc": ["body", "amount"], "msg": "required"}]},
            }
        });
        assert_eq!(
            display_message(&extract_issues(&body)).as_deref(),
            Some("body.amount: required")
        );
    }

    #[test]
    fn test_detail_string_is_shown_verbatim() {
        let body = json!({"detail": "Requisition already approved"});
        let err = SyncError::from_response(409, &body);
        assert_eq!(
            err,
            SyncError::Business {
                status: 409,
                message: Some("Requisition already approved".to_string())
            }
        );
        assert_eq!(err.user_message("fallback"), "Requisition already approved");
    }

    #[test]
    fn test_message_field_used_when_detail_missing() {
        let body = json!({"message": "Budget exceeded"});
        let err = SyncError::from_response(400, &body);
        assert_eq!(err.user_message("fallback"), "Budget exceeded");
    }

    #[test]
    fn test_unknown_shape_falls_back() {
        for body in [
            json!(null),
            json!({"detail": 42}),
            json!({"detail": {"unexpected": true}}),
            json!("<html>Bad Gateway</html>"),
            json!({"detail": []}),
        ] {
            let err = SyncError::from_response(400, &body);
            assert_eq!(
                err.user_message("Failed to update requisition"),
                "Failed to update requisition"
            );
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(SyncError::from_response(401, &json!({})), SyncError::Unauthorized);
        assert_eq!(SyncError::from_response(408, &json!({})), SyncError::Timeout);
        assert!(matches!(
            SyncError::from_response(503, &json!({"detail": "maintenance"})),
            SyncError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn test_server_errors_use_fallback_message() {
        let err = SyncError::from_response(500, &json!({"detail": "NullPointerException"}));
        assert_eq!(err.user_message("Failed to load invoices"), "Failed to load invoices");
    }

    #[test]
    fn test_retry_classification() {
        assert!(SyncError::transport("connection reset").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Server { status: 502, message: None }.is_retryable());
        assert!(!SyncError::Unauthorized.is_retryable());
        assert!(!SyncError::Validation { status: 422, issues: vec![] }.is_retryable());
        assert!(!SyncError::Business { status: 409, message: None }.is_retryable());
    }

    #[test]
    fn test_object_detail_and_string_items() {
        let issues = normalize_detail(&json!({"loc": "email", "message": "taken"}));
        assert_eq!(issues, vec![FieldIssue::new(Some("email".into()), "taken")]);

        let issues = normalize_detail(&json!(["first", {"msg": "second"}, 7]));
        assert_eq!(
            display_message(&issues).as_deref(),
            Some("first, second")
        );
    }

    #[test]
    fn test_server_message_extraction() {
        assert_eq!(
            server_message(&json!({"message": "  Contact saved  "})).as_deref(),
            Some("Contact saved")
        );
        assert_eq!(server_message(&json!({"message": ""})), None);
        assert_eq!(server_message(&json!([1, 2])), None);
    }
}
