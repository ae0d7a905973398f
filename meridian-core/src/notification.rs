//! User-facing notification events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

/// One outcome shown to the user. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: NotificationId,
    pub severity: Severity,
    pub title: String,
    pub description: Option<String>,
    /// `None` means the dispatcher's default duration applies.
    pub duration: Option<Duration>,
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(),
            severity,
            title: title.into(),
            description: None,
            duration: None,
            created_at: Utc::now(),
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(Severity::Success, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(Severity::Error, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(Severity::Info, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// True once `now` is past `created_at + duration`. A deadline beyond
    /// the representable range never expires.
    pub fn is_expired(&self, now: DateTime<Utc>, default_duration: Duration) -> bool {
        let duration = self.duration.unwrap_or(default_duration);
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|duration| self.created_at.checked_add_signed(duration))
            .is_some_and(|deadline| now >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let event = NotificationEvent::error("Error")
            .with_description("body.amount: required")
            .with_duration(Duration::from_secs(8));
        assert_eq!(event.severity, Severity::Error);
        assert_eq!(event.description.as_deref(), Some("body.amount: required"));
        assert_eq!(event.duration, Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_expiry_uses_default_when_unset() {
        let created = Utc::now();
        let event = NotificationEvent::info("Saved").created_at(created);
        let default = Duration::from_secs(5);
        assert!(!event.is_expired(created + chrono::Duration::seconds(4), default));
        assert!(event.is_expired(created + chrono::Duration::seconds(5), default));

        let sticky = event.with_duration(Duration::from_secs(60));
        assert!(!sticky.is_expired(created + chrono::Duration::seconds(30), default));
    }

    #[test]
    fn test_huge_duration_never_expires() {
        let created = Utc::now();
        let event = NotificationEvent::warning("Pinned")
            .created_at(created)
            .with_duration(Duration::from_secs(9_000_000_000_000_000));
        assert!(!event.is_expired(created, Duration::from_secs(5)));
        assert!(!event.is_expired(DateTime::<Utc>::MAX_UTC, Duration::from_secs(5)));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(NotificationId::new(), NotificationId::new());
    }
}
