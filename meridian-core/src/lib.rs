//! Meridian Core - shared types of the resource synchronization layer.
//!
//! - [`key`]: cache keys and per-feature key factories
//! - [`error`]: error taxonomy and backend envelope normalization
//! - [`notification`]: user-facing notification events
//! - [`config`]: client configuration

pub mod config;
pub mod error;
pub mod key;
pub mod notification;

pub use config::{
    ApiConfig, CacheSettings, ConfigError, LoggingConfig, MeridianConfig, NotificationSettings,
    SessionConfig, LOCAL_DEFAULT_URL,
};
pub use error::{
    display_message, extract_issues, normalize_detail, server_message, FieldIssue, SyncError,
    SyncResult,
};
pub use key::{CacheKey, FilterParams, FilterValue, KeyFactory, KeySegment};
pub use notification::{NotificationEvent, NotificationId, Severity};
