//! Error types for client setup.
//!
//! Request failures never use these: they surface as [`SyncError`] data on
//! bindings. `ClientError` covers what can go wrong while wiring a client.
//!
//! [`SyncError`]: meridian_core::SyncError

use crate::auth::TokenStoreError;
use meridian_core::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
