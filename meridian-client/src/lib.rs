//! Meridian Client - HTTP boundary and business resources of the sync layer.
//!
//! - [`http`]: the [`Transport`] seam and the reqwest-backed [`RestClient`]
//! - [`base_url`]: backend URL selection for local development
//! - [`auth`] / [`session`]: bearer token storage and the 401 interceptor
//! - [`context`]: [`SyncContext`], the explicit bundle every feature uses
//! - [`resource`]: the generic list/detail/create/update/delete factory
//! - [`features`]: per-feature resources and their invalidation relations
//! - [`telemetry`]: tracing subscriber setup

pub mod auth;
pub mod base_url;
pub mod context;
pub mod error;
pub mod features;
pub mod http;
pub mod resource;
pub mod session;
pub mod telemetry;

pub use auth::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError, ACCESS_TOKEN_KEY};
pub use base_url::{is_local_host, resolve_base_url};
pub use context::{Credentials, SyncContext};
pub use error::{ClientError, ClientResult};
pub use http::{
    decode_value, send_json, ApiRequest, ApiResponse, Method, RestClient, SharedTransport,
    Transport,
};
pub use resource::{decode_list, Deleted, Resource, ResourceSpec, Saved, UpdatePayload};
pub use session::{SessionEvent, SessionEvents, SessionGuard};
pub use telemetry::init_tracing;

pub use meridian_cache::{
    Draft, FetchOptions, InvalidationPlan, InvalidationReport, InvalidationTarget, Mutation,
    MutationState, NotificationCenter, Query, QueryCache, QueryState, RecoveryReport,
};
pub use meridian_core::{
    CacheKey, FilterParams, KeyFactory, MeridianConfig, NotificationEvent, Severity, SyncError,
};
