//! Meridian Cache - server-state synchronization on top of a shared query cache.
//!
//! - [`cache`]: the process-wide [`QueryCache`]
//! - [`query`]: fetch bindings
//! - [`mutation`]: mutation bindings with declarative invalidation
//! - [`invalidation`]: invalidation plans and the router that executes them
//! - [`notify`]: the notification dispatcher
//! - [`draft`]: local edit buffers
//! - [`retry`] / [`recovery`]: backoff and fault isolation

pub mod cache;
pub mod draft;
pub mod invalidation;
pub mod mutation;
pub mod notify;
pub mod query;
pub mod recovery;
pub mod retry;

pub use cache::{CacheStats, ObserverId, QueryCache};
pub use draft::Draft;
pub use invalidation::{
    InvalidationPlan, InvalidationReport, InvalidationTarget, PendingInvalidation,
};
pub use mutation::{Mutation, MutationDescriptor, MutationSpec, MutationState};
pub use notify::NotificationCenter;
pub use query::{FetchOptions, Query, QueryState};
pub use recovery::{guarded, RecoveryReport};
pub use retry::RetryPolicy;
