//! Mutation bindings: an async write plus what a success invalidates.
//!
//! A successful write runs strictly in this order: the network call, the
//! invalidation plan built from the server response (entries marked stale and
//! refetches started), then the success notification and the `Success` state.
//! The refetches are awaited last and never hold back the outcome. A failed
//! write invalidates nothing and emits an error notification.

use crate::cache::QueryCache;
use crate::invalidation::InvalidationPlan;
use crate::notify::NotificationCenter;
use crate::recovery;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use meridian_core::SyncError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

const SUCCESS_TITLE: &str = "Success";
const ERROR_TITLE: &str = "Error";

/// Declares the user-facing messages and cache effects of one write.
pub trait MutationDescriptor<P, R>: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn success_message(&self) -> &str;

    /// Shown when the error carries nothing displayable.
    fn error_fallback(&self) -> &str;

    /// Cache effects of a successful write, built from the server response.
    fn invalidations(&self, payload: &P, response: &R) -> InvalidationPlan;

    /// Message supplied by the server, preferred over [`Self::success_message`].
    fn server_message(&self, _response: &R) -> Option<String> {
        None
    }
}

type PlanFn<P, R> = Box<dyn Fn(&P, &R) -> InvalidationPlan + Send + Sync>;
type MessageFn<R> = Box<dyn Fn(&R) -> Option<String> + Send + Sync>;

/// Closure-backed [`MutationDescriptor`].
pub struct MutationSpec<P, R> {
    name: String,
    success_message: String,
    error_fallback: String,
    plan: PlanFn<P, R>,
    message: Option<MessageFn<R>>,
}

impl<P, R> MutationSpec<P, R> {
    pub fn new(
        name: impl Into<String>,
        success_message: impl Into<String>,
        error_fallback: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            success_message: success_message.into(),
            error_fallback: error_fallback.into(),
            plan: Box::new(|_, _| InvalidationPlan::new()),
            message: None,
        }
    }

    pub fn invalidates<F>(mut self, plan: F) -> Self
    where
        F: Fn(&P, &R) -> InvalidationPlan + Send + Sync + 'static,
    {
        self.plan = Box::new(plan);
        self
    }

    pub fn server_message<F>(mut self, message: F) -> Self
    where
        F: Fn(&R) -> Option<String> + Send + Sync + 'static,
    {
        self.message = Some(Box::new(message));
        self
    }
}

impl<P, R> MutationDescriptor<P, R> for MutationSpec<P, R>
where
    P: 'static,
    R: 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn success_message(&self) -> &str {
        &self.success_message
    }

    fn error_fallback(&self) -> &str {
        &self.error_fallback
    }

    fn invalidations(&self, payload: &P, response: &R) -> InvalidationPlan {
        (self.plan)(payload, response)
    }

    fn server_message(&self, response: &R) -> Option<String> {
        self.message.as_ref().and_then(|message| message(response))
    }
}

/// Visible state of a mutation binding.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<R> {
    Idle,
    Pending,
    Success(R),
    Error(SyncError),
}

impl<R> MutationState<R> {
    pub fn is_pending(&self) -> bool {
        matches!(self, MutationState::Pending)
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            MutationState::Error(err) => Some(err),
            _ => None,
        }
    }
}

type WriteFn<P, R> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<R, SyncError>> + Send + Sync>;

struct Current<R> {
    invocation: u64,
    state: MutationState<R>,
}

struct MutationInner<P, R> {
    cache: QueryCache,
    notifications: NotificationCenter,
    descriptor: Box<dyn MutationDescriptor<P, R>>,
    write: WriteFn<P, R>,
    next_invocation: AtomicU64,
    current: Mutex<Current<R>>,
}

/// A write bound to the cache and the notification center.
///
/// Invocations are independent: overlapping calls each run their own plan,
/// and the visible state follows the most recently started one.
pub struct Mutation<P, R> {
    inner: Arc<MutationInner<P, R>>,
}

impl<P, R> Clone for Mutation<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R> Mutation<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new<D, F, Fut>(
        cache: QueryCache,
        notifications: NotificationCenter,
        descriptor: D,
        write: F,
    ) -> Self
    where
        D: MutationDescriptor<P, R>,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, SyncError>> + Send + 'static,
    {
        let write: WriteFn<P, R> = Arc::new(move |payload| write(payload).boxed());
        Self {
            inner: Arc::new(MutationInner {
                cache,
                notifications,
                descriptor: Box::new(descriptor),
                write,
                next_invocation: AtomicU64::new(0),
                current: Mutex::new(Current {
                    invocation: 0,
                    state: MutationState::Idle,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.descriptor.name()
    }

    fn lock(&self) -> MutexGuard<'_, Current<R>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the visible state unless a newer invocation already owns it.
    fn publish(&self, invocation: u64, state: MutationState<R>) {
        let mut current = self.lock();
        if invocation >= current.invocation {
            current.invocation = invocation;
            current.state = state;
        }
    }

    pub fn state(&self) -> MutationState<R> {
        self.lock().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().state.is_pending()
    }

    /// Back to idle, e.g. when the form that owns the binding closes.
    pub fn reset(&self) {
        let invocation = self.inner.next_invocation.load(Ordering::SeqCst);
        self.publish(invocation, MutationState::Idle);
    }

    /// Run the write and wait for it to settle. The returned future also
    /// waits for the refetches the write started; the notification and the
    /// `Success` state are published before that.
    pub async fn mutate_async(&self, payload: P) -> Result<R, SyncError> {
        let inner = &self.inner;
        let descriptor = &inner.descriptor;
        let invocation = inner.next_invocation.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(invocation, MutationState::Pending);
        tracing::debug!(mutation = descriptor.name(), invocation, "Mutation started");

        let result = recovery::guarded((inner.write)(payload.clone())).await;

        match result {
            Ok(response) => {
                let plan = descriptor.invalidations(&payload, &response);
                let pending = inner.cache.begin_invalidation(&plan);
                let message = descriptor
                    .server_message(&response)
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| descriptor.success_message().to_string());
                inner.notifications.success(SUCCESS_TITLE, Some(message));
                tracing::info!(
                    mutation = descriptor.name(),
                    invocation,
                    marked = pending.marked(),
                    refetching = pending.refetching(),
                    "Mutation succeeded"
                );
                self.publish(invocation, MutationState::Success(response.clone()));

                let report = pending.settled().await;
                for (key, err) in &report.failures {
                    tracing::warn!(
                        mutation = descriptor.name(),
                        key = %key,
                        error = %err,
                        "Refetch after mutation failed"
                    );
                }
                Ok(response)
            }
            Err(err) => {
                let description = err.user_message(descriptor.error_fallback());
                inner.notifications.error(ERROR_TITLE, Some(description));
                tracing::warn!(
                    mutation = descriptor.name(),
                    invocation,
                    error = %err,
                    "Mutation failed"
                );
                self.publish(invocation, MutationState::Error(err.clone()));
                Err(err)
            }
        }
    }

    /// Fire-and-forget variant of [`Mutation::mutate_async`].
    pub fn mutate(&self, payload: P) -> JoinHandle<Result<R, SyncError>> {
        let this = self.clone();
        tokio::spawn(async move { this.mutate_async(payload).await })
    }
}
