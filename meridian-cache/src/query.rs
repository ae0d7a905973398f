//! Fetch bindings: a cache key bound to an async read.
//!
//! Errors are data here. A failed read never returns `Err` from
//! [`Query::load`] or [`Query::refetch`]; after retries are exhausted the
//! error is stored on the cache entry and shows up in [`QueryState::error`].

use crate::cache::{AnyValue, Fetcher, Lookup, ObserverId, QueryCache};
use crate::retry::{self, RetryPolicy};
use futures_util::FutureExt;
use meridian_core::{CacheKey, CacheSettings, SyncError};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Per-binding fetch policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// When false the binding performs no network call and exposes no data.
    pub enabled: bool,
    /// Age after which cached data is refetched in the background on access.
    pub stale_time: Duration,
    /// Inactivity window before an unobserved entry is evicted.
    pub gc_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

impl FetchOptions {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            enabled: true,
            stale_time: settings.stale_time(),
            gc_time: settings.gc_time(),
            retry: RetryPolicy::from_settings(settings),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// What a binding exposes to the view layer.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<SyncError>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// Any fetch is running, including background refreshes.
    pub is_fetching: bool,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
            updated_at: self.updated_at,
        }
    }
}

impl<T> QueryState<T> {
    fn idle() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_fetching: false,
            is_stale: false,
            updated_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A cache key bound to a read. Dropping the binding detaches it from the
/// entry; later results stay in the cache but no longer reach this binding.
pub struct Query<T> {
    cache: QueryCache,
    key: CacheKey,
    options: FetchOptions,
    fetcher: Fetcher,
    observer: Option<(ObserverId, watch::Receiver<u64>)>,
    _marker: PhantomData<fn() -> T>,
}

impl QueryCache {
    /// Fetch options derived from this cache's settings.
    pub fn default_options(&self) -> FetchOptions {
        FetchOptions::from_settings(self.settings())
    }

    /// Bind `read` to `key`. Nothing is fetched until [`Query::load`].
    pub fn query<T, F, Fut>(&self, key: CacheKey, options: FetchOptions, read: F) -> Query<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        Query::new(self.clone(), key, options, read)
    }
}

impl<T> Query<T>
where
    T: Send + Sync + 'static,
{
    pub fn new<F, Fut>(cache: QueryCache, key: CacheKey, options: FetchOptions, read: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        let read = Arc::new(read);
        let policy = options.retry.clone();
        let fetcher: Fetcher = Arc::new(move || {
            let read = Arc::clone(&read);
            let policy = policy.clone();
            async move {
                let value = retry::run(&policy, || read()).await?;
                Ok::<_, SyncError>(Arc::new(value) as AnyValue)
            }
            .boxed()
        });

        let mut query = Self {
            cache,
            key,
            options,
            fetcher,
            observer: None,
            _marker: PhantomData,
        };
        if query.options.enabled {
            query.attach();
        }
        query
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// Make sure the binding has data: fresh cached data is used as is, stale
    /// data is returned immediately and refreshed in the background, and a
    /// read already in flight is shared instead of duplicated.
    pub async fn load(&self) {
        if !self.options.enabled {
            return;
        }
        match self.cache.lookup(&self.key, self.options.stale_time) {
            Lookup::Fresh => {}
            Lookup::Stale { refreshing: true } => {}
            Lookup::Stale { refreshing: false } => {
                tracing::debug!(key = %self.key, "Serving stale data, refreshing in background");
                self.cache.start_fetch(&self.key, Arc::clone(&self.fetcher));
            }
            Lookup::InFlight(fetch) => fetch.await,
            Lookup::Missing => {
                let (_, fetch) = self.cache.start_fetch(&self.key, Arc::clone(&self.fetcher));
                fetch.await;
            }
        }
    }

    /// Start a new read regardless of freshness and wait for it. Dropping the
    /// returned future stops the wait, not the read.
    pub async fn refetch(&self) {
        if !self.options.enabled {
            return;
        }
        // Failures are already stored on the entry.
        let _ = self
            .cache
            .refetch_now(&self.key, Arc::clone(&self.fetcher))
            .await;
    }

    /// Toggle the `enabled` gate. Enabling triggers a load.
    pub async fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.options.enabled {
            return;
        }
        self.options.enabled = enabled;
        if enabled {
            self.attach();
            self.load().await;
        } else {
            self.detach();
        }
    }

    pub fn state(&self) -> QueryState<T> {
        if !self.options.enabled {
            return QueryState::idle();
        }
        let Some(snapshot) = self.cache.snapshot(&self.key, self.options.stale_time) else {
            return QueryState::idle();
        };
        let data = snapshot.value.and_then(|value| value.downcast::<T>().ok());
        QueryState {
            is_loading: data.is_none() && snapshot.is_fetching,
            is_fetching: snapshot.is_fetching,
            is_stale: snapshot.is_stale,
            updated_at: snapshot.updated_at,
            error: snapshot.error,
            data,
        }
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data
    }

    pub fn error(&self) -> Option<SyncError> {
        self.state().error
    }

    /// Wait until the entry changes (commit, invalidation, fetch start).
    /// Returns `false` when the binding is disabled or the entry was dropped.
    pub async fn changed(&mut self) -> bool {
        match &mut self.observer {
            Some((_, receiver)) => receiver.changed().await.is_ok(),
            None => false,
        }
    }
}

impl<T> Query<T> {
    fn attach(&mut self) {
        if self.observer.is_none() {
            let attached = self
                .cache
                .attach(&self.key, Arc::clone(&self.fetcher), self.options.gc_time);
            self.observer = Some(attached);
        }
    }

    fn detach(&mut self) {
        if let Some((id, _)) = self.observer.take() {
            self.cache.detach(&self.key, id);
        }
    }
}

impl<T> Drop for Query<T> {
    fn drop(&mut self) {
        self.detach();
    }
}
