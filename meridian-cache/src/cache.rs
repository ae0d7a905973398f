//! Process-wide query cache.
//!
//! The cache is an explicit service: it is created once, cloned (cheaply, it
//! is an `Arc`) into every binding that needs it, and cleared on logout.
//! Values only enter the cache through fetch commits; entries are marked
//! dirty only through invalidation or an explicit refetch.
//!
//! # Ordering
//!
//! Every fetch gets a sequence number from a cache-wide counter. A completed
//! fetch commits only if its sequence is still the latest one started for that
//! entry, so the visible value never regresses to an older request even when
//! responses arrive out of order.

use crate::recovery;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use meridian_core::{CacheKey, CacheSettings, SyncError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;
pub(crate) type Fetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<AnyValue, SyncError>> + Send + Sync>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, ()>>;

/// Identity of an attached fetch binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct CacheEntry {
    value: Option<AnyValue>,
    error: Option<SyncError>,
    updated_at: Option<Instant>,
    invalidated: bool,
    last_access: Instant,
    gc_time: Duration,
    /// Attached bindings and the read each one would run.
    observers: HashMap<ObserverId, Fetcher>,
    latest_seq: u64,
    in_flight: Option<SharedFetch>,
    fetch_count: u64,
    version: watch::Sender<u64>,
}

impl CacheEntry {
    fn new(gc_time: Duration) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            value: None,
            error: None,
            updated_at: None,
            invalidated: false,
            last_access: Instant::now(),
            gc_time,
            observers: HashMap::new(),
            latest_seq: 0,
            in_flight: None,
            fetch_count: 0,
            version,
        }
    }

    fn is_stale(&self, stale_time: Duration, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match self.updated_at {
            Some(at) => now.saturating_duration_since(at) >= stale_time,
            None => true,
        }
    }

    fn is_collectable(&self, now: Instant) -> bool {
        self.observers.is_empty()
            && self.in_flight.is_none()
            && now.saturating_duration_since(self.last_access) >= self.gc_time
    }

    /// Wake bindings watching this entry.
    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// Point-in-time view of an entry, as read by a binding.
pub(crate) struct EntrySnapshot {
    pub value: Option<AnyValue>,
    pub error: Option<SyncError>,
    pub updated_at: Option<Instant>,
    pub is_stale: bool,
    pub is_fetching: bool,
}

/// Result of a binding looking up its key.
pub(crate) enum Lookup {
    /// Value present and within the staleness window.
    Fresh,
    /// Value present but stale; `refreshing` when a fetch is already running.
    Stale { refreshing: bool },
    /// No value yet, a fetch is running.
    InFlight(SharedFetch),
    /// No value and nothing running.
    Missing,
}

/// An entry touched by invalidation.
pub(crate) struct StaleEntry {
    pub key: CacheKey,
    /// Read of one attached binding, `None` when the entry is inactive.
    pub fetcher: Option<Fetcher>,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Fetches started (including retries inside one fetch counted once).
    pub fetches: u64,
    /// Completed fetches discarded because a newer one had started.
    pub superseded: u64,
    pub evictions: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    superseded: AtomicU64,
    evictions: AtomicU64,
}

struct CacheInner {
    entries: DashMap<CacheKey, CacheEntry>,
    settings: CacheSettings,
    next_seq: AtomicU64,
    next_observer: AtomicU64,
    stats: StatCounters,
}

/// Shared memoization of server reads, keyed by [`CacheKey`].
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl QueryCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                settings,
                next_seq: AtomicU64::new(0),
                next_observer: AtomicU64::new(0),
                stats: StatCounters::default(),
            }),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of fetches started for `key` since the entry was created.
    pub fn fetch_count(&self, key: &CacheKey) -> u64 {
        self.inner
            .entries
            .get(key)
            .map(|e| e.fetch_count)
            .unwrap_or(0)
    }

    pub fn observer_count(&self, key: &CacheKey) -> usize {
        self.inner
            .entries
            .get(key)
            .map(|e| e.observers.len())
            .unwrap_or(0)
    }

    /// True when the entry was invalidated and has not been refetched since.
    pub fn is_invalidated(&self, key: &CacheKey) -> bool {
        self.inner
            .entries
            .get(key)
            .map(|e| e.invalidated)
            .unwrap_or(false)
    }

    /// Drop one entry. In-flight fetches for it are discarded on arrival.
    pub fn remove(&self, key: &CacheKey) -> bool {
        match self.inner.entries.remove(key) {
            Some((_, entry)) => {
                entry.bump();
                true
            }
            None => false,
        }
    }

    /// Drop everything, e.g. on logout.
    pub fn clear(&self) {
        let count = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| {
            entry.bump();
            false
        });
        tracing::info!(entries = count, "Query cache cleared");
    }

    /// Evict inactive entries whose garbage-collection window has elapsed.
    pub fn gc(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.inner.entries.retain(|_, entry| {
            if entry.is_collectable(now) {
                evicted += 1;
                false
            } else {
                true
            }
        });
        self.inner
            .stats
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Run [`QueryCache::gc`] every `interval` until the cache is dropped.
    pub fn spawn_gc(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let evicted = QueryCache { inner }.gc();
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted inactive cache entries");
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let stats = &self.inner.stats;
        CacheStats {
            hits: stats.hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            fetches: stats.fetches.load(Ordering::Relaxed),
            superseded: stats.superseded.load(Ordering::Relaxed),
            evictions: stats.evictions.load(Ordering::Relaxed),
            entry_count: self.inner.entries.len() as u64,
        }
    }

    // ------------------------------------------------------------------------
    // Binding plumbing
    // ------------------------------------------------------------------------

    fn new_entry(&self) -> CacheEntry {
        CacheEntry::new(self.inner.settings.gc_time())
    }

    pub(crate) fn attach(
        &self,
        key: &CacheKey,
        fetcher: Fetcher,
        gc_time: Duration,
    ) -> (ObserverId, watch::Receiver<u64>) {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| self.new_entry());
        entry.gc_time = gc_time;
        entry.last_access = Instant::now();
        entry.observers.insert(id, fetcher);
        let receiver = entry.version.subscribe();
        (id, receiver)
    }

    pub(crate) fn detach(&self, key: &CacheKey, id: ObserverId) {
        if let Some(mut entry) = self.inner.entries.get_mut(key) {
            entry.observers.remove(&id);
            // The collection window starts once the last observer leaves.
            entry.last_access = Instant::now();
        }
    }

    pub(crate) fn lookup(&self, key: &CacheKey, stale_time: Duration) -> Lookup {
        let now = Instant::now();
        let stats = &self.inner.stats;
        let Some(mut entry) = self.inner.entries.get_mut(key) else {
            stats.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Missing;
        };
        entry.last_access = now;
        if entry.value.is_some() {
            stats.hits.fetch_add(1, Ordering::Relaxed);
            if entry.is_stale(stale_time, now) {
                return Lookup::Stale {
                    refreshing: entry.in_flight.is_some(),
                };
            }
            return Lookup::Fresh;
        }
        stats.misses.fetch_add(1, Ordering::Relaxed);
        match &entry.in_flight {
            Some(fetch) => Lookup::InFlight(fetch.clone()),
            None => Lookup::Missing,
        }
    }

    pub(crate) fn snapshot(&self, key: &CacheKey, stale_time: Duration) -> Option<EntrySnapshot> {
        let now = Instant::now();
        self.inner.entries.get(key).map(|entry| EntrySnapshot {
            value: entry.value.clone(),
            error: entry.error.clone(),
            updated_at: entry.updated_at,
            is_stale: entry.is_stale(stale_time, now),
            is_fetching: entry.in_flight.is_some(),
        })
    }

    /// Start a new fetch for `key`, superseding any fetch already running.
    ///
    /// The read and its commit run together on a spawned task. The returned
    /// future only waits for that task, so dropping it never leaves the entry
    /// marked as fetching.
    pub(crate) fn start_fetch(&self, key: &CacheKey, fetcher: Fetcher) -> (u64, SharedFetch) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.stats.fetches.fetch_add(1, Ordering::Relaxed);

        let (done, finished) = oneshot::channel::<()>();
        let fetch = async move {
            let _ = finished.await;
        }
        .boxed()
        .shared();

        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| self.new_entry());
        entry.latest_seq = seq;
        entry.fetch_count += 1;
        entry.in_flight = Some(fetch.clone());
        entry.bump();
        drop(entry);

        // Spawned only after the entry records `seq`, so the commit sees it.
        let weak = Arc::downgrade(&self.inner);
        let commit_key = key.clone();
        tokio::spawn(async move {
            let result = recovery::guarded(fetcher()).await;
            if let Some(inner) = weak.upgrade() {
                QueryCache { inner }.commit(&commit_key, seq, result);
            }
            let _ = done.send(());
        });

        tracing::debug!(key = %key, seq, "Fetch started");
        (seq, fetch)
    }

    fn commit(&self, key: &CacheKey, seq: u64, result: Result<AnyValue, SyncError>) {
        let Some(mut entry) = self.inner.entries.get_mut(key) else {
            tracing::debug!(key = %key, seq, "Entry gone before fetch completed; result discarded");
            return;
        };
        if entry.latest_seq != seq {
            self.inner.stats.superseded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                key = %key,
                seq,
                latest = entry.latest_seq,
                "Superseded fetch discarded"
            );
            return;
        }
        entry.in_flight = None;
        match result {
            Ok(value) => {
                entry.value = Some(value);
                entry.error = None;
                entry.updated_at = Some(Instant::now());
                entry.invalidated = false;
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Fetch failed");
                entry.error = Some(err);
            }
        }
        entry.bump();
    }

    /// Start a fetch and wait for it. Returns the stored error when this
    /// fetch committed a failure; superseded fetches report success.
    pub(crate) async fn refetch_now(
        &self,
        key: &CacheKey,
        fetcher: Fetcher,
    ) -> Result<(), SyncError> {
        let (seq, fetch) = self.start_fetch(key, fetcher);
        fetch.await;
        self.fetch_outcome(key, seq)
    }

    /// Error committed by fetch `seq`, if it is still the latest for `key`.
    pub(crate) fn fetch_outcome(&self, key: &CacheKey, seq: u64) -> Result<(), SyncError> {
        match self.inner.entries.get(key) {
            Some(entry) if entry.latest_seq == seq => match &entry.error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Mark `target` (exactly, or its whole subtree) as stale.
    pub(crate) fn mark_stale(&self, target: &CacheKey, exact: bool) -> Vec<StaleEntry> {
        let mark = |key: &CacheKey, entry: &mut CacheEntry| {
            entry.invalidated = true;
            entry.bump();
            StaleEntry {
                key: key.clone(),
                fetcher: entry.observers.values().next().cloned(),
            }
        };

        if exact {
            return match self.inner.entries.get_mut(target) {
                Some(mut entry) => vec![mark(target, &mut entry)],
                None => Vec::new(),
            };
        }

        let mut touched = Vec::new();
        for mut entry in self.inner.entries.iter_mut() {
            if entry.key().starts_with(target) {
                let (key, value) = entry.pair_mut();
                touched.push(mark(key, value));
            }
        }
        touched
    }
}
