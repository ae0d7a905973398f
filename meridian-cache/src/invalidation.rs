//! Invalidation routing: which cache entries a successful write makes stale.
//!
//! A plan is an ordered list of targets. Executing it marks entries stale,
//! removes entries of deleted records, and refetches every touched entry that
//! still has an attached binding. [`QueryCache::begin_invalidation`] does the
//! marking and starts the refetches before returning; the refetches of one
//! plan run concurrently and [`PendingInvalidation::settled`] waits for them.

use crate::cache::{QueryCache, SharedFetch};
use futures_util::future::join_all;
use meridian_core::{CacheKey, SyncError};
use std::collections::HashSet;

/// One step of an [`InvalidationPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// Every entry whose key starts with this prefix; active ones are refetched.
    Subtree(CacheKey),
    /// Only the entry equal to `key`.
    Exact { key: CacheKey, refetch_active: bool },
    /// Drop the entry, e.g. the detail of a deleted record.
    Remove(CacheKey),
}

impl InvalidationTarget {
    pub fn key(&self) -> &CacheKey {
        match self {
            InvalidationTarget::Subtree(key) => key,
            InvalidationTarget::Exact { key, .. } => key,
            InvalidationTarget::Remove(key) => key,
        }
    }
}

/// Ordered, duplicate-free list of invalidation targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    targets: Vec<InvalidationTarget>,
}

impl InvalidationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subtree(self, key: CacheKey) -> Self {
        self.push(InvalidationTarget::Subtree(key))
    }

    /// Mark one entry stale without refetching it.
    pub fn exact(self, key: CacheKey) -> Self {
        self.push(InvalidationTarget::Exact {
            key,
            refetch_active: false,
        })
    }

    /// Mark one entry stale and refetch it if a binding is attached.
    pub fn exact_refetch(self, key: CacheKey) -> Self {
        self.push(InvalidationTarget::Exact {
            key,
            refetch_active: true,
        })
    }

    pub fn remove(self, key: CacheKey) -> Self {
        self.push(InvalidationTarget::Remove(key))
    }

    /// Append another plan's targets after this one's.
    pub fn extend(mut self, other: InvalidationPlan) -> Self {
        for target in other.targets {
            self = self.push(target);
        }
        self
    }

    pub fn targets(&self) -> &[InvalidationTarget] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    fn push(mut self, target: InvalidationTarget) -> Self {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }
}

impl FromIterator<InvalidationTarget> for InvalidationPlan {
    fn from_iter<I: IntoIterator<Item = InvalidationTarget>>(iter: I) -> Self {
        iter.into_iter()
            .fold(InvalidationPlan::new(), |plan, target| plan.push(target))
    }
}

/// Outcome of executing a plan. Best effort: a failed refetch does not undo
/// the marks already applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidationReport {
    /// Entries marked stale.
    pub marked: usize,
    /// Entries refetched because a binding was attached.
    pub refetched: usize,
    pub removed: usize,
    pub failures: Vec<(CacheKey, SyncError)>,
}

impl InvalidationReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn touched(&self) -> usize {
        self.marked + self.removed
    }
}

/// A plan whose marks are applied and whose refetches are running.
#[must_use = "refetch failures are only reported by `settled`"]
pub struct PendingInvalidation {
    cache: QueryCache,
    report: InvalidationReport,
    refetches: Vec<(CacheKey, u64, SharedFetch)>,
}

impl PendingInvalidation {
    pub fn marked(&self) -> usize {
        self.report.marked
    }

    pub fn removed(&self) -> usize {
        self.report.removed
    }

    /// Refetches started by the plan.
    pub fn refetching(&self) -> usize {
        self.refetches.len()
    }

    /// Wait for every refetch of the plan.
    pub async fn settled(self) -> InvalidationReport {
        let PendingInvalidation {
            cache,
            mut report,
            refetches,
        } = self;
        let waits = refetches.into_iter().map(|(key, seq, fetch)| async move {
            fetch.await;
            (key, seq)
        });
        for (key, seq) in join_all(waits).await {
            if let Err(err) = cache.fetch_outcome(&key, seq) {
                report.failures.push((key, err));
            }
        }
        tracing::debug!(
            marked = report.marked,
            refetched = report.refetched,
            removed = report.removed,
            failures = report.failures.len(),
            "Invalidation plan settled"
        );
        report
    }
}

impl QueryCache {
    /// Apply `plan` in declaration order and start the refetches it implies.
    /// Every refetch has started when this returns.
    pub fn begin_invalidation(&self, plan: &InvalidationPlan) -> PendingInvalidation {
        let mut report = InvalidationReport::default();
        let mut seen = HashSet::new();
        let mut refetches = Vec::new();

        for target in plan.targets() {
            let (touched, refetch) = match target {
                InvalidationTarget::Subtree(key) => (self.mark_stale(key, false), true),
                InvalidationTarget::Exact {
                    key,
                    refetch_active,
                } => (self.mark_stale(key, true), *refetch_active),
                InvalidationTarget::Remove(key) => {
                    if self.remove(key) {
                        report.removed += 1;
                    }
                    continue;
                }
            };
            report.marked += touched.len();
            if !refetch {
                continue;
            }
            for entry in touched {
                let Some(fetcher) = entry.fetcher else {
                    continue;
                };
                if seen.insert(entry.key.clone()) {
                    let (seq, fetch) = self.start_fetch(&entry.key, fetcher);
                    refetches.push((entry.key, seq, fetch));
                }
            }
        }

        report.refetched = refetches.len();
        tracing::debug!(
            targets = plan.len(),
            marked = report.marked,
            refetching = report.refetched,
            removed = report.removed,
            "Invalidation plan applied"
        );
        PendingInvalidation {
            cache: self.clone(),
            report,
            refetches,
        }
    }

    /// Execute `plan` and wait for the refetches it starts.
    pub async fn invalidate(&self, plan: &InvalidationPlan) -> InvalidationReport {
        self.begin_invalidation(plan).settled().await
    }
}
