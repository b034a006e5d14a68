use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::authz::clock::Clock;
use crate::authz::errors::StoreError;
use crate::authz::store::{GroupStore, VersionCounterStore};
use crate::authz::tree::AccessTree;

/// Immediate attempts at bumping the counter before the signal is deferred.
const SIGNAL_ATTEMPTS: usize = 3;

/// The locally cached tree together with its staleness bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedTree {
    pub tree: Arc<AccessTree>,
    /// Counter value the tree was built from. `-1` before the first build.
    pub version: i64,
    /// Last rebuild attempt, successful or not.
    pub last_rebuild_at: Option<DateTime<Utc>>,
}

/// Owns the compiled access tree of this instance and decides when to rebuild it.
///
/// A rebuild happens only when the shared counter moved past the cached version
/// and at least `min_refresh` passed since the last attempt. Store failures never
/// reach the caller: the previous tree keeps serving decisions.
pub struct TreeCache {
    store: Arc<dyn GroupStore>,
    versions: Arc<dyn VersionCounterStore>,
    clock: Arc<dyn Clock>,
    min_refresh: Duration,
    state: RwLock<Arc<CachedTree>>,
    /// A committed change whose counter increment has not landed yet.
    pending_signal: AtomicBool,
}

impl TreeCache {
    pub fn new(
        store: Arc<dyn GroupStore>,
        versions: Arc<dyn VersionCounterStore>,
        clock: Arc<dyn Clock>,
        min_refresh: Duration,
    ) -> Self {
        Self {
            store,
            versions,
            clock,
            min_refresh,
            state: RwLock::new(Arc::new(CachedTree {
                tree: Arc::new(AccessTree::empty()),
                version: -1,
                last_rebuild_at: None,
            })),
            pending_signal: AtomicBool::new(false),
        }
    }

    /// Current bookkeeping, without triggering a refresh.
    pub fn cached(&self) -> Arc<CachedTree> {
        self.state.read().clone()
    }

    pub fn min_refresh(&self) -> Duration {
        self.min_refresh
    }

    /// Whether a tree built from `cached` must be replaced given `stored_version`.
    pub fn update_necessary(&self, cached: &CachedTree, stored_version: i64, now: DateTime<Utc>) -> bool {
        stored_version > cached.version && self.interval_elapsed(cached, now)
    }

    fn interval_elapsed(&self, cached: &CachedTree, now: DateTime<Utc>) -> bool {
        match cached.last_rebuild_at {
            None => true,
            Some(at) => now - at >= self.min_refresh,
        }
    }

    /// Tree to evaluate the next decision against, rebuilt first when needed.
    pub fn current(&self) -> Arc<AccessTree> {
        let cached = self.cached();
        let now = self.clock.now();

        // Skip the counter read entirely while the interval has not elapsed.
        if !self.interval_elapsed(&cached, now) {
            return cached.tree.clone();
        }

        self.deliver_pending_signal();

        let stored = match self.versions.current_version() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, version = cached.version, "Version counter unreadable, keeping cached access tree");
                self.record_attempt(now);
                return cached.tree.clone();
            }
        };

        if !self.update_necessary(&cached, stored, now) {
            return cached.tree.clone();
        }

        tracing::debug!(
            cached = cached.version,
            stored,
            "Access tree outdated, rebuilding"
        );

        match self.rebuild(stored, now) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(error = %e, version = cached.version, "Access tree rebuild failed, keeping cached tree");
                self.record_attempt(now);
                cached.tree.clone()
            }
        }
    }

    /// Fetch a full snapshot and swap in a tree tagged with `version`.
    ///
    /// `version` must have been read before the snapshot so a concurrent
    /// mutation is picked up by the next rebuild.
    fn rebuild(&self, version: i64, now: DateTime<Utc>) -> Result<Arc<AccessTree>, StoreError> {
        let groups = self.store.find_all()?;
        let tree = Arc::new(AccessTree::build(&groups, version));

        let mut state = self.state.write();
        // A concurrent rebuild may already have installed a newer tree.
        if state.version > version {
            return Ok(state.tree.clone());
        }
        *state = Arc::new(CachedTree {
            tree: tree.clone(),
            version,
            last_rebuild_at: Some(now),
        });
        Ok(tree)
    }

    fn record_attempt(&self, now: DateTime<Utc>) {
        let mut state = self.state.write();
        let previous = state.as_ref().clone();
        *state = Arc::new(CachedTree {
            last_rebuild_at: Some(now),
            ..previous
        });
    }

    /// Bump the shared counter so every instance rebuilds.
    pub fn signal(&self) -> Result<i64, StoreError> {
        let mut attempt = 1;
        loop {
            match self.versions.increment() {
                Ok(version) => {
                    self.pending_signal.store(false, Ordering::Release);
                    tracing::debug!(version, "Signalled access tree update");
                    return Ok(version);
                }
                Err(e) if attempt < SIGNAL_ATTEMPTS => {
                    tracing::debug!(error = %e, attempt, "Version counter increment failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Signal after a change has already been committed to the group store.
    ///
    /// The change is durable whatever happens here. When the counter stays
    /// unreachable the increment is kept pending and delivered by a later
    /// [`current`](Self::current), and this instance refreshes its own tree now.
    pub fn signal_committed(&self) -> Result<i64, StoreError> {
        self.signal().inspect_err(|e| {
            tracing::warn!(error = %e, "Version counter unreachable after committed change, deferring signal");
            self.pending_signal.store(true, Ordering::Release);
            self.refresh_local();
        })
    }

    /// Whether a committed change still waits for its counter increment.
    pub fn signal_pending(&self) -> bool {
        self.pending_signal.load(Ordering::Acquire)
    }

    fn deliver_pending_signal(&self) {
        if !self.pending_signal.swap(false, Ordering::AcqRel) {
            return;
        }
        match self.versions.increment() {
            Ok(version) => tracing::info!(version, "Delivered deferred access tree signal"),
            Err(e) => {
                tracing::debug!(error = %e, "Deferred access tree signal still undeliverable");
                self.pending_signal.store(true, Ordering::Release);
            }
        }
    }

    /// Rebuild from the store under the cached version tag.
    fn refresh_local(&self) {
        let cached = self.cached();
        if let Err(e) = self.rebuild(cached.version, self.clock.now()) {
            tracing::warn!(error = %e, version = cached.version, "Local access tree refresh failed, keeping cached tree");
        }
    }

    /// Signal, then rebuild this instance's tree immediately, ignoring the interval.
    pub fn force_update(&self) -> Result<Arc<AccessTree>, StoreError> {
        self.signal()?;
        let version = self.versions.current_version()?;
        self.rebuild(version, self.clock.now())
    }
}
