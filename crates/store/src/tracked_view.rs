//! Materialized views maintained incrementally as a store commits.
//!
//! A tracked view mirrors some aggregation over the whole store (a count,
//! a grouping, a derived index a caller builds by hand) without re-scanning
//! committed state on every read. It is kept current by the same commit
//! dispatch every [`crate::index::IndexMaintainer`] rides: one
//! `track_modification` call per updated entry, in `updated_seq` order.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use jacis_core::{Error, Result};
use parking_lot::RwLock;

/// Object-safe handle the registry dispatches commit events through,
/// independent of the concrete materialized-view type.
pub trait TrackedViewMaintainer<K, TV>: Send + Sync {
    /// The view's diagnostic name.
    fn name(&self) -> &str;

    /// Apply one committed modification to the maintained view.
    fn track_modification(&self, key: &K, old: Option<&TV>, new: Option<&TV>) -> Result<()>;

    /// Re-derive the view from scratch and compare against the
    /// incrementally maintained state, for consistency testing
    /// (`checkViewsOnCommit`). Returns `Err` on mismatch.
    fn check_view(&self, all: &[(K, TV)]) -> Result<()>;

    /// Reset the view to empty, e.g. when the owning store is cleared.
    fn clear(&self);
}

/// A single materialized view of type `V`, incrementally maintained by a
/// caller-supplied closure.
///
/// Registration replays the store's current committed population through
/// `track_fn` under an atomic section (see `Store::register_tracked_view`)
/// so the view starts synchronized with committed state.
pub struct TrackedView<K, TV, V> {
    name: String,
    state: RwLock<V>,
    factory: Arc<dyn Fn() -> V + Send + Sync>,
    track_fn: Arc<dyn Fn(&mut V, &K, Option<&TV>, Option<&TV>) -> Result<()> + Send + Sync>,
    check_fn: Option<Arc<dyn Fn(&V, &[(K, TV)]) -> Result<()> + Send + Sync>>,
}

impl<K, TV, V: Clone + Send + Sync> TrackedView<K, TV, V> {
    /// Build a new tracked view. `factory` produces the empty starting
    /// state; `track_fn` folds one modification into the state; `check_fn`,
    /// if supplied, independently re-derives the view for comparison
    /// against `check_view`.
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn() -> V + Send + Sync + 'static,
        track_fn: impl Fn(&mut V, &K, Option<&TV>, Option<&TV>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        let initial = factory();
        TrackedView {
            name: name.into(),
            state: RwLock::new(initial),
            factory: Arc::new(factory),
            track_fn: Arc::new(track_fn),
            check_fn: None,
        }
    }

    /// Attach a re-derivation function consulted by `checkViewsOnCommit`.
    pub fn with_check(
        mut self,
        check_fn: impl Fn(&V, &[(K, TV)]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.check_fn = Some(Arc::new(check_fn));
        self
    }

    /// A deep copy of the current maintained view, safe for the caller to
    /// read without further synchronization. Reflects only committed state;
    /// a caller with an active transaction that has written to the owning
    /// store wants [`Self::clone_view_for`] instead, or it will not see its
    /// own pending writes.
    pub fn clone_view(&self) -> V {
        self.state.read().clone()
    }

    /// Like [`Self::clone_view`], but folds `pending` TX-local deltas onto
    /// the clone before returning it, so a transaction reading this view
    /// sees its own uncommitted writes (read-your-writes) without them
    /// having to be committed first. `pending` is `(key, orig_value,
    /// tx_value)` for every updated entry in the calling transaction's
    /// view, in the same `updated_seq` order commit itself would dispatch.
    pub fn clone_view_for<'a, I>(&self, pending: I) -> Result<V>
    where
        K: 'a,
        TV: 'a,
        I: IntoIterator<Item = (&'a K, Option<&'a TV>, Option<&'a TV>)>,
    {
        let mut state = self.state.read().clone();
        for (key, old, new) in pending {
            (self.track_fn)(&mut state, key, old, new)
                .map_err(|e| Error::TrackedViewModification(format!("view '{}': {e}", self.name)))?;
        }
        Ok(state)
    }
}

impl<K, TV, V> TrackedViewMaintainer<K, TV> for TrackedView<K, TV, V>
where
    V: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn track_modification(&self, key: &K, old: Option<&TV>, new: Option<&TV>) -> Result<()> {
        let mut state = self.state.write();
        (self.track_fn)(&mut state, key, old, new).map_err(|e| {
            Error::TrackedViewModification(format!("view '{}': {e}", self.name))
        })
    }

    fn check_view(&self, all: &[(K, TV)]) -> Result<()> {
        let Some(check_fn) = &self.check_fn else {
            return Ok(());
        };
        let state = self.state.read();
        check_fn(&state, all)
    }

    fn clear(&self) {
        *self.state.write() = (self.factory)();
    }
}

/// A clustered (sharded) tracked view: the maintained value is split across
/// shards keyed by a projection of the primary key, so a read only clones
/// the shard it needs instead of the whole view.
pub struct ClusteredTrackedView<K, TV, V, S> {
    name: String,
    shard_fn: Arc<dyn Fn(&K) -> S + Send + Sync>,
    factory: Arc<dyn Fn() -> V + Send + Sync>,
    track_fn: Arc<dyn Fn(&mut V, &K, Option<&TV>, Option<&TV>) -> Result<()> + Send + Sync>,
    shards: DashMap<S, V>,
}

impl<K, TV, V, S> ClusteredTrackedView<K, TV, V, S>
where
    V: Clone + Send + Sync,
    S: Clone + Eq + Hash + Send + Sync,
{
    /// Build a clustered tracked view. `shard_fn` maps a primary key to its
    /// shard; `factory`/`track_fn` behave as in [`TrackedView::new`], but
    /// operate on one shard's state at a time.
    pub fn new(
        name: impl Into<String>,
        shard_fn: impl Fn(&K) -> S + Send + Sync + 'static,
        factory: impl Fn() -> V + Send + Sync + 'static,
        track_fn: impl Fn(&mut V, &K, Option<&TV>, Option<&TV>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        ClusteredTrackedView {
            name: name.into(),
            shard_fn: Arc::new(shard_fn),
            factory: Arc::new(factory),
            track_fn: Arc::new(track_fn),
            shards: DashMap::new(),
        }
    }

    /// A deep copy of the shard containing `key`, without touching any
    /// other shard. Reflects only committed state; see
    /// [`Self::clone_shard_for_tx`] for the read-your-writes variant.
    pub fn clone_shard_for(&self, key: &K) -> V {
        let shard = (self.shard_fn)(key);
        self.shards.get(&shard).map(|v| v.clone()).unwrap_or_else(|| (self.factory)())
    }

    /// Like [`Self::clone_shard_for`], but folds onto the clone any
    /// `pending` TX-local delta whose key maps to the same shard as `key`,
    /// so a transaction reading this shard sees its own uncommitted writes.
    pub fn clone_shard_for_tx<'a, I>(&self, key: &K, pending: I) -> Result<V>
    where
        K: 'a,
        TV: 'a,
        I: IntoIterator<Item = (&'a K, Option<&'a TV>, Option<&'a TV>)>,
    {
        let shard = (self.shard_fn)(key);
        let mut state = self.shards.get(&shard).map(|v| v.clone()).unwrap_or_else(|| (self.factory)());
        for (k, old, new) in pending {
            if (self.shard_fn)(k) == shard {
                (self.track_fn)(&mut state, k, old, new)
                    .map_err(|e| Error::TrackedViewModification(format!("view '{}': {e}", self.name)))?;
            }
        }
        Ok(state)
    }
}

impl<K, TV, V, S> TrackedViewMaintainer<K, TV> for ClusteredTrackedView<K, TV, V, S>
where
    V: Clone + Send + Sync,
    S: Clone + Eq + Hash + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn track_modification(&self, key: &K, old: Option<&TV>, new: Option<&TV>) -> Result<()> {
        let shard = (self.shard_fn)(key);
        let mut entry = self.shards.entry(shard).or_insert_with(|| (self.factory)());
        (self.track_fn)(&mut entry, key, old, new)
            .map_err(|e| Error::TrackedViewModification(format!("view '{}': {e}", self.name)))
    }

    fn check_view(&self, _all: &[(K, TV)]) -> Result<()> {
        Ok(())
    }

    fn clear(&self) {
        self.shards.clear();
    }
}

/// All tracked views registered on one store.
#[derive(Default)]
pub struct TrackedViewRegistry<K, TV> {
    views: RwLock<Vec<Arc<dyn TrackedViewMaintainer<K, TV>>>>,
}

impl<K, TV> TrackedViewRegistry<K, TV> {
    /// Register `view`, returning the same handle for the caller to keep
    /// around for reads. Requires `trackOriginalValue` on the owning store
    /// (enforced by `Store::register_tracked_view`, which also performs the
    /// replay-from-committed-state step before calling this).
    pub fn register<V>(&self, view: Arc<TrackedView<K, TV, V>>)
    where
        K: Send + Sync + 'static,
        TV: Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.views.write().push(view);
    }

    /// Register a clustered view.
    pub fn register_clustered<V, S>(&self, view: Arc<ClusteredTrackedView<K, TV, V, S>>)
    where
        K: Send + Sync + 'static,
        TV: Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        S: Clone + Eq + Hash + Send + Sync + 'static,
    {
        self.views.write().push(view);
    }

    /// Dispatch one committed modification to every registered view,
    /// collecting (not short-circuiting on) failures, per the commit
    /// contract: bookkeeping finishes before errors surface.
    pub fn track_modification(&self, key: &K, old: Option<&TV>, new: Option<&TV>) -> Vec<Error> {
        let mut errors = Vec::new();
        for view in self.views.read().iter() {
            if let Err(e) = view.track_modification(key, old, new) {
                errors.push(e);
            }
        }
        errors
    }

    /// Run `check_view` on every registered view against `all` (used when
    /// `checkViewsOnCommit` is enabled).
    pub fn check_views(&self, all: &[(K, TV)]) -> Vec<Error> {
        let mut errors = Vec::new();
        for view in self.views.read().iter() {
            if let Err(e) = view.check_view(all) {
                errors.push(e);
            }
        }
        errors
    }

    /// Reset every registered view to empty.
    pub fn clear(&self) {
        for view in self.views.read().iter() {
            view.clear();
        }
    }
}
