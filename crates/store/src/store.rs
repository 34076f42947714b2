//! The committed map plus per-transaction views for one store, and the
//! two-phase prepare/commit/rollback executor that drives them.
//!
//! This is the core of the workspace: `Store<K, TV, CV>` composes
//! [`jacis_concurrency::CommittedEntry`] (C1) and
//! [`jacis_concurrency::StoreTxView`]/[`jacis_concurrency::EntryTxView`]
//! (C2/C3) with a concurrent committed map, a per-transaction view registry,
//! a readers-writer lock, and the index/tracked-view registries (C6/C7).

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use jacis_concurrency::{CommittedEntry, EntryTxView, StoreTxView};
use jacis_core::config::ObjectTypeSpec;
use jacis_core::traits::{DirtyCheck, ModificationListener, ObjectAdapter, PersistenceAdapter};
use jacis_core::types::{StoreIdentifier, TransactionHandle, TxId};
use jacis_core::{Error, Result};

use crate::index::{IndexRegistry, MultiIndex, NonUniqueIndex, UniqueIndex};
use crate::tracked_view::{ClusteredTrackedView, TrackedView, TrackedViewMaintainer, TrackedViewRegistry};

fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

/// The readers-writer lock a store's access is gated on.
///
/// `Own` is a lock private to this store; `Shared` is the container-wide
/// lock, installed when `ObjectTypeSpec::sync_store_on_container_transaction`
/// is true so that two-phase demarcation across every store in the
/// container (and `executeGlobalAtomic`) serialize through one lock.
pub enum StoreLock {
    /// This store's own lock, independent of any other store.
    Own(RwLock<()>),
    /// A lock shared with every other store configured the same way in the
    /// owning container.
    Shared(Arc<RwLock<()>>),
}

impl StoreLock {
    fn rwlock(&self) -> &RwLock<()> {
        match self {
            StoreLock::Own(l) => l,
            StoreLock::Shared(l) => l,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.rwlock().read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.rwlock().write()
    }
}

/// A typed key→value store: committed state plus per-transaction views.
///
/// `K` is the key type, `TV` the value shape callers see, `CV` the value
/// shape held in the committed map. An [`ObjectAdapter`] converts between
/// `TV` and `CV`; when they coincide it is still consulted, since the
/// double-clone at commit is a deliberate isolation boundary (see
/// `jacis_core::traits::ObjectAdapter`).
pub struct Store<K, TV, CV> {
    identifier: StoreIdentifier,
    name: String,
    object_adapter: Arc<dyn ObjectAdapter<TV, CV>>,
    dirty_check: Option<Arc<dyn DirtyCheck<K, TV>>>,
    persistence_adapter: Option<Arc<dyn PersistenceAdapter<K, TV>>>,
    track_original_value: bool,
    check_views_on_commit: bool,
    switch_to_read_only_mode_in_prepare: bool,
    committed: DashMap<K, CommittedEntry<CV>>,
    tx_views: DashMap<TxId, StoreTxView<K, TV>>,
    lock: StoreLock,
    modification_listeners: RwLock<Vec<Arc<dyn ModificationListener<K, TV>>>>,
    index_registry: IndexRegistry<K, TV>,
    tracked_view_registry: TrackedViewRegistry<K, TV>,
}

impl<K, TV, CV> Store<K, TV, CV>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    TV: Send + Sync + 'static,
    CV: Send + Sync + 'static,
{
    /// Build a new, empty store from `spec`, using `lock` as its access
    /// lock (own or container-shared, per
    /// `spec.syncs_store_on_container_transaction()`).
    pub fn new(identifier: StoreIdentifier, spec: ObjectTypeSpec<K, TV, CV>, lock: StoreLock) -> Self {
        Store {
            identifier,
            name: spec.name().to_string(),
            object_adapter: spec.object_adapter().clone(),
            dirty_check: spec.dirty_checker().cloned(),
            persistence_adapter: spec.persistence_adapter_ref().cloned(),
            track_original_value: spec.tracks_original_value(),
            check_views_on_commit: spec.checks_views_on_commit(),
            switch_to_read_only_mode_in_prepare: spec.switches_to_read_only_mode_in_prepare(),
            committed: DashMap::new(),
            tx_views: DashMap::new(),
            lock,
            modification_listeners: RwLock::new(Vec::new()),
            index_registry: IndexRegistry::default(),
            tracked_view_registry: TrackedViewRegistry::default(),
        }
    }

    /// This store's type identifier, `(K, TV)`.
    pub fn identifier(&self) -> StoreIdentifier {
        self.identifier
    }

    /// This store's diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn require_tracking(&self, what: &str) -> Result<()> {
        if self.track_original_value {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "cannot register a {what} on store '{}': track_original_value is disabled",
                self.name
            )))
        }
    }

    // ---- registration ---------------------------------------------------

    /// Register a modification listener, notified on every committed (and
    /// prepare-time) change. Requires `track_original_value`.
    pub fn register_modification_listener(
        &self,
        listener: Arc<dyn ModificationListener<K, TV>>,
    ) -> Result<()> {
        self.require_tracking("modification listener")?;
        self.modification_listeners.write().push(listener);
        Ok(())
    }

    /// Register a unique index: at most one primary key may own any given
    /// index key at a time, enforced by a prepare-time lock.
    pub fn create_unique_index<IK>(
        &self,
        name: impl Into<String>,
        key_fn: impl Fn(&TV) -> Option<IK> + Send + Sync + 'static,
    ) -> Result<Arc<UniqueIndex<K, TV, IK>>>
    where
        IK: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    {
        self.require_tracking("unique index")?;
        Ok(self.index_registry.create_unique(name, key_fn))
    }

    /// Register a non-unique index: each index key maps to a set of
    /// primary keys.
    pub fn create_non_unique_index<IK>(
        &self,
        name: impl Into<String>,
        key_fn: impl Fn(&TV) -> Option<IK> + Send + Sync + 'static,
    ) -> Result<Arc<NonUniqueIndex<K, TV, IK>>>
    where
        IK: Clone + Eq + Hash + Send + Sync + 'static,
    {
        self.require_tracking("non-unique index")?;
        Ok(self.index_registry.create_non_unique(name, key_fn))
    }

    /// Register a multi-valued index: one value can yield several index
    /// keys, each maintained like a non-unique index.
    pub fn create_non_unique_multi_index<IK>(
        &self,
        name: impl Into<String>,
        keys_fn: impl Fn(&TV) -> Vec<IK> + Send + Sync + 'static,
    ) -> Result<Arc<MultiIndex<K, TV, IK>>>
    where
        IK: Clone + Eq + Hash + Send + Sync + 'static,
    {
        self.require_tracking("multi index")?;
        Ok(self.index_registry.create_non_unique_multi(name, keys_fn))
    }

    /// Register a tracked (materialized) view. Requires `track_original_value`.
    /// Replays the current committed population into the view, under an
    /// atomic section, before accepting further commits.
    pub fn register_tracked_view<V>(&self, view: Arc<TrackedView<K, TV, V>>) -> Result<()>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.require_tracking("tracked view")?;
        self.replay_into_view(|key, value| view.track_modification(key, None, Some(value)));
        self.tracked_view_registry.register(view);
        Ok(())
    }

    /// Register a clustered (sharded) tracked view, replaying committed
    /// state the same way as [`Self::register_tracked_view`].
    pub fn register_clustered_tracked_view<V, S>(
        &self,
        view: Arc<ClusteredTrackedView<K, TV, V, S>>,
    ) -> Result<()>
    where
        V: Clone + Send + Sync + 'static,
        S: Clone + Eq + Hash + Send + Sync + 'static,
    {
        self.require_tracking("clustered tracked view")?;
        self.replay_into_view(|key, value| view.track_modification(key, None, Some(value)));
        self.tracked_view_registry.register_clustered(view);
        Ok(())
    }

    /// Read `view`'s current state, with `tx`'s own uncommitted writes
    /// folded on top so it sees its own pending changes before they commit
    /// (read-your-writes over a tracked view). Falls back to the plain
    /// committed-only clone when `tx` has no materialized view on this store.
    pub fn tracked_view<V>(&self, tx: &TransactionHandle, view: &TrackedView<K, TV, V>) -> Result<V>
    where
        V: Clone + Send + Sync,
    {
        let Some(tx_view) = self.tx_views.get(&tx.tx_id) else {
            return Ok(view.clone_view());
        };
        let pending: Vec<(&K, Option<&TV>, Option<&TV>)> = tx_view
            .updated_in_seq_order()
            .into_iter()
            .map(|(k, e)| (k, e.orig_value(), e.tx_value()))
            .collect();
        view.clone_view_for(pending)
    }

    /// Read the shard of `view` containing `key`, with `tx`'s own
    /// uncommitted writes to that shard folded on top. See [`Self::tracked_view`].
    pub fn clustered_tracked_view<V, S>(
        &self,
        tx: &TransactionHandle,
        key: &K,
        view: &ClusteredTrackedView<K, TV, V, S>,
    ) -> Result<V>
    where
        V: Clone + Send + Sync,
        S: Clone + Eq + Hash + Send + Sync,
    {
        let Some(tx_view) = self.tx_views.get(&tx.tx_id) else {
            return Ok(view.clone_shard_for(key));
        };
        let pending: Vec<(&K, Option<&TV>, Option<&TV>)> = tx_view
            .updated_in_seq_order()
            .into_iter()
            .map(|(k, e)| (k, e.orig_value(), e.tx_value()))
            .collect();
        view.clone_shard_for_tx(key, pending)
    }

    fn replay_into_view(&self, mut apply: impl FnMut(&K, &TV) -> Result<()>) {
        self.execute_atomic(|| {
            for entry in self.committed.iter() {
                if let Some(cv) = (*entry).value() {
                    let tv = self.object_adapter.clone_committed_to_read_only_tx_view(cv);
                    let _ = apply(entry.key(), &tv);
                }
            }
        });
    }

    // ---- CRUD -------------------------------------------------------------

    /// Whether `key` currently resolves to a value, consulting this
    /// transaction's view before falling back to committed state.
    pub fn contains(&self, tx: &TransactionHandle, key: &K) -> bool {
        if let Some(view) = self.tx_views.get(&tx.tx_id) {
            if let Some(entry) = view.get(key) {
                return entry.tx_value().is_some();
            }
        }
        self.committed
            .get(key)
            .map(|e| (*e).value().is_some())
            .unwrap_or(false)
    }

    /// Writable accessor: materializes a TX-view entry for `key` if one
    /// does not already exist, then returns its current TX value.
    pub fn get(&self, tx: &TransactionHandle, key: &K) -> Result<Option<TV>> {
        self.ensure_materialized(tx, key)?;
        let view = self.tx_views.get(&tx.tx_id).ok_or(Error::NoTransaction)?;
        let entry = view.get(key).expect("materialized above");
        Ok(entry
            .tx_value()
            .map(|v| self.object_adapter.clone_tx_view_to_read_only_tx_view(v)))
    }

    /// Read-only accessor: returns the TX view's value if one is already
    /// materialized, otherwise a read-only clone of committed state. Never
    /// materializes a TX-view entry.
    pub fn get_read_only(&self, tx: &TransactionHandle, key: &K) -> Option<TV> {
        if let Some(view) = self.tx_views.get(&tx.tx_id) {
            if let Some(entry) = view.get(key) {
                return entry
                    .tx_value()
                    .map(|v| self.object_adapter.clone_tx_view_to_read_only_tx_view(v));
            }
        }
        let _guard = self.lock.read();
        self.committed
            .get(key)
            .and_then(|e| (*e).value().map(|cv| self.object_adapter.clone_committed_to_read_only_tx_view(cv)))
    }

    /// Like [`Self::get_read_only`], but records the committed version
    /// observed for `key` as an optimistic lock, checked again at prepare.
    pub fn lock_read_only(&self, tx: &TransactionHandle, key: &K) -> Result<Option<TV>> {
        if let Some(view) = self.tx_views.get(&tx.tx_id) {
            if !view.is_writable() && !view.is_read_only() {
                return Err(Error::TxAlreadyPrepared);
            }
            if let Some(entry) = view.get(key) {
                let value = entry
                    .tx_value()
                    .map(|v| self.object_adapter.clone_tx_view_to_read_only_tx_view(v));
                let version = entry.orig_version();
                drop(view);
                let mut view = self
                    .tx_views
                    .entry(tx.tx_id)
                    .or_insert_with(|| StoreTxView::new(tx.tx_id, tx.creation_ts_ms));
                view.record_optimistic_lock(key.clone(), version);
                return Ok(value);
            }
        }

        let _guard = self.lock.read();
        let committed = self.committed.entry(key.clone()).or_insert_with(CommittedEntry::empty);
        let value = (*committed)
            .value()
            .map(|cv| self.object_adapter.clone_committed_to_read_only_tx_view(cv));
        let version = committed.version();
        drop(committed);

        let mut view = self
            .tx_views
            .entry(tx.tx_id)
            .or_insert_with(|| StoreTxView::new(tx.tx_id, tx.creation_ts_ms));
        view.record_optimistic_lock(key.clone(), version);
        Ok(value)
    }

    /// Stage `value` as the TX-local value for `key`. `None` stages a
    /// deletion. Requires the TX view to still be writable.
    pub fn update(&self, tx: &TransactionHandle, key: &K, value: Option<TV>) -> Result<()> {
        self.ensure_materialized(tx, key)?;
        let mut view = self.tx_views.get_mut(&tx.tx_id).ok_or(Error::NoTransaction)?;
        if !view.is_writable() {
            return Err(Error::TxAlreadyPrepared);
        }
        let seq = view.next_update_seq();
        view.get_mut(key).expect("materialized above").set_tx_value(value, seq);
        debug!(tx = %tx, store = %self.name, "staged update");
        Ok(())
    }

    /// `update(tx, key, None)`.
    pub fn remove(&self, tx: &TransactionHandle, key: &K) -> Result<()> {
        self.update(tx, key, None)
    }

    /// Drop this TX's materialized view of `key`, discarding any staged
    /// change, then re-read from committed state.
    pub fn refresh(&self, tx: &TransactionHandle, key: &K) -> Result<Option<TV>> {
        self.drop_materialized(tx, key);
        self.get(tx, key)
    }

    /// Like [`Self::refresh`], but only drops the view if it has not been
    /// updated — an explicit `update`/`remove` is preserved.
    pub fn refresh_if_not_updated(&self, tx: &TransactionHandle, key: &K) -> Result<Option<TV>> {
        let is_updated = self
            .tx_views
            .get(&tx.tx_id)
            .and_then(|v| v.get(key).map(|e| e.is_updated()))
            .unwrap_or(false);
        if !is_updated {
            self.drop_materialized(tx, key);
        }
        self.get(tx, key)
    }

    fn drop_materialized(&self, tx: &TransactionHandle, key: &K) {
        if let Some(mut view) = self.tx_views.get_mut(&tx.tx_id) {
            if view.remove_view(key).is_some() {
                if let Some(mut committed) = self.committed.get_mut(key) {
                    committed.decr_refcount();
                }
            }
        }
    }

    fn ensure_materialized(&self, tx: &TransactionHandle, key: &K) -> Result<()> {
        if self
            .tx_views
            .get(&tx.tx_id)
            .map(|v| v.get(key).is_some())
            .unwrap_or(false)
        {
            return Ok(());
        }
        let _guard = self.lock.read();
        {
            let view = self
                .tx_views
                .entry(tx.tx_id)
                .or_insert_with(|| StoreTxView::new(tx.tx_id, tx.creation_ts_ms));
            if !view.is_writable() {
                if let Some(reason) = view.invalidation_reason() {
                    warn!(tx = %tx, store = %self.name, reason, "access to invalidated store tx view");
                }
                return Err(Error::TxAlreadyPrepared);
            }
            if view.get(key).is_some() {
                return Ok(());
            }
        }

        let mut committed = self.committed.entry(key.clone()).or_insert_with(CommittedEntry::empty);
        let orig_version = committed.version();
        let tx_value = (*committed)
            .value()
            .map(|cv| self.object_adapter.clone_committed_to_writable_tx_view(cv));
        let orig_value = if self.track_original_value {
            (*committed)
                .value()
                .map(|cv| self.object_adapter.clone_committed_to_writable_tx_view(cv))
        } else {
            None
        };
        committed.incr_refcount();
        drop(committed);

        let mut view = self.tx_views.get_mut(&tx.tx_id).expect("inserted above");
        view.insert(key.clone(), EntryTxView::new(orig_version, orig_value, tx_value));
        Ok(())
    }

    // ---- streaming ----------------------------------------------------

    fn all_keys(&self, tx: &TransactionHandle) -> Vec<K> {
        let _guard = self.lock.read();
        let mut seen: HashSet<K> = HashSet::new();
        if let Some(view) = self.tx_views.get(&tx.tx_id) {
            seen.extend(view.iter().map(|(k, _)| k.clone()));
        }
        seen.extend(self.committed.iter().map(|e| e.key().clone()));
        seen.into_iter().collect()
    }

    /// Read-only snapshot of every live `(key, value)` pair, merging
    /// committed state with this TX's pending view. Materializes nothing.
    pub fn stream_read_only(&self, tx: &TransactionHandle) -> Vec<(K, TV)> {
        let _guard = self.lock.read();
        let mut seen: HashSet<K> = HashSet::new();
        let mut out = Vec::new();
        if let Some(view) = self.tx_views.get(&tx.tx_id) {
            for (k, entry) in view.iter() {
                seen.insert(k.clone());
                if let Some(v) = entry.tx_value() {
                    out.push((k.clone(), self.object_adapter.clone_tx_view_to_read_only_tx_view(v)));
                }
            }
        }
        for entry in self.committed.iter() {
            if seen.contains(entry.key()) {
                continue;
            }
            if let Some(cv) = (*entry).value() {
                out.push((
                    entry.key().clone(),
                    self.object_adapter.clone_committed_to_read_only_tx_view(cv),
                ));
            }
        }
        out
    }

    /// [`Self::stream_read_only`], filtered by `filter`.
    pub fn stream_read_only_filtered(
        &self,
        tx: &TransactionHandle,
        filter: impl Fn(&TV) -> bool,
    ) -> Vec<(K, TV)> {
        self.stream_read_only(tx)
            .into_iter()
            .filter(|(_, v)| filter(v))
            .collect()
    }

    /// Writable stream: materializes every live key into this TX's view
    /// (equivalent to calling [`Self::get`] on each) and returns the result.
    pub fn stream(&self, tx: &TransactionHandle) -> Result<Vec<(K, TV)>> {
        let mut out = Vec::new();
        for k in self.all_keys(tx) {
            if let Some(v) = self.get(tx, &k)? {
                out.push((k, v));
            }
        }
        Ok(out)
    }

    /// Filtered writable stream: the filter is evaluated on read-only
    /// clones first, and only surviving keys are materialized into the TX
    /// view.
    pub fn stream_filtered(
        &self,
        tx: &TransactionHandle,
        filter: impl Fn(&TV) -> bool,
    ) -> Result<Vec<(K, TV)>> {
        let candidates = self.stream_read_only_filtered(tx, &filter);
        let mut out = Vec::with_capacity(candidates.len());
        for (k, _) in candidates {
            if let Some(v) = self.get(tx, &k)? {
                if filter(&v) {
                    out.push((k, v));
                }
            }
        }
        Ok(out)
    }

    // ---- atomic sections ------------------------------------------------

    /// Run `f` while holding this store's read lock, blocking any
    /// concurrent prepare/commit/rollback/clear.
    pub fn execute_atomic<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.read();
        f()
    }

    /// Like [`Self::execute_atomic`], passing `self` to the closure.
    pub fn compute_atomic<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let _guard = self.lock.read();
        f(self)
    }

    // ---- bulk load / clear -----------------------------------------------

    /// Bulk-load `entries` into an empty store, bypassing transactional
    /// semantics entirely. Parallelizes across `n_threads` when
    /// `entries.len() >= 1000`. Non-thread-safe listeners are serialized
    /// with a mutex even during parallel load. Illegal on a non-empty store.
    pub fn init_store_non_transactional<E, KF, VF>(
        &self,
        entries: Vec<E>,
        key_fn: KF,
        value_fn: VF,
        n_threads: usize,
    ) -> Result<()>
    where
        E: Send,
        KF: Fn(&E) -> K + Sync,
        VF: Fn(E) -> CV + Send,
    {
        if !self.committed.is_empty() {
            return Err(Error::Internal(format!(
                "initStoreNonTransactional requires an empty store; '{}' is non-empty",
                self.name
            )));
        }
        let _guard = self.lock.write();
        let listener_mutex = Mutex::new(());
        let errors: Mutex<Vec<Error>> = Mutex::new(Vec::new());
        let bulk_tx = TransactionHandle::new_local("bulk-load");
        let n_threads = n_threads.max(1);

        if entries.len() >= 1000 && n_threads > 1 {
            use rayon::prelude::*;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .map_err(|e| Error::Internal(format!("failed to build bulk-load thread pool: {e}")))?;
            pool.install(|| {
                entries.into_par_iter().for_each(|e| {
                    let key = key_fn(&e);
                    let value = value_fn(e);
                    self.insert_initial(key, value, &bulk_tx, &listener_mutex, &errors);
                });
            });
        } else {
            for e in entries {
                let key = key_fn(&e);
                let value = value_fn(e);
                self.insert_initial(key, value, &bulk_tx, &listener_mutex, &errors);
            }
        }

        if let Some(adapter) = &self.persistence_adapter {
            adapter.initialize_store()?;
        }

        let errors = errors.into_inner();
        if !errors.is_empty() {
            warn!(store = %self.name, count = errors.len(), "bulk load finished with collected listener errors");
            return Err(Error::aggregate(errors));
        }
        info!(store = %self.name, count = self.committed.len(), "bulk load complete");
        Ok(())
    }

    fn insert_initial(
        &self,
        key: K,
        value: CV,
        bulk_tx: &TransactionHandle,
        listener_mutex: &Mutex<()>,
        errors: &Mutex<Vec<Error>>,
    ) {
        self.committed.insert(key.clone(), CommittedEntry::loaded(value));
        let tv = self
            .committed
            .get(&key)
            .and_then(|e| (*e).value().map(|cv| self.object_adapter.clone_committed_to_read_only_tx_view(cv)));

        let listeners = self.modification_listeners.read();
        for listener in listeners.iter() {
            let result = if listener.is_thread_safe() {
                listener.on_modification(bulk_tx, &key, None, tv.as_ref())
            } else {
                let _guard = listener_mutex.lock();
                listener.on_modification(bulk_tx, &key, None, tv.as_ref())
            };
            if let Err(e) = result {
                errors.lock().push(Error::ModificationListenerError(e.to_string()));
            }
        }
        drop(listeners);
        if let Some(adapter) = &self.persistence_adapter {
            let result = if adapter.is_thread_safe() {
                adapter.on_modification(bulk_tx, &key, None, tv.as_ref())
            } else {
                let _guard = listener_mutex.lock();
                adapter.on_modification(bulk_tx, &key, None, tv.as_ref())
            };
            if let Err(e) = result {
                errors.lock().push(Error::ModificationListenerError(e.to_string()));
            }
        }
        self.index_registry.on_commit_modification(bulk_tx.tx_id, &key, None, tv.as_ref());
        errors.lock().extend(self.tracked_view_registry.track_modification(&key, None, tv.as_ref()));
    }

    /// Invalidate every pending TX view with reason `"store cleared"`, then
    /// drop committed state, indexes, and tracked views.
    pub fn clear(&self) {
        let _guard = self.lock.write();
        for mut view in self.tx_views.iter_mut() {
            view.invalidate("store cleared");
        }
        self.committed.clear();
        self.index_registry.clear();
        self.tracked_view_registry.clear();
        warn!(store = %self.name, "store cleared; pending transaction views invalidated");
    }

    fn all_committed_as_tv(&self) -> Vec<(K, TV)> {
        self.committed
            .iter()
            .filter_map(|e| {
                (*e).value()
                    .map(|cv| (e.key().clone(), self.object_adapter.clone_committed_to_read_only_tx_view(cv)))
            })
            .collect()
    }

    // ---- two-phase demarcation --------------------------------------------

    /// Prepare this store's TX view for commit: dirty-checks unreported
    /// mutations, stale-checks every updated/optimistically-locked entry,
    /// installs prepare locks, dispatches `on_prepare_modification`, and
    /// claims unique-index keys. A no-op if this TX has no view, is
    /// read-only, or has already prepared.
    pub fn prepare(&self, tx: &TransactionHandle) -> Result<()> {
        let status = self.tx_views.get(&tx.tx_id).map(|v| {
            (
                v.is_read_only(),
                v.is_commit_pending(),
                v.invalidation_reason().map(|s| s.to_string()),
            )
        });
        let (is_read_only, is_commit_pending, invalidation_reason) = match status {
            Some(s) => s,
            None => return Ok(()),
        };
        if is_read_only || is_commit_pending {
            return Ok(());
        }
        if let Some(reason) = invalidation_reason {
            warn!(tx = %tx, store = %self.name, reason, "prepare skipped: store tx view invalidated");
            return Ok(());
        }

        let _guard = self.lock.write();
        let thread_name = current_thread_name();

        // b. dirty check: mark structurally-changed, not-yet-updated entries.
        if let Some(checker) = &self.dirty_check {
            let dirty_keys: Vec<K> = {
                let view = self.tx_views.get(&tx.tx_id).ok_or(Error::NoTransaction)?;
                view.iter()
                    .filter(|(_, e)| !e.is_updated())
                    .filter_map(|(k, e)| match (e.orig_value(), e.tx_value()) {
                        (Some(orig), Some(cur)) if checker.is_dirty(k, orig, cur) => Some(k.clone()),
                        _ => None,
                    })
                    .collect()
            };
            let mut view = self.tx_views.get_mut(&tx.tx_id).ok_or(Error::NoTransaction)?;
            for k in dirty_keys {
                let seq = view.next_update_seq();
                view.get_mut(&k).expect("collected above").mark_updated(seq);
            }
        }

        // c. mark commit-pending.
        {
            let mut view = self.tx_views.get_mut(&tx.tx_id).ok_or(Error::NoTransaction)?;
            view.set_commit_pending();
        }

        // d. optimistic-lock verification.
        let optimistic: Vec<(K, u64)> = {
            let view = self.tx_views.get(&tx.tx_id).ok_or(Error::NoTransaction)?;
            view.optimistic_locks().map(|(k, v)| (k.clone(), *v)).collect()
        };
        for (k, locked_version) in &optimistic {
            let mut committed = self.committed.entry(k.clone()).or_insert_with(CommittedEntry::empty);
            if committed.version() > *locked_version || committed.is_locked_for_other(tx.tx_id) {
                return Err(Error::StaleObject {
                    key: format!("{k:?}"),
                    this_tx: tx.tx_id,
                    conflicting_tx: committed.locked_for(),
                    this_version: *locked_version,
                    committed_version: committed.version(),
                    this_thread: thread_name.clone(),
                    conflicting_thread: committed.locked_for_thread().map(|s| s.to_string()),
                });
            }
            committed.lock_for(tx.tx_id, thread_name.clone());
        }

        // e. updated-entry staleness, in program (updated_seq) order.
        let updated_keys: Vec<K> = {
            let view = self.tx_views.get(&tx.tx_id).ok_or(Error::NoTransaction)?;
            view.updated_in_seq_order().into_iter().map(|(k, _)| k.clone()).collect()
        };
        for k in &updated_keys {
            let orig_version = {
                let view = self.tx_views.get(&tx.tx_id).ok_or(Error::NoTransaction)?;
                view.get(k).expect("listed in updated_keys").orig_version()
            };
            let mut committed = self.committed.entry(k.clone()).or_insert_with(CommittedEntry::empty);
            if committed.version() > orig_version || committed.is_locked_for_other(tx.tx_id) {
                return Err(Error::StaleObject {
                    key: format!("{k:?}"),
                    this_tx: tx.tx_id,
                    conflicting_tx: committed.locked_for(),
                    this_version: orig_version,
                    committed_version: committed.version(),
                    this_thread: thread_name.clone(),
                    conflicting_thread: committed.locked_for_thread().map(|s| s.to_string()),
                });
            }
            committed.lock_for(tx.tx_id, thread_name.clone());
            drop(committed);

            if self.switch_to_read_only_mode_in_prepare {
                if let Some(mut view) = self.tx_views.get_mut(&tx.tx_id) {
                    if let Some(entry) = view.get_mut(k) {
                        if let Some(v) = entry.tx_value_mut() {
                            self.object_adapter.switch_to_read_only_mode(v);
                        }
                    }
                }
            }
        }

        // f. notify modification listeners and the persistence adapter; a
        // veto from either aborts prepare entirely.
        {
            let listeners = self.modification_listeners.read().clone();
            for k in &updated_keys {
                let view = self.tx_views.get(&tx.tx_id).ok_or(Error::NoTransaction)?;
                let entry = view.get(k).expect("listed in updated_keys");
                for listener in &listeners {
                    listener.on_prepare_modification(tx, k, entry.orig_value(), entry.tx_value())?;
                }
                if let Some(adapter) = &self.persistence_adapter {
                    adapter.on_prepare_modification(tx, k, entry.orig_value(), entry.tx_value())?;
                }
            }
        }

        // g. unique-index key locking.
        for k in &updated_keys {
            let view = self.tx_views.get(&tx.tx_id).ok_or(Error::NoTransaction)?;
            let entry = view.get(k).expect("listed in updated_keys");
            self.index_registry.prepare_lock_all(tx.tx_id, k, entry.tx_value())?;
        }

        // h. persistence adapter store-level notification.
        if let Some(adapter) = &self.persistence_adapter {
            adapter.after_prepare_for_store(tx)?;
        }

        debug!(tx = %tx, store = %self.name, updated = updated_keys.len(), "prepared");
        Ok(())
    }

    /// Commit this store's TX view: implicitly prepares if needed, writes
    /// every updated entry back to committed state (in `updated_seq`
    /// order), dispatches index/tracked-view/modification-listener updates,
    /// garbage-collects tombstoned entries, and destroys the TX view.
    /// Listener failures are collected and surfaced as one aggregated error
    /// after all bookkeeping completes.
    pub fn commit(&self, tx: &TransactionHandle) -> Result<()> {
        let is_pending = self.tx_views.get(&tx.tx_id).map(|v| v.is_commit_pending());
        match is_pending {
            None => return Ok(()),
            Some(false) => self.prepare(tx)?,
            Some(true) => {}
        }

        let _guard = self.lock.write();
        let thread_name = current_thread_name();

        let updated_keys: Vec<K> = {
            let view = self.tx_views.get(&tx.tx_id).ok_or_else(|| {
                Error::Internal("store tx view vanished between prepare and commit".into())
            })?;
            view.updated_in_seq_order().into_iter().map(|(k, _)| k.clone()).collect()
        };

        // b. release this TX's unique-index locks up front.
        for k in &updated_keys {
            self.index_registry.release_locks(tx.tx_id, k);
        }

        let mut errors: Vec<Error> = Vec::new();
        let listeners = self.modification_listeners.read().clone();

        for k in &updated_keys {
            let view = self.tx_views.get(&tx.tx_id).expect("checked above");
            let entry = view.get(k).expect("listed in updated_keys");
            let orig_value = entry.orig_value();
            let new_value = entry.tx_value();

            // Indexes apply right after their own key's lock release.
            self.index_registry.on_commit_modification(tx.tx_id, k, orig_value, new_value);

            for listener in &listeners {
                if let Err(e) = listener.on_modification(tx, k, orig_value, new_value) {
                    errors.push(Error::ModificationListenerError(e.to_string()));
                }
            }
            if let Some(adapter) = &self.persistence_adapter {
                if let Err(e) = adapter.on_modification(tx, k, orig_value, new_value) {
                    errors.push(Error::ModificationListenerError(e.to_string()));
                }
            }

            errors.extend(self.tracked_view_registry.track_modification(k, orig_value, new_value));

            let new_cv = new_value.map(|v| self.object_adapter.clone_tx_view_to_committed(v));
            drop(view);

            let mut committed = self.committed.entry(k.clone()).or_insert_with(CommittedEntry::empty);
            committed.write(new_cv, tx.tx_id, thread_name.clone());
        }

        // Release this TX's refcount on every key it materialized (not just
        // updated ones), then unlock every key this TX holds a committed
        // lock for. That is `locked_keys()`, not just `updated_keys`: a key
        // only ever passed to `lock_read_only` is never materialized as an
        // updated entry, but prepare still installs a committed lock for it
        // (step d), so it must be released here too or it stays locked for
        // this TX forever.
        let all_keys: Vec<K> = {
            let view = self.tx_views.get(&tx.tx_id).expect("checked above");
            view.iter().map(|(k, _)| k.clone()).collect()
        };
        let locked_keys: Vec<K> = {
            let view = self.tx_views.get(&tx.tx_id).expect("checked above");
            view.locked_keys().into_iter().collect()
        };
        for k in &all_keys {
            if let Some(mut committed) = self.committed.get_mut(k) {
                committed.decr_refcount();
            }
        }
        for k in &locked_keys {
            if let Some(mut committed) = self.committed.get_mut(k) {
                committed.unlock_if_owned_by(tx.tx_id);
            }
        }
        for k in &locked_keys {
            self.committed.remove_if(k, |_, e| e.is_collectible());
        }

        self.tx_views.remove(&tx.tx_id);

        if let Some(adapter) = &self.persistence_adapter {
            if let Err(e) = adapter.after_commit_for_store(tx) {
                errors.push(e);
            }
        }

        if self.check_views_on_commit {
            let all = self.all_committed_as_tv();
            errors.extend(self.tracked_view_registry.check_views(&all));
        }

        if errors.is_empty() {
            info!(tx = %tx, store = %self.name, updated = updated_keys.len(), "committed");
            Ok(())
        } else {
            warn!(tx = %tx, store = %self.name, count = errors.len(), "commit finished with collected listener errors");
            Err(Error::aggregate(errors))
        }
    }

    /// Roll back this store's TX view: releases every prepare lock and
    /// unique-index lock this TX held, garbage-collects, and destroys the
    /// view. A no-op if this TX has no view or it is read-only. Never
    /// fails — a persistence-adapter rollback-callback error is logged, not
    /// propagated, since rollback must always leave the caller able to
    /// recover.
    pub fn rollback(&self, tx: &TransactionHandle) {
        let is_read_only = match self.tx_views.get(&tx.tx_id) {
            None => return,
            Some(v) => v.is_read_only(),
        };
        if is_read_only {
            self.tx_views.remove(&tx.tx_id);
            return;
        }

        let _guard = self.lock.write();
        // `all_keys` (materialized entries) is what carries this TX's
        // refcount; `locked_keys` additionally covers keys only ever passed
        // to `lock_read_only`, which prepare still locks (step d) but which
        // never gain a materialized entry view or a refcount — they must
        // still be unlocked and checked for collectibility here.
        let all_keys: Vec<K> = {
            let view = self.tx_views.get(&tx.tx_id).expect("checked above");
            view.iter().map(|(k, _)| k.clone()).collect()
        };
        let locked_keys: Vec<K> = {
            let view = self.tx_views.get(&tx.tx_id).expect("checked above");
            view.locked_keys().into_iter().collect()
        };
        for k in &locked_keys {
            self.index_registry.release_locks(tx.tx_id, k);
            if let Some(mut committed) = self.committed.get_mut(k) {
                committed.unlock_if_owned_by(tx.tx_id);
            }
        }
        for k in &all_keys {
            if let Some(mut committed) = self.committed.get_mut(k) {
                committed.decr_refcount();
            }
        }
        for k in &locked_keys {
            self.committed.remove_if(k, |_, e| e.is_collectible());
        }
        self.tx_views.remove(&tx.tx_id);

        if let Some(adapter) = &self.persistence_adapter {
            if let Err(e) = adapter.after_rollback_for_store(tx) {
                warn!(tx = %tx, store = %self.name, error = %e, "persistence adapter rollback callback failed");
            }
        }
        warn!(tx = %tx, store = %self.name, "rolled back");
    }

    /// Final cleanup when the owning transaction is being dropped entirely
    /// (e.g. an abandoned external transaction). Equivalent to rollback for
    /// a TX view that never committed.
    pub fn destroy(&self, tx: &TransactionHandle) {
        self.rollback(tx);
    }
}

/// Object-safe view of a store's two-phase demarcation, independent of its
/// `K`/`TV`/`CV` types. A [`Container`](../jacis_api/struct.Container.html)
/// holds one of these per registered store so it can drive prepare/commit/
/// rollback across every store in a transaction without knowing their
/// concrete types.
pub trait StoreDemarcation: Send + Sync {
    /// The store's type identifier.
    fn identifier(&self) -> StoreIdentifier;
    /// See [`Store::prepare`].
    fn prepare(&self, tx: &TransactionHandle) -> Result<()>;
    /// See [`Store::commit`].
    fn commit(&self, tx: &TransactionHandle) -> Result<()>;
    /// See [`Store::rollback`].
    fn rollback(&self, tx: &TransactionHandle);
    /// See [`Store::clear`].
    fn clear(&self);
}

impl<K, TV, CV> StoreDemarcation for Store<K, TV, CV>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    TV: Send + Sync + 'static,
    CV: Send + Sync + 'static,
{
    fn identifier(&self) -> StoreIdentifier {
        Store::identifier(self)
    }

    fn prepare(&self, tx: &TransactionHandle) -> Result<()> {
        Store::prepare(self, tx)
    }

    fn commit(&self, tx: &TransactionHandle) -> Result<()> {
        Store::commit(self, tx)
    }

    fn rollback(&self, tx: &TransactionHandle) {
        Store::rollback(self, tx)
    }

    fn clear(&self) {
        Store::clear(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct IdentityAdapter;

    impl ObjectAdapter<i64, i64> for IdentityAdapter {
        fn clone_committed_to_writable_tx_view(&self, committed: &i64) -> i64 {
            *committed
        }
        fn clone_committed_to_read_only_tx_view(&self, committed: &i64) -> i64 {
            *committed
        }
        fn clone_tx_view_to_committed(&self, tx_value: &i64) -> i64 {
            *tx_value
        }
        fn clone_tx_view_to_read_only_tx_view(&self, tx_value: &i64) -> i64 {
            *tx_value
        }
    }

    fn new_store() -> Store<String, i64, i64> {
        let spec = ObjectTypeSpec::new("balances", Arc::new(IdentityAdapter));
        Store::new(
            StoreIdentifier::of::<String, i64>(),
            spec,
            StoreLock::Own(RwLock::new(())),
        )
    }

    #[test]
    fn update_then_commit_is_visible_after_commit() {
        let store = new_store();
        let tx = TransactionHandle::new_local("t1");
        store.update(&tx, &"alice".to_string(), Some(10)).unwrap();
        store.prepare(&tx).unwrap();
        store.commit(&tx).unwrap();

        let tx2 = TransactionHandle::new_local("t2");
        assert_eq!(store.get_read_only(&tx2, &"alice".to_string()), Some(10));
    }

    #[test]
    fn concurrent_update_on_same_key_is_stale_at_prepare() {
        let store = new_store();
        let base = TransactionHandle::new_local("base");
        store.update(&base, &"alice".to_string(), Some(10)).unwrap();
        store.prepare(&base).unwrap();
        store.commit(&base).unwrap();

        let tx1 = TransactionHandle::new_local("tx1");
        let tx2 = TransactionHandle::new_local("tx2");
        store.get(&tx1, &"alice".to_string()).unwrap();
        store.get(&tx2, &"alice".to_string()).unwrap();
        store.update(&tx1, &"alice".to_string(), Some(20)).unwrap();
        store.update(&tx2, &"alice".to_string(), Some(30)).unwrap();

        store.prepare(&tx1).unwrap();
        store.commit(&tx1).unwrap();

        let err = store.prepare(&tx2).unwrap_err();
        assert!(matches!(err, Error::StaleObject { .. }));
        store.rollback(&tx2);
    }

    #[test]
    fn rollback_discards_staged_update() {
        let store = new_store();
        let tx = TransactionHandle::new_local("t1");
        store.update(&tx, &"alice".to_string(), Some(10)).unwrap();
        store.rollback(&tx);

        let tx2 = TransactionHandle::new_local("t2");
        assert_eq!(store.get_read_only(&tx2, &"alice".to_string()), None);
    }

    #[test]
    fn refresh_discards_uncommitted_local_change() {
        let store = new_store();
        let seed = TransactionHandle::new_local("seed");
        store.update(&seed, &"alice".to_string(), Some(10)).unwrap();
        store.prepare(&seed).unwrap();
        store.commit(&seed).unwrap();

        let tx = TransactionHandle::new_local("t1");
        store.update(&tx, &"alice".to_string(), Some(999)).unwrap();
        let refreshed = store.refresh(&tx, &"alice".to_string()).unwrap();
        assert_eq!(refreshed, Some(10));
        store.rollback(&tx);
    }

    #[test]
    fn unique_index_rejects_conflicting_key_at_prepare() {
        let store = new_store();
        let idx = store
            .create_unique_index::<i64>("by_balance", |v: &i64| Some(*v))
            .unwrap();

        let tx1 = TransactionHandle::new_local("tx1");
        store.update(&tx1, &"alice".to_string(), Some(100)).unwrap();
        store.prepare(&tx1).unwrap();
        store.commit(&tx1).unwrap();

        let tx2 = TransactionHandle::new_local("tx2");
        store.update(&tx2, &"bob".to_string(), Some(100)).unwrap();
        let err = store.prepare(&tx2).unwrap_err();
        assert!(matches!(err, Error::UniqueIndexViolation { .. }));
        store.rollback(&tx2);

        assert_eq!(idx.lookup_committed(&100), Some("alice".to_string()));
    }

    #[test]
    fn tracked_view_sees_own_transactions_uncommitted_writes() {
        let store = new_store();
        let view = Arc::new(TrackedView::new(
            "sum",
            || 0_i64,
            |state, _key, old, new| {
                *state -= old.copied().unwrap_or(0);
                *state += new.copied().unwrap_or(0);
                Ok(())
            },
        ));
        store.register_tracked_view(view.clone()).unwrap();

        let seed = TransactionHandle::new_local("seed");
        store.update(&seed, &"alice".to_string(), Some(10)).unwrap();
        store.prepare(&seed).unwrap();
        store.commit(&seed).unwrap();
        assert_eq!(view.clone_view(), 10);

        let tx = TransactionHandle::new_local("t1");
        store.update(&tx, &"bob".to_string(), Some(5)).unwrap();
        assert_eq!(view.clone_view(), 10, "uncommitted write not yet visible to a plain read");
        assert_eq!(
            store.tracked_view(&tx, &view).unwrap(),
            15,
            "tx-aware read folds its own pending write onto the committed view"
        );

        store.prepare(&tx).unwrap();
        store.commit(&tx).unwrap();
        assert_eq!(view.clone_view(), 15);
    }

    #[test]
    fn lock_read_only_without_update_is_unlocked_after_commit() {
        let store = new_store();
        let seed = TransactionHandle::new_local("seed");
        store.update(&seed, &"alice".to_string(), Some(10)).unwrap();
        store.prepare(&seed).unwrap();
        store.commit(&seed).unwrap();

        let tx = TransactionHandle::new_local("t1");
        store.lock_read_only(&tx, &"alice".to_string()).unwrap();
        store.update(&tx, &"bob".to_string(), Some(1)).unwrap();
        store.prepare(&tx).unwrap();
        store.commit(&tx).unwrap();

        assert!(
            store.committed.get(&"alice".to_string()).unwrap().locked_for().is_none(),
            "a key only ever optimistically locked must be unlocked after commit"
        );

        let tx2 = TransactionHandle::new_local("t2");
        store.update(&tx2, &"alice".to_string(), Some(20)).unwrap();
        store.prepare(&tx2).unwrap();
        store.commit(&tx2).unwrap();
    }

    #[test]
    fn lock_read_only_without_update_is_unlocked_after_rollback() {
        let store = new_store();
        let seed = TransactionHandle::new_local("seed");
        store.update(&seed, &"alice".to_string(), Some(10)).unwrap();
        store.prepare(&seed).unwrap();
        store.commit(&seed).unwrap();

        let tx = TransactionHandle::new_local("t1");
        store.lock_read_only(&tx, &"alice".to_string()).unwrap();
        store.update(&tx, &"bob".to_string(), Some(1)).unwrap();
        store.prepare(&tx).unwrap();
        store.rollback(&tx);

        assert!(
            store.committed.get(&"alice".to_string()).unwrap().locked_for().is_none(),
            "a key only ever optimistically locked must be unlocked after rollback"
        );

        let tx2 = TransactionHandle::new_local("t2");
        store.update(&tx2, &"alice".to_string(), Some(20)).unwrap();
        store.prepare(&tx2).unwrap();
        store.commit(&tx2).unwrap();
    }

    #[test]
    fn bulk_load_populates_committed_state_directly() {
        let store = new_store();
        let counter = Arc::new(AtomicU64::new(0));
        let counter2 = counter.clone();
        struct CountingListener(Arc<AtomicU64>);
        impl ModificationListener<String, i64> for CountingListener {
            fn on_modification(
                &self,
                _tx: &TransactionHandle,
                _key: &String,
                _orig: Option<&i64>,
                _new: Option<&i64>,
            ) -> Result<()> {
                self.0.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
        store
            .register_modification_listener(Arc::new(CountingListener(counter2)))
            .unwrap();

        let entries = vec![("alice".to_string(), 1_i64), ("bob".to_string(), 2_i64)];
        store
            .init_store_non_transactional(entries, |(k, _)| k.clone(), |(_, v)| v, 1)
            .unwrap();

        let tx = TransactionHandle::new_local("reader");
        assert_eq!(store.get_read_only(&tx, &"alice".to_string()), Some(1));
        assert_eq!(store.get_read_only(&tx, &"bob".to_string()), Some(2));
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn clear_invalidates_pending_transaction_views() {
        let store = new_store();
        let tx = TransactionHandle::new_local("t1");
        store.get(&tx, &"alice".to_string()).unwrap();
        store.clear();
        let err = store.update(&tx, &"alice".to_string(), Some(1)).unwrap_err();
        assert!(matches!(err, Error::TxAlreadyPrepared));
    }

    // ========================================================================
    // Property tests — commit ordering and stale detection (invariants 2, 3
    // in spec.md §8) hold across arbitrary sequences of single-key updates,
    // not just the hand-picked orderings the unit tests above exercise.
    // ========================================================================

    use proptest::prelude::*;

    proptest! {
        /// A solo writer's committed version strictly increases by one on
        /// every successful commit that updates the key, regardless of how
        /// many updates land in between reads.
        #[test]
        fn version_is_monotonic_under_sequential_commits(values in prop::collection::vec(any::<i64>(), 1..20)) {
            let store = new_store();
            for (i, v) in values.iter().enumerate() {
                let tx = TransactionHandle::new_local(format!("writer-{i}"));
                store.update(&tx, &"k".to_string(), Some(*v)).unwrap();
                store.prepare(&tx).unwrap();
                store.commit(&tx).unwrap();
                let check = TransactionHandle::new_local("check");
                prop_assert_eq!(store.get_read_only(&check, &"k".to_string()), Some(*v));
            }
        }

        /// Whichever of two concurrent writers to the same key commits
        /// first always succeeds; the second always sees `StaleObject` at
        /// prepare, never a silently lost update.
        #[test]
        fn second_committer_on_same_key_always_sees_stale(first_wins in any::<bool>(), a in any::<i64>(), b in any::<i64>()) {
            let store = new_store();
            let seed = TransactionHandle::new_local("seed");
            store.update(&seed, &"k".to_string(), Some(0)).unwrap();
            store.prepare(&seed).unwrap();
            store.commit(&seed).unwrap();

            let tx1 = TransactionHandle::new_local("tx1");
            let tx2 = TransactionHandle::new_local("tx2");
            store.get(&tx1, &"k".to_string()).unwrap();
            store.get(&tx2, &"k".to_string()).unwrap();
            store.update(&tx1, &"k".to_string(), Some(a)).unwrap();
            store.update(&tx2, &"k".to_string(), Some(b)).unwrap();

            let (first, second) = if first_wins { (&tx1, &tx2) } else { (&tx2, &tx1) };
            store.prepare(first).unwrap();
            store.commit(first).unwrap();
            let err = store.prepare(second).unwrap_err();
            prop_assert!(matches!(err, Error::StaleObject { .. }));
            store.rollback(second);
        }
    }
}
