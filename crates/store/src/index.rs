//! Secondary indexes maintained incrementally as a store commits.
//!
//! An index is registered once via [`IndexRegistry::create_unique`] /
//! [`create_non_unique`] / [`create_non_unique_multi`], which both installs
//! the maintainer into the registry (so commit dispatches to it like any
//! other modification listener) and hands the caller back a concrete
//! lookup handle (`UniqueIndex` / `NonUniqueIndex` / `MultiIndex`) typed on
//! the index key. The registry itself only needs to dispatch by `(K, TV)`,
//! so each maintainer is stored behind the object-safe
//! [`IndexMaintainer`] trait, which erases the index-key type.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use jacis_core::{Error, Result, TxId};

/// Object-safe handle the registry dispatches commit/prepare events through,
/// independent of the concrete index-key type.
pub trait IndexMaintainer<K, TV>: Send + Sync {
    /// The index's diagnostic name.
    fn name(&self) -> &str;

    /// Whether this is a unique index (participates in prepare-time
    /// key locking) as opposed to non-unique/multi.
    fn is_unique(&self) -> bool;

    /// Attempt to claim the index key(s) `new` derives to, for `tx`,
    /// rejecting if another primary key already owns (or has prepared a
    /// claim on) one of them. No-op for non-unique/multi indexes.
    fn prepare_lock(&self, tx: TxId, key: &K, new: Option<&TV>) -> Result<()>;

    /// Release any prepare-time lock `tx` holds, without committing it.
    fn release_lock(&self, tx: TxId, key: &K);

    /// Apply a committed modification: remove `key` from `old`'s index
    /// keys, add it to `new`'s.
    fn on_commit_modification(&self, tx: TxId, key: &K, old: Option<&TV>, new: Option<&TV>);

    /// Drop all index state, e.g. when the owning store is cleared.
    fn clear(&self);
}

/// A unique index: each index key maps to at most one primary key.
pub struct UniqueIndex<K, TV, IK> {
    name: String,
    key_fn: Arc<dyn Fn(&TV) -> Option<IK> + Send + Sync>,
    committed: DashMap<IK, K>,
    locks: DashMap<IK, (K, TxId)>,
}

impl<K, TV, IK> UniqueIndex<K, TV, IK>
where
    K: Clone + Eq + Hash + Send + Sync,
    IK: Clone + Eq + Hash + Send + Sync,
{
    fn new(name: impl Into<String>, key_fn: Arc<dyn Fn(&TV) -> Option<IK> + Send + Sync>) -> Self {
        UniqueIndex {
            name: name.into(),
            key_fn,
            committed: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Look up the primary key currently owning `index_key` in committed
    /// state, ignoring any in-flight prepare locks.
    pub fn lookup_committed(&self, index_key: &IK) -> Option<K> {
        self.committed.get(index_key).map(|e| e.clone())
    }

    /// Look up `index_key`, preferring `tx`'s own provisional claim (if
    /// any) over committed state, so a transaction sees its own pending
    /// writes.
    pub fn lookup(&self, index_key: &IK, tx: Option<TxId>) -> Option<K> {
        if let Some(t) = tx {
            if let Some(entry) = self.locks.get(index_key) {
                if entry.1 == t {
                    return Some(entry.0.clone());
                }
            }
        }
        self.lookup_committed(index_key)
    }
}

impl<K, TV, IK> IndexMaintainer<K, TV> for UniqueIndex<K, TV, IK>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug,
    IK: Clone + Eq + Hash + Send + Sync + std::fmt::Debug,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn prepare_lock(&self, tx: TxId, key: &K, new: Option<&TV>) -> Result<()> {
        let new_key = match new.and_then(|v| (self.key_fn)(v)) {
            Some(k) => k,
            None => return Ok(()),
        };
        if let Some(existing) = self.committed.get(&new_key) {
            if *existing != *key {
                return Err(Error::UniqueIndexViolation {
                    index_name: self.name.clone(),
                    index_key: format!("{new_key:?}"),
                    existing_primary_key: format!("{:?}", *existing),
                    conflicting_tx: None,
                });
            }
        }
        if let Some(lock) = self.locks.get(&new_key) {
            if lock.1 != tx && lock.0 != *key {
                return Err(Error::UniqueIndexViolation {
                    index_name: self.name.clone(),
                    index_key: format!("{new_key:?}"),
                    existing_primary_key: format!("{:?}", lock.0),
                    conflicting_tx: Some(lock.1),
                });
            }
        }
        self.locks.insert(new_key, (key.clone(), tx));
        Ok(())
    }

    fn release_lock(&self, tx: TxId, _key: &K) {
        self.locks.retain(|_, (_, owner)| *owner != tx);
    }

    fn on_commit_modification(&self, tx: TxId, key: &K, old: Option<&TV>, new: Option<&TV>) {
        let old_key = old.and_then(|v| (self.key_fn)(v));
        let new_key = new.and_then(|v| (self.key_fn)(v));
        self.locks.retain(|_, (pk, owner)| !(*owner == tx && pk == key));
        if old_key == new_key {
            return;
        }
        if let Some(ok) = old_key {
            self.committed.remove_if(&ok, |_, pk| pk == key);
        }
        if let Some(nk) = new_key {
            self.committed.insert(nk, key.clone());
        }
    }

    fn clear(&self) {
        self.committed.clear();
        self.locks.clear();
    }
}

/// A non-unique index: each index key maps to a set of primary keys.
pub struct NonUniqueIndex<K, TV, IK> {
    name: String,
    key_fn: Arc<dyn Fn(&TV) -> Option<IK> + Send + Sync>,
    committed: DashMap<IK, HashSet<K>>,
}

impl<K, TV, IK> NonUniqueIndex<K, TV, IK>
where
    K: Clone + Eq + Hash + Send + Sync,
    IK: Clone + Eq + Hash + Send + Sync,
{
    fn new(name: impl Into<String>, key_fn: Arc<dyn Fn(&TV) -> Option<IK> + Send + Sync>) -> Self {
        NonUniqueIndex {
            name: name.into(),
            key_fn,
            committed: DashMap::new(),
        }
    }

    /// All primary keys currently indexed under `index_key`.
    pub fn lookup(&self, index_key: &IK) -> HashSet<K> {
        self.committed.get(index_key).map(|e| e.clone()).unwrap_or_default()
    }
}

impl<K, TV, IK> IndexMaintainer<K, TV> for NonUniqueIndex<K, TV, IK>
where
    K: Clone + Eq + Hash + Send + Sync,
    IK: Clone + Eq + Hash + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn prepare_lock(&self, _tx: TxId, _key: &K, _new: Option<&TV>) -> Result<()> {
        Ok(())
    }

    fn release_lock(&self, _tx: TxId, _key: &K) {}

    fn on_commit_modification(&self, _tx: TxId, key: &K, old: Option<&TV>, new: Option<&TV>) {
        let old_key = old.and_then(|v| (self.key_fn)(v));
        let new_key = new.and_then(|v| (self.key_fn)(v));
        if old_key == new_key {
            return;
        }
        if let Some(ok) = old_key {
            if let Some(mut set) = self.committed.get_mut(&ok) {
                set.remove(key);
            }
        }
        if let Some(nk) = new_key {
            self.committed.entry(nk).or_default().insert(key.clone());
        }
    }

    fn clear(&self) {
        self.committed.clear();
    }
}

/// A multi-index: one value can yield several index keys (e.g. tags);
/// each key is maintained as in a non-unique index.
pub struct MultiIndex<K, TV, IK> {
    name: String,
    keys_fn: Arc<dyn Fn(&TV) -> Vec<IK> + Send + Sync>,
    committed: DashMap<IK, HashSet<K>>,
}

impl<K, TV, IK> MultiIndex<K, TV, IK>
where
    K: Clone + Eq + Hash + Send + Sync,
    IK: Clone + Eq + Hash + Send + Sync,
{
    fn new(name: impl Into<String>, keys_fn: Arc<dyn Fn(&TV) -> Vec<IK> + Send + Sync>) -> Self {
        MultiIndex {
            name: name.into(),
            keys_fn,
            committed: DashMap::new(),
        }
    }

    /// All primary keys currently indexed under `index_key`.
    pub fn lookup(&self, index_key: &IK) -> HashSet<K> {
        self.committed.get(index_key).map(|e| e.clone()).unwrap_or_default()
    }
}

impl<K, TV, IK> IndexMaintainer<K, TV> for MultiIndex<K, TV, IK>
where
    K: Clone + Eq + Hash + Send + Sync,
    IK: Clone + Eq + Hash + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn prepare_lock(&self, _tx: TxId, _key: &K, _new: Option<&TV>) -> Result<()> {
        Ok(())
    }

    fn release_lock(&self, _tx: TxId, _key: &K) {}

    fn on_commit_modification(&self, _tx: TxId, key: &K, old: Option<&TV>, new: Option<&TV>) {
        let old_keys: HashSet<IK> = old.map(|v| (self.keys_fn)(v).into_iter().collect()).unwrap_or_default();
        let new_keys: HashSet<IK> = new.map(|v| (self.keys_fn)(v).into_iter().collect()).unwrap_or_default();
        for removed in old_keys.difference(&new_keys) {
            if let Some(mut set) = self.committed.get_mut(removed) {
                set.remove(key);
            }
        }
        for added in new_keys.difference(&old_keys) {
            self.committed.entry(added.clone()).or_default().insert(key.clone());
        }
    }

    fn clear(&self) {
        self.committed.clear();
    }
}

/// All indexes registered on one store.
///
/// Dispatched as a single [`jacis_core::ModificationListener`] from the
/// store: `on_modification` fans out to every registered maintainer.
/// Unique-index prepare locking is invoked separately from the store's
/// prepare step (before the generic listener dispatch), matching the
/// two-phase contract: lock first, commit-write second.
pub struct IndexRegistry<K, TV> {
    indexes: parking_lot::RwLock<Vec<Arc<dyn IndexMaintainer<K, TV>>>>,
}

impl<K, TV> Default for IndexRegistry<K, TV> {
    fn default() -> Self {
        IndexRegistry {
            indexes: parking_lot::RwLock::new(Vec::new()),
        }
    }
}

impl<K, TV> IndexRegistry<K, TV>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    TV: Send + Sync + 'static,
{
    /// Register a unique index and return its lookup handle.
    pub fn create_unique<IK>(
        &self,
        name: impl Into<String>,
        key_fn: impl Fn(&TV) -> Option<IK> + Send + Sync + 'static,
    ) -> Arc<UniqueIndex<K, TV, IK>>
    where
        IK: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    {
        let index = Arc::new(UniqueIndex::new(name, Arc::new(key_fn)));
        self.indexes.write().push(index.clone());
        index
    }

    /// Register a non-unique index and return its lookup handle.
    pub fn create_non_unique<IK>(
        &self,
        name: impl Into<String>,
        key_fn: impl Fn(&TV) -> Option<IK> + Send + Sync + 'static,
    ) -> Arc<NonUniqueIndex<K, TV, IK>>
    where
        IK: Clone + Eq + Hash + Send + Sync + 'static,
    {
        let index = Arc::new(NonUniqueIndex::new(name, Arc::new(key_fn)));
        self.indexes.write().push(index.clone());
        index
    }

    /// Register a multi-valued index and return its lookup handle.
    pub fn create_non_unique_multi<IK>(
        &self,
        name: impl Into<String>,
        keys_fn: impl Fn(&TV) -> Vec<IK> + Send + Sync + 'static,
    ) -> Arc<MultiIndex<K, TV, IK>>
    where
        IK: Clone + Eq + Hash + Send + Sync + 'static,
    {
        let index = Arc::new(MultiIndex::new(name, Arc::new(keys_fn)));
        self.indexes.write().push(index.clone());
        index
    }

    /// Acquire prepare-time locks on every unique index for one updated
    /// entry. Called from the store's prepare step, after the per-entry
    /// stale check and before modification-listener dispatch.
    pub fn prepare_lock_all(&self, tx: TxId, key: &K, new: Option<&TV>) -> Result<()> {
        for index in self.indexes.read().iter() {
            if index.is_unique() {
                index.prepare_lock(tx, key, new)?;
            }
        }
        Ok(())
    }

    /// Release every unique-index lock `tx` holds for `key`, used on
    /// rollback and at the start of commit.
    pub fn release_locks(&self, tx: TxId, key: &K) {
        for index in self.indexes.read().iter() {
            index.release_lock(tx, key);
        }
    }

    /// Apply a committed modification to every registered index.
    pub fn on_commit_modification(&self, tx: TxId, key: &K, old: Option<&TV>, new: Option<&TV>) {
        for index in self.indexes.read().iter() {
            index.on_commit_modification(tx, key, old, new);
        }
    }

    /// Drop all index state (used by `Store::clear`).
    pub fn clear(&self) {
        for index in self.indexes.read().iter() {
            index.clear();
        }
    }
}
