//! The container (C8): owns every store in the system plus the
//! transaction-listener list and transaction adapter, and drives two-phase
//! demarcation across all of them.

use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use jacis_core::config::ObjectTypeSpec;
use jacis_core::traits::{ObjectAdapter, TransactionAdapter, TransactionListener};
use jacis_core::types::{StoreIdentifier, TransactionHandle};
use jacis_core::{Error, Result};
use jacis_store::store::{Store, StoreDemarcation, StoreLock};

use crate::async_dispatch::AsyncListenerDispatcher;
use crate::local_transaction::LocalTransaction;
use crate::transaction_adapter::LocalTransactionAdapter;

/// Owns a set of typed stores and the transaction-listener list that
/// observes two-phase demarcation across all of them.
///
/// Every store created through [`Container::create_store`] is registered
/// twice internally: once type-erased behind [`StoreDemarcation`] (so
/// `internal_prepare`/`internal_commit`/`internal_rollback` can drive every
/// store without knowing its concrete `(K, TV, CV)`), and once behind
/// `dyn Any` keyed by [`StoreIdentifier`] so [`Container::get_store`] can
/// hand back the original typed handle.
pub struct Container {
    typed_stores: DashMap<StoreIdentifier, Arc<dyn Any + Send + Sync>>,
    demarcations: RwLock<Vec<Arc<dyn StoreDemarcation>>>,
    tx_listeners: RwLock<Vec<Arc<dyn TransactionListener>>>,
    tx_adapter: Arc<dyn TransactionAdapter>,
    container_lock: Arc<RwLock<()>>,
    async_dispatcher: AsyncListenerDispatcher,
}

impl Container {
    /// Build a container using the default [`LocalTransactionAdapter`].
    pub fn new() -> Arc<Self> {
        Self::with_transaction_adapter(Arc::new(LocalTransactionAdapter::new()))
    }

    /// Build a container bridging to an ambient transaction coordinator
    /// (or any other custom [`TransactionAdapter`]).
    pub fn with_transaction_adapter(tx_adapter: Arc<dyn TransactionAdapter>) -> Arc<Self> {
        Arc::new(Container {
            typed_stores: DashMap::new(),
            demarcations: RwLock::new(Vec::new()),
            tx_listeners: RwLock::new(Vec::new()),
            tx_adapter,
            container_lock: Arc::new(RwLock::new(())),
            async_dispatcher: AsyncListenerDispatcher::new(),
        })
    }

    /// Register a transaction listener, notified of two-phase demarcation
    /// events across every store in this container.
    pub fn register_transaction_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.tx_listeners.write().push(listener);
    }

    /// Create a new store of type `(K, TV, CV)` from `spec` and install it
    /// into the container. Stores are identified by `(K, TV)`; creating a
    /// second store with the same pair of types replaces the registration
    /// used for demarcation/lookup (the earlier `Store` instance, and
    /// anything committed in it, becomes unreachable through this
    /// container).
    pub fn create_store<K, TV, CV>(&self, spec: ObjectTypeSpec<K, TV, CV>) -> Arc<Store<K, TV, CV>>
    where
        K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
        TV: Send + Sync + 'static,
        CV: Send + Sync + 'static,
    {
        let identifier = StoreIdentifier::of::<K, TV>();
        let lock = if spec.syncs_store_on_container_transaction() {
            StoreLock::Shared(self.container_lock.clone())
        } else {
            StoreLock::Own(RwLock::new(()))
        };
        let store = Arc::new(Store::new(identifier, spec, lock));
        self.typed_stores
            .insert(identifier, store.clone() as Arc<dyn Any + Send + Sync>);
        self.demarcations.write().push(store.clone() as Arc<dyn StoreDemarcation>);
        debug!(store = %identifier, "store created");
        store
    }

    /// Look up a previously created store by its `(K, TV)` type pair.
    pub fn get_store<K, TV, CV>(&self) -> Option<Arc<Store<K, TV, CV>>>
    where
        K: 'static,
        TV: 'static,
        CV: Send + Sync + 'static,
    {
        let identifier = StoreIdentifier::of::<K, TV>();
        self.typed_stores
            .get(&identifier)
            .and_then(|entry| entry.value().clone().downcast::<Store<K, TV, CV>>().ok())
    }

    /// Look up a store, creating it from `spec` on first access. Convenience
    /// wrapper over [`Self::get_store`] / [`Self::create_store`] for call
    /// sites that do not need to hold onto a pre-built spec.
    pub fn get_or_create_store<K, TV, CV>(
        &self,
        spec_factory: impl FnOnce() -> ObjectTypeSpec<K, TV, CV>,
    ) -> Arc<Store<K, TV, CV>>
    where
        K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
        TV: Send + Sync + 'static,
        CV: Send + Sync + 'static,
    {
        if let Some(store) = self.get_store::<K, TV, CV>() {
            return store;
        }
        self.create_store(spec_factory())
    }

    /// Build a trivial `ObjectTypeSpec` for stores where `TV == CV` and no
    /// conversion work is needed; a convenience for callers who do not need
    /// a distinct committed representation.
    pub fn identity_spec<K, V>(name: impl Into<String>) -> ObjectTypeSpec<K, V, V>
    where
        V: Clone + Send + Sync + 'static,
    {
        ObjectTypeSpec::new(name, Arc::new(IdentityObjectAdapter::<V>::default()))
    }

    /// The transaction adapter bound to this container.
    pub fn transaction_adapter(&self) -> &Arc<dyn TransactionAdapter> {
        &self.tx_adapter
    }

    /// The handle for the calling thread's current transaction, per the
    /// bound [`TransactionAdapter`]. Raises [`Error::NoTransaction`] when
    /// `enforce` is true and none is bound.
    pub fn current_transaction(&self, enforce: bool) -> Result<Option<TransactionHandle>> {
        self.tx_adapter.current_transaction(enforce)
    }

    /// Begin a new local transaction, described by `description`, and join
    /// it as the calling thread's current transaction.
    pub fn begin_local_transaction(self: &Arc<Self>, description: impl Into<String>) -> Result<LocalTransaction> {
        let handle = TransactionHandle::new_local(description);
        self.tx_adapter.join_current_transaction(handle.clone())?;
        debug!(tx = %handle, "transaction begun");
        Ok(LocalTransaction::new(self.clone(), handle))
    }

    /// Run `task` inside a fresh local transaction, committing on success
    /// and rolling back on any `Err`/panic unwind path. See
    /// [`crate::local_transaction::with_local_tx`] for the exact semantics.
    pub fn with_local_tx<R>(
        self: &Arc<Self>,
        description: impl Into<String>,
        task: impl FnOnce(&LocalTransaction) -> Result<R>,
    ) -> Result<R> {
        crate::local_transaction::with_local_tx(self, description, task)
    }

    /// Like [`Self::with_local_tx`], retrying on [`Error::StaleObject`] up
    /// to `retries - 1` additional times.
    pub fn with_local_tx_and_retry<R>(
        self: &Arc<Self>,
        retries: usize,
        description: impl Into<String> + Clone,
        task: impl Fn(&LocalTransaction) -> Result<R>,
    ) -> Result<R> {
        crate::local_transaction::with_local_tx_and_retry(self, retries, description, task)
    }

    /// Clear every store registered in this container. Invalidates every
    /// pending transaction view across every store.
    pub fn clear_all_stores(&self) {
        let demarcations = self.demarcations.read().clone();
        for demarcation in demarcations {
            demarcation.clear();
        }
    }

    /// Run `f` while holding the container-wide lock, serializing against
    /// every store configured with `sync_store_on_container_transaction`.
    /// Stores that opted out (their own private lock) are not blocked by
    /// this call.
    pub fn execute_global_atomic<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.container_lock.read();
        f()
    }

    // ---- two-phase demarcation across every registered store -------------

    /// Prepare every store's view of `tx`, running `before_prepare`/
    /// `after_prepare` transaction-listener callbacks around the sweep. On
    /// the first store prepare failure, demarcation stops immediately —
    /// earlier stores remain prepared (and locked) until the caller rolls
    /// back, matching the two-phase contract (§4.8: the driver does not
    /// catch store-level errors).
    pub fn internal_prepare(&self, tx: &TransactionHandle) -> Result<()> {
        self.dispatch_listeners(tx, Listener::BeforePrepare)?;
        let demarcations = self.demarcations.read().clone();
        for store in &demarcations {
            store.prepare(tx)?;
        }
        self.dispatch_listeners(tx, Listener::AfterPrepare)?;
        Ok(())
    }

    /// Commit every store's view of `tx` (implicitly preparing any store
    /// that has not yet prepared), then destroys the transaction binding
    /// via the transaction adapter.
    pub fn internal_commit(&self, tx: &TransactionHandle) -> Result<()> {
        self.dispatch_listeners(tx, Listener::BeforeCommit)?;
        let mut errors = Vec::new();
        let demarcations = self.demarcations.read().clone();
        for store in &demarcations {
            if let Err(e) = store.commit(tx) {
                errors.push(e);
            }
        }
        self.tx_adapter.destroy_current_transaction();
        self.dispatch_after_commit(tx);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::aggregate(errors))
        }
    }

    /// Roll back every store's view of `tx`, then destroy the transaction
    /// binding. Never fails: store-level rollback is itself infallible.
    pub fn internal_rollback(&self, tx: &TransactionHandle) {
        self.dispatch_before_rollback(tx);
        let demarcations = self.demarcations.read().clone();
        for store in &demarcations {
            store.rollback(tx);
        }
        self.tx_adapter.destroy_current_transaction();
        self.dispatch_after_rollback(tx);
    }

    fn dispatch_listeners(&self, tx: &TransactionHandle, which: Listener) -> Result<()> {
        let listeners = self.tx_listeners.read().clone();
        for listener in listeners {
            if listener.is_synchronous() {
                match which {
                    Listener::BeforePrepare => listener.before_prepare(tx)?,
                    Listener::AfterPrepare => listener.after_prepare(tx)?,
                    Listener::BeforeCommit => listener.before_commit(tx)?,
                }
            } else {
                let tx = tx.clone();
                self.async_dispatcher.dispatch(move || {
                    let _ = match which {
                        Listener::BeforePrepare => listener.before_prepare(&tx),
                        Listener::AfterPrepare => listener.after_prepare(&tx),
                        Listener::BeforeCommit => listener.before_commit(&tx),
                    };
                });
            }
        }
        Ok(())
    }

    fn dispatch_after_commit(&self, tx: &TransactionHandle) {
        for listener in self.tx_listeners.read().iter().cloned() {
            if listener.is_synchronous() {
                listener.after_commit(tx);
            } else {
                let tx = tx.clone();
                self.async_dispatcher.dispatch(move || listener.after_commit(&tx));
            }
        }
    }

    fn dispatch_before_rollback(&self, tx: &TransactionHandle) {
        for listener in self.tx_listeners.read().iter().cloned() {
            if listener.is_synchronous() {
                listener.before_rollback(tx);
            } else {
                let tx = tx.clone();
                self.async_dispatcher.dispatch(move || listener.before_rollback(&tx));
            }
        }
    }

    fn dispatch_after_rollback(&self, tx: &TransactionHandle) {
        for listener in self.tx_listeners.read().iter().cloned() {
            if listener.is_synchronous() {
                listener.after_rollback(tx);
            } else {
                let tx = tx.clone();
                self.async_dispatcher.dispatch(move || listener.after_rollback(&tx));
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Listener {
    BeforePrepare,
    AfterPrepare,
    BeforeCommit,
}

/// A no-op [`ObjectAdapter`] for value types that are `Clone` and need no
/// distinct committed representation.
struct IdentityObjectAdapter<V>(std::marker::PhantomData<V>);

impl<V> Default for IdentityObjectAdapter<V> {
    fn default() -> Self {
        IdentityObjectAdapter(std::marker::PhantomData)
    }
}

impl<V: Clone + Send + Sync> ObjectAdapter<V, V> for IdentityObjectAdapter<V> {
    fn clone_committed_to_writable_tx_view(&self, committed: &V) -> V {
        committed.clone()
    }
    fn clone_committed_to_read_only_tx_view(&self, committed: &V) -> V {
        committed.clone()
    }
    fn clone_tx_view_to_committed(&self, tx_value: &V) -> V {
        tx_value.clone()
    }
    fn clone_tx_view_to_read_only_tx_view(&self, tx_value: &V) -> V {
        tx_value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacis_core::config::ObjectTypeSpec;

    #[test]
    fn create_and_get_store_round_trip() {
        let container = Container::new();
        let store = container.create_store(Container::identity_spec::<String, i64>("balances"));
        store.register_modification_listener(Arc::new(NoopListener)).unwrap();
        let fetched = container.get_store::<String, i64, i64>().expect("store was registered");
        assert_eq!(fetched.name(), "balances");
    }

    #[test]
    fn get_store_before_creation_is_none() {
        let container = Container::new();
        assert!(container.get_store::<String, i64, i64>().is_none());
    }

    struct NoopListener;
    impl jacis_core::traits::ModificationListener<String, i64> for NoopListener {
        fn on_modification(
            &self,
            _tx: &TransactionHandle,
            _key: &String,
            _orig: Option<&i64>,
            _new: Option<&i64>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn commit_round_trips_through_container_demarcation() {
        let container = Container::new();
        let store = container.create_store(Container::identity_spec::<String, i64>("balances"));
        let tx = container.begin_local_transaction("t1").unwrap();
        store.update(tx.handle(), &"alice".to_string(), Some(10)).unwrap();
        tx.commit().unwrap();

        let tx2 = container.begin_local_transaction("t2").unwrap();
        assert_eq!(store.get_read_only(tx2.handle(), &"alice".to_string()), Some(10));
        tx2.rollback();
    }
}
