//! Pluggable-collaborator interfaces consumed by the engine.
//!
//! Every trait here is object-safe on purpose: stores and containers hold
//! these behind `Arc<dyn ...>` so a registry of heterogeneous listeners,
//! adapters, and views can be iterated without knowing concrete types.

use crate::error::Result;
use crate::types::TransactionHandle;

/// Converts values between their transaction-view shape (`TV`, what callers
/// see) and their committed shape (`CV`, what the store holds outside any
/// transaction).
///
/// The double clone — committed → writable TX view at materialization, TX
/// view → committed at commit — is deliberate even
/// when `TV == CV`: it severs aliasing between a transaction's private
/// workspace and the authoritative value, so a caller mutating a value they
/// read can never corrupt committed state or another transaction's view.
pub trait ObjectAdapter<TV, CV>: Send + Sync {
    /// Clone a committed value into a fresh, mutable TX-view value.
    fn clone_committed_to_writable_tx_view(&self, committed: &CV) -> TV;

    /// Clone a committed value into a read-only TX-view value, for callers
    /// that never intend to materialize a full TX-view entry.
    fn clone_committed_to_read_only_tx_view(&self, committed: &CV) -> TV;

    /// Clone a TX value back into its committed shape at commit time.
    fn clone_tx_view_to_committed(&self, tx_value: &TV) -> CV;

    /// Clone a TX value into a read-only TX value, e.g. for `getReadOnly`
    /// when a TX-view entry already exists.
    fn clone_tx_view_to_read_only_tx_view(&self, tx_value: &TV) -> TV;

    /// Switch a TX value into read-only mode in place, if the value type
    /// supports it (used by `switchToReadOnlyModeInPrepare`). Default is a
    /// no-op for value types with no such notion.
    fn switch_to_read_only_mode(&self, _value: &mut TV) {}
}

/// Structural dirty check used during prepare to catch modifications made
/// in place on a mutable TX value without calling `Store::update`.
pub trait DirtyCheck<K, TV>: Send + Sync {
    /// Return true if `current` differs structurally from `orig`.
    fn is_dirty(&self, key: &K, orig: &TV, current: &TV) -> bool;
}

/// Notified of every committed modification; also the mechanism by which
/// the index registry (C6) and tracked-view registry (C7) attach themselves
/// to a store.
pub trait ModificationListener<K, TV>: Send + Sync {
    /// Called during prepare, before the stale check installs locks. May
    /// return `Err` to veto the whole transaction
    /// ([`crate::Error::ModificationVeto`]).
    fn on_prepare_modification(
        &self,
        _tx: &TransactionHandle,
        _key: &K,
        _orig: Option<&TV>,
        _new: Option<&TV>,
    ) -> Result<()> {
        Ok(())
    }

    /// Called during commit, once per updated entry, in `updated_seq` order.
    fn on_modification(
        &self,
        tx: &TransactionHandle,
        key: &K,
        orig: Option<&TV>,
        new: Option<&TV>,
    ) -> Result<()>;

    /// Optional hook to adjust a value immediately before prepare runs its
    /// stale/dirty checks (e.g. to stamp a last-modified field).
    fn on_adjust_before_prepare(&self, _tx: &TransactionHandle, _key: &K, _value: &mut TV) {}

    /// Whether this listener's callbacks may be invoked concurrently from
    /// multiple threads. Non-thread-safe listeners are serialized by the
    /// store during bulk, non-transactional loads.
    fn is_thread_safe(&self) -> bool {
        true
    }
}

/// Notified of container-wide two-phase demarcation events, independent of
/// any one store.
pub trait TransactionListener: Send + Sync {
    /// Called before any store's prepare runs.
    fn before_prepare(&self, _tx: &TransactionHandle) -> Result<()> {
        Ok(())
    }
    /// Called after every store has prepared successfully. The whole
    /// transaction fails if any listener returns `Err` here.
    fn after_prepare(&self, _tx: &TransactionHandle) -> Result<()> {
        Ok(())
    }
    /// Called before any store's commit runs.
    fn before_commit(&self, _tx: &TransactionHandle) -> Result<()> {
        Ok(())
    }
    /// Called after every store has committed.
    fn after_commit(&self, _tx: &TransactionHandle) {}
    /// Called before any store's rollback runs.
    fn before_rollback(&self, _tx: &TransactionHandle) {}
    /// Called after every store has rolled back.
    fn after_rollback(&self, _tx: &TransactionHandle) {}

    /// Whether this listener should be dispatched inline with the
    /// triggering phase (synchronous) or enqueued to run off the calling
    /// thread (asynchronous). Asynchronous listeners are never required for
    /// correctness.
    fn is_synchronous(&self) -> bool {
        true
    }
}

/// Binds the container to whatever currently identifies "the active
/// transaction" for the calling thread — either a purely local notion
/// (`LocalTransactionAdapter`) or a bridge to an ambient external
/// transaction coordinator.
pub trait TransactionAdapter: Send + Sync {
    /// Return the handle for the calling thread's current transaction.
    /// Raises [`crate::Error::NoTransaction`] when `enforce` is true and
    /// none is bound.
    fn current_transaction(&self, enforce: bool) -> Result<Option<TransactionHandle>>;

    /// Bind `handle` as the calling thread's current transaction, and
    /// register it with the ambient coordinator on first join so
    /// prepare/commit callbacks reach this container.
    fn join_current_transaction(&self, handle: TransactionHandle) -> Result<()>;

    /// Clear the calling thread's current-transaction binding after
    /// commit/rollback/destroy.
    fn destroy_current_transaction(&self);
}

/// Extends [`ModificationListener`] with store-lifecycle callbacks for an
/// out-of-core durability layer. The interface is part of the public
/// surface even though no implementation ships in this crate.
pub trait PersistenceAdapter<K, TV>: ModificationListener<K, TV> {
    /// Called once when a store is created, to load any persisted entries.
    fn initialize_store(&self) -> Result<()> {
        Ok(())
    }
    /// Called after a store finishes its prepare phase for a transaction.
    fn after_prepare_for_store(&self, _tx: &TransactionHandle) -> Result<()> {
        Ok(())
    }
    /// Called after a store finishes committing a transaction.
    fn after_commit_for_store(&self, _tx: &TransactionHandle) -> Result<()> {
        Ok(())
    }
    /// Called after a store finishes rolling back a transaction.
    fn after_rollback_for_store(&self, _tx: &TransactionHandle) -> Result<()> {
        Ok(())
    }
}
