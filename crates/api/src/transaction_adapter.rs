//! Binds a container to whatever currently identifies "the active
//! transaction" for the calling thread (C10).
//!
//! Two variants ship here: [`LocalTransactionAdapter`], which keeps its own
//! thread-local notion of the current transaction, and
//! [`ExternalTransactionAdapter`], a thin bridge to an ambient transaction
//! manager supplied by the caller. Both implement
//! [`jacis_core::traits::TransactionAdapter`].

use std::cell::RefCell;
use std::sync::Arc;

use jacis_core::traits::TransactionAdapter;
use jacis_core::types::TransactionHandle;
use jacis_core::{Error, Result};

thread_local! {
    static CURRENT_LOCAL_TX: RefCell<Option<TransactionHandle>> = const { RefCell::new(None) };
}

/// The default adapter: "the current transaction" is whatever this thread
/// most recently joined, stored in a thread-local cell. No external
/// coordinator is consulted.
#[derive(Debug, Default)]
pub struct LocalTransactionAdapter;

impl LocalTransactionAdapter {
    /// Build a new local adapter.
    pub fn new() -> Self {
        LocalTransactionAdapter
    }
}

impl TransactionAdapter for LocalTransactionAdapter {
    fn current_transaction(&self, enforce: bool) -> Result<Option<TransactionHandle>> {
        let current = CURRENT_LOCAL_TX.with(|cell| cell.borrow().clone());
        if enforce && current.is_none() {
            return Err(Error::NoTransaction);
        }
        Ok(current)
    }

    fn join_current_transaction(&self, handle: TransactionHandle) -> Result<()> {
        CURRENT_LOCAL_TX.with(|cell| *cell.borrow_mut() = Some(handle));
        Ok(())
    }

    fn destroy_current_transaction(&self) {
        CURRENT_LOCAL_TX.with(|cell| *cell.borrow_mut() = None);
    }
}

/// A caller-supplied bridge into an ambient (external) transaction
/// coordinator — e.g. a JTA-like transaction manager. This crate does not
/// implement one; `poll` is supplied by the embedding application and is
/// consulted instead of a thread-local cell.
///
/// `join` is invoked the first time this container sees a given external
/// transaction, so the coordinator can register prepare/commit/rollback
/// callbacks that eventually call back into [`crate::Container`].
pub struct ExternalTransactionAdapter {
    poll: Arc<dyn Fn() -> Option<TransactionHandle> + Send + Sync>,
    join: Arc<dyn Fn(&TransactionHandle) -> Result<()> + Send + Sync>,
}

impl ExternalTransactionAdapter {
    /// Build an adapter around `poll` (asks the ambient coordinator for the
    /// calling thread's current transaction, if any) and `join` (registers
    /// a container with the coordinator the first time a transaction is
    /// joined).
    pub fn new(
        poll: impl Fn() -> Option<TransactionHandle> + Send + Sync + 'static,
        join: impl Fn(&TransactionHandle) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        ExternalTransactionAdapter {
            poll: Arc::new(poll),
            join: Arc::new(join),
        }
    }
}

impl TransactionAdapter for ExternalTransactionAdapter {
    fn current_transaction(&self, enforce: bool) -> Result<Option<TransactionHandle>> {
        let current = (self.poll)();
        if enforce && current.is_none() {
            return Err(Error::NoTransaction);
        }
        Ok(current)
    }

    fn join_current_transaction(&self, handle: TransactionHandle) -> Result<()> {
        (self.join)(&handle)
    }

    fn destroy_current_transaction(&self) {
        // The ambient coordinator owns the transaction's lifecycle; there is
        // nothing local to clear.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_adapter_round_trips_the_joined_handle() {
        let adapter = LocalTransactionAdapter::new();
        assert!(matches!(
            adapter.current_transaction(true),
            Err(Error::NoTransaction)
        ));
        let handle = TransactionHandle::new_local("t1");
        adapter.join_current_transaction(handle.clone()).unwrap();
        let current = adapter.current_transaction(true).unwrap().unwrap();
        assert_eq!(current, handle);
        adapter.destroy_current_transaction();
        assert!(adapter.current_transaction(false).unwrap().is_none());
    }

    #[test]
    fn local_adapter_is_thread_local() {
        let adapter = Arc::new(LocalTransactionAdapter::new());
        let handle = TransactionHandle::new_local("main-thread-tx");
        adapter.join_current_transaction(handle).unwrap();

        let other = adapter.clone();
        let joined = std::thread::spawn(move || other.current_transaction(false).unwrap().is_none())
            .join()
            .unwrap();
        assert!(joined, "a fresh thread starts with no current transaction");
        assert!(adapter.current_transaction(true).unwrap().is_some());
    }
}
