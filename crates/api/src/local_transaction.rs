//! Local transaction handle (C9) and the `with_local_tx`/
//! `with_local_tx_and_retry` helpers built on top of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use jacis_core::types::TransactionHandle;
use jacis_core::{Error, Result};

use crate::container::Container;

/// A handle to a transaction managed entirely within this process — no
/// external coordinator involved. Owns no data beyond the handle itself;
/// every operation delegates to the owning [`Container`]'s two-phase
/// demarcation sweep across all registered stores.
pub struct LocalTransaction {
    container: Arc<Container>,
    handle: TransactionHandle,
    finished: AtomicBool,
}

impl LocalTransaction {
    pub(crate) fn new(container: Arc<Container>, handle: TransactionHandle) -> Self {
        LocalTransaction {
            container,
            handle,
            finished: AtomicBool::new(false),
        }
    }

    /// The transaction handle every store operation is keyed on.
    pub fn handle(&self) -> &TransactionHandle {
        &self.handle
    }

    /// Run prepare across every store in the owning container.
    pub fn prepare(&self) -> Result<()> {
        self.container.internal_prepare(&self.handle)
    }

    /// Commit across every store in the owning container (implicitly
    /// preparing any that have not yet prepared), then mark this handle
    /// finished. Calling `commit`/`rollback` again after this is a no-op at
    /// the store level (every store's own view is already destroyed) but is
    /// still guarded here so a caller cannot double-dispatch
    /// `TransactionListener` callbacks.
    pub fn commit(&self) -> Result<()> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.container.internal_commit(&self.handle)
    }

    /// Roll back across every store in the owning container. Never fails:
    /// every collaborator's rollback path in this workspace is infallible by
    /// construction (persistence-adapter rollback failures are logged by the
    /// store, not propagated — see `jacis_store::store::Store::rollback`).
    pub fn rollback(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.container.internal_rollback(&self.handle);
    }
}

impl Drop for LocalTransaction {
    /// A `LocalTransaction` dropped without an explicit `commit`/`rollback`
    /// is rolled back, so an abandoned handle never leaves locks held or a
    /// store's TX view dangling.
    fn drop(&mut self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            self.container.internal_rollback(&self.handle);
        }
    }
}

/// Run `task` in a fresh local transaction: commit on success, roll back on
/// any `Err`. The rollback itself cannot fail in this workspace (see
/// [`LocalTransaction::rollback`]), so unlike a coordinator where rollback
/// can itself throw, there is no secondary exception to chain — the
/// original error from `task` (or from `commit`) is always what callers see.
pub fn with_local_tx<R>(
    container: &Arc<Container>,
    description: impl Into<String>,
    task: impl FnOnce(&LocalTransaction) -> Result<R>,
) -> Result<R> {
    let tx = container.begin_local_transaction(description)?;
    match task(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback();
            Err(e)
        }
    }
}

/// A retry policy for [`with_local_tx_and_retry`] and
/// [`RetryPolicy::execute`]: how many attempts to make, how long to wait
/// between them, and which errors are worth retrying at all.
///
/// Grounded on the teacher's `RetryConfig`
/// (`strata-engine::database::transactions`), generalized from its
/// exponential-backoff-only policy to a caller-supplied delay and predicate,
/// matching spec.md §4.9's "configurable per-attempt delay and
/// predicate-driven retry policy".
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
    retry_if: Arc<dyn Fn(&Error) -> bool + Send + Sync>,
}

impl RetryPolicy {
    /// A policy making up to `max_attempts` attempts total (so
    /// `max_attempts - 1` retries after the first failure), with no delay
    /// between attempts, retrying only [`Error::is_retryable`] errors
    /// (i.e. [`Error::StaleObject`]).
    pub fn new(max_attempts: usize) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
            retry_if: Arc::new(Error::is_retryable),
        }
    }

    /// Wait `delay` between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the retry predicate. The default retries only
    /// [`Error::StaleObject`]; callers that also want to retry, say, a
    /// transient [`Error::UniqueIndexViolation`] can widen it here.
    pub fn with_retry_if(mut self, predicate: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Run `task` under this policy, retrying while the predicate accepts
    /// the error and attempts remain. Returns the last error once attempts
    /// are exhausted or the predicate rejects retrying it.
    pub fn execute<R>(
        &self,
        container: &Arc<Container>,
        description: impl Into<String> + Clone,
        task: impl Fn(&LocalTransaction) -> Result<R>,
    ) -> Result<R> {
        let mut attempt = 1usize;
        loop {
            match with_local_tx(container, description.clone(), &task) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && (self.retry_if)(&e) => {
                    warn!(attempt, error = %e, "local transaction retrying after stale/conflict error");
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `RetryPolicy::new(retries).execute(...)` — retries only
/// [`Error::StaleObject`], with no delay, up to `retries` total attempts.
pub fn with_local_tx_and_retry<R>(
    container: &Arc<Container>,
    retries: usize,
    description: impl Into<String> + Clone,
    task: impl Fn(&LocalTransaction) -> Result<R>,
) -> Result<R> {
    RetryPolicy::new(retries).execute(container, description, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn with_local_tx_commits_on_success() {
        let container = Container::new();
        let store = container.create_store(Container::identity_spec::<String, i64>("balances"));
        with_local_tx(&container, "deposit", |tx| {
            store.update(tx.handle(), &"alice".to_string(), Some(10))
        })
        .unwrap();

        let check = container.begin_local_transaction("check").unwrap();
        assert_eq!(store.get_read_only(check.handle(), &"alice".to_string()), Some(10));
    }

    #[test]
    fn with_local_tx_rolls_back_on_error() {
        let container = Container::new();
        let store = container.create_store(Container::identity_spec::<String, i64>("balances"));
        let result: Result<()> = with_local_tx(&container, "failing", |tx| {
            store.update(tx.handle(), &"alice".to_string(), Some(999))?;
            Err(Error::Internal("boom".into()))
        });
        assert!(result.is_err());

        let check = container.begin_local_transaction("check").unwrap();
        assert_eq!(store.get_read_only(check.handle(), &"alice".to_string()), None);
    }

    #[test]
    fn retry_policy_retries_stale_object_until_it_succeeds() {
        let container = Container::new();
        let store = container.create_store(Container::identity_spec::<String, i64>("counter"));
        with_local_tx(&container, "seed", |tx| store.update(tx.handle(), &"c".to_string(), Some(0))).unwrap();

        // Simulate one stale conflict: a concurrent committer bumps the
        // version between this task's read and its own commit, on the
        // first attempt only.
        let attempts = AtomicU64::new(0);
        let result = with_local_tx_and_retry(&container, 3, "increment", |tx| {
            let current = store.get(tx.handle(), &"c".to_string())?.unwrap_or(0);
            if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                // Force a stale conflict on the first attempt by committing
                // a concurrent change to the same key out from under `tx`.
                with_local_tx(&container, "interloper", |other| {
                    store.update(other.handle(), &"c".to_string(), Some(current + 100))
                })
                .unwrap();
            }
            store.update(tx.handle(), &"c".to_string(), Some(current + 1))
        });
        assert!(result.is_ok());
        assert!(attempts.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }
}
