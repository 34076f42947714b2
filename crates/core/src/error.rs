//! Error taxonomy for jacis.
//!
//! Each variant names the condition that triggers it. Listener failures
//! collected during commit are represented by [`Error::Aggregated`], which
//! keeps the first failure as the visible cause and the rest as context —
//! Rust has no "suppressed exceptions" list, so `Display` enumerates them.

use crate::types::TxId;
use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The full jacis error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation required an active transaction but none was bound to
    /// the calling thread (or `enforce=true` was passed to a lookup that
    /// found none).
    #[error("no transaction is active for this thread")]
    NoTransaction,

    /// Optimistic-lock violation detected at prepare: the committed version
    /// advanced past what this transaction observed, or another transaction
    /// holds the prepare lock on the entry.
    #[error(
        "stale object: key conflicts between {this_tx} (version {this_version}) and \
         {conflicting_tx} (committed version {committed_version})"
    )]
    StaleObject {
        /// Key that failed the stale check, rendered as text for display.
        key: String,
        /// The transaction that failed to commit.
        this_tx: TxId,
        /// The transaction currently holding the conflicting state, if known.
        conflicting_tx: Option<TxId>,
        /// Version this transaction's view was built from.
        this_version: u64,
        /// Version (or lock state) found in the committed entry at prepare.
        committed_version: u64,
        /// Thread that created `this_tx`'s view.
        this_thread: String,
        /// Thread that owns the conflicting state, if known.
        conflicting_thread: Option<String>,
    },

    /// A unique index key is already claimed by a different primary key, or
    /// has an outstanding prepare-time lock from another transaction.
    #[error(
        "unique index violation on index '{index_name}': key '{index_key}' already \
         owned by a different primary key"
    )]
    UniqueIndexViolation {
        /// Name of the unique index.
        index_name: String,
        /// The index key that collided, rendered as text.
        index_key: String,
        /// The primary key currently (or provisionally) owning `index_key`.
        existing_primary_key: String,
        /// The transaction that already claimed the key, if prepared.
        conflicting_tx: Option<TxId>,
    },

    /// A modification listener's `on_prepare_modification` rejected the
    /// change; the whole transaction is rolled back.
    #[error("modification vetoed during prepare: {0}")]
    ModificationVeto(String),

    /// A tracked view detected an inconsistent modification during commit.
    #[error("tracked view modification failed: {0}")]
    TrackedViewModification(String),

    /// A mutation was attempted on a transaction that has already prepared.
    #[error("transaction already prepared; no further mutation is permitted")]
    TxAlreadyPrepared,

    /// A modification listener raised an arbitrary error during commit.
    #[error("modification listener failed: {0}")]
    ModificationListenerError(String),

    /// The persistence adapter (external collaborator) reported a failure.
    #[error("persistence adapter failed: {0}")]
    PersistenceAdapterError(String),

    /// Several errors were collected during commit/rollback cleanup; the
    /// first is the effective cause, the rest are attached as context.
    #[error("commit failed with {} error(s); first: {first}", 1 + .rest.len())]
    Aggregated {
        /// The first error encountered; surfaced as the primary cause.
        #[source]
        first: Box<Error>,
        /// Any further errors collected after the first.
        rest: Vec<Error>,
    },

    /// Any other internal invariant violation not covered above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::Aggregated`] from a non-empty list of errors,
    /// preserving encounter order. Panics if `errors` is empty — callers
    /// are expected to check `is_empty()` first (the commit/rollback paths
    /// in `jacis-store` never call this on an empty vector).
    pub fn aggregate(mut errors: Vec<Error>) -> Error {
        assert!(!errors.is_empty(), "aggregate() requires at least one error");
        let first = errors.remove(0);
        if errors.is_empty() {
            first
        } else {
            Error::Aggregated {
                first: Box::new(first),
                rest: errors,
            }
        }
    }

    /// True for error kinds a caller may reasonably retry
    /// (`with_local_tx_and_retry` retries `StaleObject` specifically).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StaleObject { .. })
    }
}
