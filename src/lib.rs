//! # jacis
//!
//! An in-memory, transactional, multi-version object store with ACI
//! (Atomicity, Consistency, Isolation) semantics — no durability in the
//! core. A [`Container`] owns a set of typed stores; transactions span
//! every store in a container at once.
//!
//! Each store presents committed state merged with a private per-transaction
//! view: readers see a consistent snapshot, writers stage changes that
//! become visible to everyone only at commit, optimistic concurrency control
//! catches conflicting writers at prepare time, and secondary indexes plus
//! materialized "tracked views" stay current automatically.
//!
//! # Quick start
//!
//! ```
//! use jacis::{Container, with_local_tx};
//!
//! let container = Container::new();
//! let accounts = container.create_store(Container::identity_spec::<String, i64>("accounts"));
//!
//! with_local_tx(&container, "open account", |tx| {
//!     accounts.update(tx.handle(), &"alice".to_string(), Some(100))
//! }).unwrap();
//!
//! let check = container.begin_local_transaction("read").unwrap();
//! assert_eq!(accounts.get_read_only(check.handle(), &"alice".to_string()), Some(100));
//! ```
//!
//! # Architecture
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `jacis-core` | Error taxonomy, pluggable-collaborator traits, configuration |
//! | `jacis-concurrency` | Committed entries and per-transaction views (C1–C3) |
//! | `jacis-store` | The store engine: CRUD, streaming, indexes, tracked views, two-phase demarcation (C5–C7) |
//! | `jacis-api` | [`Container`], [`LocalTransaction`], transaction adapters (C8–C10) |
//!
//! This crate re-exports the full public surface so callers depend on
//! `jacis` alone; the sub-crates are implementation seams, not a stable
//! multi-crate API.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use jacis_api::{
    with_local_tx, with_local_tx_and_retry, Container, ExternalTransactionAdapter, LocalTransaction,
    LocalTransactionAdapter, RetryPolicy,
};
pub use jacis_concurrency::{entry, tx_view, CommittedEntry, EntryTxView, StoreTxView};
pub use jacis_core::config::ObjectTypeSpec;
pub use jacis_core::traits::{
    DirtyCheck, ModificationListener, ObjectAdapter, PersistenceAdapter, TransactionAdapter,
    TransactionListener,
};
pub use jacis_core::types::{StoreIdentifier, TransactionHandle, TxId};
pub use jacis_core::{Error, Result};
pub use jacis_store::index::{IndexMaintainer, IndexRegistry, MultiIndex, NonUniqueIndex, UniqueIndex};
pub use jacis_store::store::{Store, StoreDemarcation, StoreLock};
pub use jacis_store::tracked_view::{
    ClusteredTrackedView, TrackedView, TrackedViewMaintainer, TrackedViewRegistry,
};
