//! The caller-facing surface of jacis: [`Container`] (C8), [`LocalTransaction`]
//! (C9), and the transaction-adapter implementations (C10).
//!
//! Everything a caller needs to create stores, begin/commit/rollback
//! transactions, and register cross-store collaborators lives here;
//! `jacis-core` and `jacis-store` define the collaborator traits and the
//! per-store engine this crate composes into one system.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod async_dispatch;
pub mod container;
pub mod local_transaction;
pub mod transaction_adapter;

pub use container::Container;
pub use local_transaction::{with_local_tx, with_local_tx_and_retry, LocalTransaction, RetryPolicy};
pub use transaction_adapter::{ExternalTransactionAdapter, LocalTransactionAdapter};
