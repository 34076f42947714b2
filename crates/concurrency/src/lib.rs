//! Committed-entry and transaction-view bookkeeping for jacis stores.
//!
//! This crate holds the per-entry and per-transaction data structures a
//! store's two-phase demarcation operates over: [`entry::CommittedEntry`]
//! (the authoritative value plus version/lock bookkeeping) and
//! [`tx_view::EntryTxView`] / [`tx_view::StoreTxView`] (one transaction's
//! private workspace). The algorithms that drive prepare/commit/rollback
//! live in `jacis-store`, which composes these types with a concurrent map
//! and a readers-writer lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod tx_view;

pub use entry::CommittedEntry;
pub use tx_view::{EntryTxView, StoreTxView};
