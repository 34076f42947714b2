//! Core types and traits for jacis
//!
//! This crate defines the foundations shared by every other crate in the
//! workspace:
//! - [`types::TxId`] / [`types::TransactionHandle`]: transaction identity
//! - [`types::StoreIdentifier`]: identifies a store by its `(K, TV)` types
//! - [`error::Error`]: the full error taxonomy (stale objects, index
//!   violations, vetoes, ...)
//! - [`traits`]: the pluggable-collaborator interfaces (`ObjectAdapter`,
//!   `ModificationListener`, `TransactionListener`, `DirtyCheck`,
//!   `TransactionAdapter`, `PersistenceAdapter`)
//! - [`config::ObjectTypeSpec`]: per-store configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{
    DirtyCheck, ModificationListener, ObjectAdapter, PersistenceAdapter, TransactionAdapter,
    TransactionListener,
};
pub use types::{StoreIdentifier, TransactionHandle, TxId};
