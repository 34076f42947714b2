//! Transaction identity and store identity types.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonically increasing transaction counter, process-wide.
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Internal numeric identifier for a transaction.
///
/// Unique within a process. Used as the map key for per-store TX views
/// (`DashMap<TxId, StoreTxView<K, TV>>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub u64);

impl TxId {
    /// Allocate the next process-wide transaction id.
    pub fn next() -> Self {
        TxId(NEXT_TX_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Identifies a transaction to callers and collaborators.
///
/// Uniquely identifies a transaction; equality is by `external_tx_ref` when
/// both sides have one. Local transactions (no external coordinator) have
/// no `external_tx_ref`; those compare by `tx_id` instead, since two locally
/// created transactions are never the same transaction.
#[derive(Debug, Clone)]
pub struct TransactionHandle {
    /// Internal identifier, unique within this process.
    pub tx_id: TxId,
    /// Human-readable description (supplied by the caller at `begin`).
    pub description: String,
    /// Reference into the ambient (external) transaction coordinator, if any.
    pub external_tx_ref: Option<String>,
    /// Creation time, milliseconds since the Unix epoch.
    pub creation_ts_ms: u64,
}

impl TransactionHandle {
    /// Create a new local transaction handle with a fresh [`TxId`].
    pub fn new_local(description: impl Into<String>) -> Self {
        TransactionHandle {
            tx_id: TxId::next(),
            description: description.into(),
            external_tx_ref: None,
            creation_ts_ms: now_ms(),
        }
    }

    /// Create a handle bound to an external transaction reference.
    pub fn new_external(description: impl Into<String>, external_tx_ref: impl Into<String>) -> Self {
        TransactionHandle {
            tx_id: TxId::next(),
            description: description.into(),
            external_tx_ref: Some(external_tx_ref.into()),
            creation_ts_ms: now_ms(),
        }
    }
}

impl PartialEq for TransactionHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.external_tx_ref, &other.external_tx_ref) {
            (Some(a), Some(b)) => a == b,
            _ => self.tx_id == other.tx_id,
        }
    }
}

impl Eq for TransactionHandle {}

impl Hash for TransactionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.external_tx_ref {
            Some(r) => r.hash(state),
            None => self.tx_id.hash(state),
        }
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tx_id, self.description)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Identifies a store within a container by its key and transaction-view
/// value types.
///
/// Equality of a `StoreIdentifier` is by (key-type, value-type): two stores
/// with the same `K`/`TV` pair are the same store. Rust has no structural
/// type-level registry to look up by a key/value type pair directly, so this wraps
/// `TypeId` — the closest stable per-type fingerprint the language offers —
/// alongside human-readable type names for `Display`/diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct StoreIdentifier {
    key_type: TypeId,
    value_type: TypeId,
    key_type_name: &'static str,
    value_type_name: &'static str,
}

impl StoreIdentifier {
    /// Build the identifier for a store keyed by `K` with TX-view value `TV`.
    pub fn of<K: 'static, TV: 'static>() -> Self {
        StoreIdentifier {
            key_type: TypeId::of::<K>(),
            value_type: TypeId::of::<TV>(),
            key_type_name: type_name::<K>(),
            value_type_name: type_name::<TV>(),
        }
    }
}

impl PartialEq for StoreIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.key_type == other.key_type && self.value_type == other.value_type
    }
}

impl Eq for StoreIdentifier {}

impl Hash for StoreIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_type.hash(state);
        self.value_type.hash(state);
    }
}

impl fmt::Display for StoreIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store<{}, {}>", self.key_type_name, self.value_type_name)
    }
}
