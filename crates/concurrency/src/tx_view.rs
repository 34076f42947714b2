//! Per-transaction views: a transaction's private workspace over one store.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use jacis_core::TxId;

use crate::entry::CommittedEntry;

/// A transaction's private clone of one entry.
///
/// `orig_version` is the committed version observed when this view was
/// created; it is the baseline the stale check compares against at
/// prepare. `orig_value` is only populated when the owning store tracks
/// original values (required for dirty checking, modification listeners,
/// indexes, and tracked views).
#[derive(Debug, Clone)]
pub struct EntryTxView<TV> {
    orig_version: u64,
    orig_value: Option<TV>,
    tx_value: Option<TV>,
    updated_seq: Option<u64>,
}

impl<TV> EntryTxView<TV> {
    /// Materialize a fresh view at `orig_version`, with `tx_value` already
    /// cloned from committed state by the caller (via the store's
    /// `ObjectAdapter`).
    pub fn new(orig_version: u64, orig_value: Option<TV>, tx_value: Option<TV>) -> Self {
        EntryTxView {
            orig_version,
            orig_value,
            tx_value,
            updated_seq: None,
        }
    }

    /// The committed version this view was built from.
    pub fn orig_version(&self) -> u64 {
        self.orig_version
    }

    /// The value as it was at `orig_version`, if tracked.
    pub fn orig_value(&self) -> Option<&TV> {
        self.orig_value.as_ref()
    }

    /// The transaction's current value for this key (`None` = staged deletion).
    pub fn tx_value(&self) -> Option<&TV> {
        self.tx_value.as_ref()
    }

    /// Mutable access to the transaction's current value, used by
    /// `switchToReadOnlyModeInPrepare` to toggle a value's read-only mode in
    /// place after it has been locked at prepare.
    pub fn tx_value_mut(&mut self) -> Option<&mut TV> {
        self.tx_value.as_mut()
    }

    /// Whether this entry has been explicitly updated (via `update`/`remove`)
    /// or marked updated by a dirty check.
    pub fn is_updated(&self) -> bool {
        self.updated_seq.is_some()
    }

    /// The sequence number assigned when this entry was marked updated,
    /// used to replay writes at commit in program order.
    pub fn updated_seq(&self) -> Option<u64> {
        self.updated_seq
    }

    /// Replace the TX value and mark this entry updated with `seq`. A
    /// repeated `update` call on the same entry keeps its original
    /// `updated_seq` (first-write-wins for ordering purposes) while still
    /// replacing the value.
    pub fn set_tx_value(&mut self, value: Option<TV>, seq: u64) {
        self.tx_value = value;
        if self.updated_seq.is_none() {
            self.updated_seq = Some(seq);
        }
    }

    /// Mark this entry updated without changing its value — used by the
    /// dirty checker when it detects an in-place mutation.
    pub fn mark_updated(&mut self, seq: u64) {
        if self.updated_seq.is_none() {
            self.updated_seq = Some(seq);
        }
    }

    /// Whether this view is stale against `committed`: the committed
    /// version has advanced past what this view observed, or the entry is
    /// locked for a transaction other than `self_tx`.
    pub fn is_stale<CV>(&self, committed: &CommittedEntry<CV>, self_tx: TxId) -> bool {
        committed.version() > self.orig_version || committed.is_locked_for_other(self_tx)
    }

    /// Replace this view's TX value with the read-only projection of
    /// committed state, discarding any staged update. Used by `refresh`.
    pub fn reset_to(&mut self, orig_version: u64, orig_value: Option<TV>, tx_value: Option<TV>) {
        self.orig_version = orig_version;
        self.orig_value = orig_value;
        self.tx_value = tx_value;
        self.updated_seq = None;
    }
}

/// Per-transaction, per-store bookkeeping.
///
/// Owns the transaction's entry views, its optimistic read-locks, and the
/// state flags that gate whether mutation is still legal. Entries are only
/// ever inserted while the owning store holds its read lock (materializing
/// a view reads committed state, so at minimum a reader's lock is needed).
pub struct StoreTxView<K, TV> {
    tx_id: TxId,
    creation_ts_ms: u64,
    entries: HashMap<K, EntryTxView<TV>>,
    commit_pending: bool,
    invalidation_reason: Option<String>,
    read_only: bool,
    snapshot_source_tx_id: Option<String>,
    optimistic_locks: HashMap<K, u64>,
    next_update_seq: AtomicU64,
}

impl<K, TV> StoreTxView<K, TV>
where
    K: Eq + Hash + Clone,
{
    /// Create a fresh, empty, writable view for `tx_id`.
    pub fn new(tx_id: TxId, creation_ts_ms: u64) -> Self {
        StoreTxView {
            tx_id,
            creation_ts_ms,
            entries: HashMap::new(),
            commit_pending: false,
            invalidation_reason: None,
            read_only: false,
            snapshot_source_tx_id: None,
            optimistic_locks: HashMap::new(),
            next_update_seq: AtomicU64::new(0),
        }
    }

    /// Create a read-only view projected from another transaction's
    /// snapshot, for handing a consistent read-only context to another
    /// thread. Read-only views never accept writes.
    pub fn new_read_only_snapshot(tx_id: TxId, creation_ts_ms: u64, source_tx_id: impl Into<String>) -> Self {
        let mut view = Self::new(tx_id, creation_ts_ms);
        view.read_only = true;
        view.snapshot_source_tx_id = Some(source_tx_id.into());
        view
    }

    /// This view's transaction id.
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Creation timestamp in milliseconds since the Unix epoch.
    pub fn creation_ts_ms(&self) -> u64 {
        self.creation_ts_ms
    }

    /// True once this view is no longer writable — either explicitly
    /// read-only, commit-pending, or invalidated.
    pub fn is_writable(&self) -> bool {
        !self.read_only && !self.commit_pending && self.invalidation_reason.is_none()
    }

    /// Whether this view is a read-only snapshot.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether prepare has run for this view.
    pub fn is_commit_pending(&self) -> bool {
        self.commit_pending
    }

    /// Mark this view commit-pending. Idempotent: calling it twice is a
    /// caller bug but this type does not enforce single-call since the
    /// store layer already guards against double-prepare.
    pub fn set_commit_pending(&mut self) {
        self.commit_pending = true;
    }

    /// Current invalidation reason, if this view has been invalidated
    /// (e.g. the store was cleared while this transaction was active).
    pub fn invalidation_reason(&self) -> Option<&str> {
        self.invalidation_reason.as_deref()
    }

    /// Mark this view invalidated; prepare/commit become no-ops afterward.
    pub fn invalidate(&mut self, reason: impl Into<String>) {
        self.invalidation_reason = Some(reason.into());
    }

    /// Borrow the entry view for `key`, if materialized.
    pub fn get(&self, key: &K) -> Option<&EntryTxView<TV>> {
        self.entries.get(key)
    }

    /// Mutably borrow the entry view for `key`, if materialized.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut EntryTxView<TV>> {
        self.entries.get_mut(key)
    }

    /// Materialize `view` for `key`, replacing any existing view.
    pub fn insert(&mut self, key: K, view: EntryTxView<TV>) {
        self.entries.insert(key, view);
    }

    /// Drop the entry view for `key` entirely (used by `refresh`, which
    /// re-reads from committed state on next access).
    pub fn remove_view(&mut self, key: &K) -> Option<EntryTxView<TV>> {
        self.entries.remove(key)
    }

    /// Iterate all materialized entry views.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &EntryTxView<TV>)> {
        self.entries.iter()
    }

    /// Iterate all materialized entry views, in ascending `updated_seq`
    /// order among those that are updated (unordered/unupdated entries are
    /// not yielded). This is the iteration order prepare and commit use to
    /// process updated entries (program order within the transaction).
    pub fn updated_in_seq_order(&self) -> Vec<(&K, &EntryTxView<TV>)> {
        let mut updated: Vec<(&K, &EntryTxView<TV>)> =
            self.entries.iter().filter(|(_, v)| v.is_updated()).collect();
        updated.sort_by_key(|(_, v)| v.updated_seq().expect("filtered to updated entries"));
        updated
    }

    /// Allocate the next per-transaction update sequence number.
    pub fn next_update_seq(&self) -> u64 {
        self.next_update_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Record an optimistic (read-only) lock on `key` at `version`, checked
    /// again at prepare.
    pub fn record_optimistic_lock(&mut self, key: K, version: u64) {
        self.optimistic_locks.entry(key).or_insert(version);
    }

    /// All optimistic locks recorded by `lockReadOnly` calls.
    pub fn optimistic_locks(&self) -> impl Iterator<Item = (&K, &u64)> {
        self.optimistic_locks.iter()
    }

    /// Every key this view holds (or may hold, pending prepare) a committed
    /// lock for: the union of materialized entry views and keys recorded
    /// only via `record_optimistic_lock` (i.e. read via `lockReadOnly` but
    /// never updated/materialized). `prepare` locks every key in this set;
    /// `commit`/`rollback` must unlock the same set, or a `lockReadOnly`-only
    /// key is left permanently locked after the transaction ends.
    pub fn locked_keys(&self) -> HashSet<K> {
        self.entries
            .keys()
            .cloned()
            .chain(self.optimistic_locks.keys().cloned())
            .collect()
    }

    /// Number of materialized entry views, for diagnostics/tests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry views have been materialized.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_call_fixes_updated_seq() {
        let mut view: EntryTxView<i32> = EntryTxView::new(0, Some(1), Some(1));
        assert!(!view.is_updated());
        view.set_tx_value(Some(2), 5);
        assert_eq!(view.updated_seq(), Some(5));
        view.set_tx_value(Some(3), 9);
        assert_eq!(view.updated_seq(), Some(5), "updated_seq is first-write-wins");
        assert_eq!(view.tx_value(), Some(&3), "value still replaces on later writes");
    }

    #[test]
    fn stale_when_committed_version_advanced() {
        let view: EntryTxView<i32> = EntryTxView::new(3, Some(1), Some(1));
        let self_tx = TxId::next();
        let mut committed: CommittedEntry<i32> = CommittedEntry::empty();
        committed.write(Some(1), self_tx, "t");
        committed.write(Some(2), self_tx, "t");
        committed.write(Some(3), self_tx, "t");
        assert!(!view.is_stale(&committed, self_tx), "version 3 == orig_version 3");
        committed.write(Some(4), self_tx, "t");
        assert!(view.is_stale(&committed, self_tx));
    }

    #[test]
    fn stale_when_locked_by_other_tx() {
        let view: EntryTxView<i32> = EntryTxView::new(0, None, None);
        let self_tx = TxId::next();
        let other_tx = TxId::next();
        let mut committed: CommittedEntry<i32> = CommittedEntry::empty();
        committed.lock_for(other_tx, "t2");
        assert!(view.is_stale(&committed, self_tx));
        committed.unlock_if_owned_by(other_tx);
        committed.lock_for(self_tx, "t1");
        assert!(!view.is_stale(&committed, self_tx), "locked by self is not stale");
    }

    #[test]
    fn updated_in_seq_order_is_program_order() {
        let mut store: StoreTxView<&'static str, i32> = StoreTxView::new(TxId::next(), 0);
        store.insert("a", EntryTxView::new(0, None, Some(1)));
        store.insert("b", EntryTxView::new(0, None, Some(2)));
        store.insert("c", EntryTxView::new(0, None, Some(3)));
        let seq_b = store.next_update_seq();
        store.get_mut(&"b").unwrap().set_tx_value(Some(20), seq_b);
        let seq_a = store.next_update_seq();
        store.get_mut(&"a").unwrap().set_tx_value(Some(10), seq_a);
        let ordered: Vec<&str> = store.updated_in_seq_order().into_iter().map(|(k, _)| *k).collect();
        assert_eq!(ordered, vec!["b", "a"]);
    }

    #[test]
    fn writability_gates_on_read_only_commit_pending_and_invalidation() {
        let mut view: StoreTxView<&'static str, i32> = StoreTxView::new(TxId::next(), 0);
        assert!(view.is_writable());
        view.set_commit_pending();
        assert!(!view.is_writable());

        let mut invalidated: StoreTxView<&'static str, i32> = StoreTxView::new(TxId::next(), 0);
        invalidated.invalidate("store cleared");
        assert!(!invalidated.is_writable());
        assert_eq!(invalidated.invalidation_reason(), Some("store cleared"));

        let snapshot: StoreTxView<&'static str, i32> =
            StoreTxView::new_read_only_snapshot(TxId::next(), 0, "tx#1");
        assert!(snapshot.is_read_only());
        assert!(!snapshot.is_writable());
    }
}
