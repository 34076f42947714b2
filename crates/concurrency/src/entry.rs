//! Committed entries: the single authoritative value a store holds for a
//! key outside any transaction.

use jacis_core::TxId;

/// One key's committed state.
///
/// `version` only ever increases. `locked_for` is set between a
/// transaction's prepare and its commit/rollback — while set, every other
/// transaction sees this entry as stale. `tx_view_refcount` counts how many
/// live TX views were materialized from this entry; the entry can only be
/// dropped from the committed map once its value is gone, it is unlocked,
/// and the refcount is zero.
#[derive(Debug, Clone)]
pub struct CommittedEntry<CV> {
    value: Option<CV>,
    version: u64,
    updated_by_tx: Option<TxId>,
    updated_by_thread: Option<String>,
    locked_for: Option<TxId>,
    locked_for_thread: Option<String>,
    tx_view_refcount: u64,
}

impl<CV> CommittedEntry<CV> {
    /// A brand-new entry with no value and version 0 — what a key gets the
    /// first time any transaction materializes a TX view for it.
    pub fn empty() -> Self {
        CommittedEntry {
            value: None,
            version: 0,
            updated_by_tx: None,
            updated_by_thread: None,
            locked_for: None,
            locked_for_thread: None,
            tx_view_refcount: 0,
        }
    }

    /// An entry pre-populated outside any transaction, e.g. by
    /// `initStoreNonTransactional`. Starts at version 1, matching the
    /// version a transactional first write would leave behind.
    pub fn loaded(value: CV) -> Self {
        CommittedEntry {
            value: Some(value),
            version: 1,
            updated_by_tx: None,
            updated_by_thread: None,
            locked_for: None,
            locked_for_thread: None,
            tx_view_refcount: 0,
        }
    }

    /// The committed value, if any (`None` means the key is absent/tombstoned).
    pub fn value(&self) -> Option<&CV> {
        self.value.as_ref()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The transaction currently holding the prepare lock on this entry, if any.
    pub fn locked_for(&self) -> Option<TxId> {
        self.locked_for
    }

    /// Thread name of whoever holds the prepare lock, for diagnostics.
    pub fn locked_for_thread(&self) -> Option<&str> {
        self.locked_for_thread.as_deref()
    }

    /// Whether this entry is locked for a transaction other than `tx`.
    pub fn is_locked_for_other(&self, tx: TxId) -> bool {
        matches!(self.locked_for, Some(owner) if owner != tx)
    }

    /// Number of live TX views referencing this entry.
    pub fn refcount(&self) -> u64 {
        self.tx_view_refcount
    }

    /// True once this entry is safe to drop from the committed map: no
    /// value, unlocked, unreferenced.
    pub fn is_collectible(&self) -> bool {
        self.value.is_none() && self.locked_for.is_none() && self.tx_view_refcount == 0
    }

    /// Record that one more TX view now references this entry.
    pub fn incr_refcount(&mut self) {
        self.tx_view_refcount += 1;
    }

    /// Record that a TX view referencing this entry has been destroyed.
    pub fn decr_refcount(&mut self) {
        self.tx_view_refcount = self.tx_view_refcount.saturating_sub(1);
    }

    /// Install the prepare lock for `tx`, run while the store holds its
    /// write lock during prepare.
    pub fn lock_for(&mut self, tx: TxId, thread_name: impl Into<String>) {
        self.locked_for = Some(tx);
        self.locked_for_thread = Some(thread_name.into());
    }

    /// Release the prepare lock if it is currently held by `tx`. Releasing
    /// a lock held by someone else is a caller bug; it is a no-op here
    /// since the write lock already serializes callers.
    pub fn unlock_if_owned_by(&mut self, tx: TxId) {
        if self.locked_for == Some(tx) {
            self.locked_for = None;
            self.locked_for_thread = None;
        }
    }

    /// Apply a committed write: set `value`, bump the version, record the
    /// writer. Called once per updated entry during commit.
    pub fn write(&mut self, value: Option<CV>, tx: TxId, thread_name: impl Into<String>) {
        self.value = value;
        self.version += 1;
        self.updated_by_tx = Some(tx);
        self.updated_by_thread = Some(thread_name.into());
    }

    /// The transaction that last wrote this entry, if any.
    pub fn updated_by_tx(&self) -> Option<TxId> {
        self.updated_by_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_collectible() {
        let entry: CommittedEntry<i32> = CommittedEntry::empty();
        assert!(entry.is_collectible());
        assert_eq!(entry.version(), 0);
    }

    #[test]
    fn write_bumps_version_and_records_writer() {
        let mut entry: CommittedEntry<i32> = CommittedEntry::empty();
        let tx = TxId::next();
        entry.write(Some(42), tx, "worker-1");
        assert_eq!(entry.version(), 1);
        assert_eq!(entry.value(), Some(&42));
        assert_eq!(entry.updated_by_tx(), Some(tx));
        assert!(!entry.is_collectible());
    }

    #[test]
    fn tombstoned_unlocked_unreferenced_entry_is_collectible() {
        let mut entry: CommittedEntry<i32> = CommittedEntry::empty();
        let tx = TxId::next();
        entry.write(Some(1), tx, "t");
        entry.write(None, tx, "t");
        assert!(entry.is_collectible());
    }

    #[test]
    fn lock_excludes_other_transactions_only() {
        let mut entry: CommittedEntry<i32> = CommittedEntry::empty();
        let owner = TxId::next();
        let other = TxId::next();
        entry.lock_for(owner, "t1");
        assert!(!entry.is_locked_for_other(owner));
        assert!(entry.is_locked_for_other(other));
        entry.unlock_if_owned_by(other);
        assert!(entry.locked_for().is_some(), "unlock by non-owner is a no-op");
        entry.unlock_if_owned_by(owner);
        assert!(entry.locked_for().is_none());
    }

    #[test]
    fn refcount_gates_collectibility() {
        let mut entry: CommittedEntry<i32> = CommittedEntry::empty();
        entry.incr_refcount();
        assert!(!entry.is_collectible());
        entry.decr_refcount();
        assert!(entry.is_collectible());
        entry.decr_refcount();
        assert_eq!(entry.refcount(), 0, "decrementing past zero saturates");
    }
}
