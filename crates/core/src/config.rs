//! Per-store configuration.

use std::sync::Arc;

use crate::traits::{DirtyCheck, ObjectAdapter, PersistenceAdapter};

/// Configuration for one store, supplied to `Container::create_store`.
///
/// Constructed with [`ObjectTypeSpec::new`] and refined with the builder
/// methods below, each of which consumes and returns `self` so call sites
/// read as a single chained expression.
pub struct ObjectTypeSpec<K, TV, CV> {
    name: String,
    object_adapter: Arc<dyn ObjectAdapter<TV, CV>>,
    track_original_value: bool,
    check_views_on_commit: bool,
    switch_to_read_only_mode_in_prepare: bool,
    sync_store_on_container_transaction: bool,
    dirty_check: Option<Arc<dyn DirtyCheck<K, TV>>>,
    persistence_adapter: Option<Arc<dyn PersistenceAdapter<K, TV>>>,
}

impl<K, TV, CV> ObjectTypeSpec<K, TV, CV> {
    /// Start a spec for a store named `name`, using `object_adapter` to
    /// convert between committed and TX-view value shapes. `name` is used
    /// only for diagnostics; stores are identified by `(K, TV)` type, not
    /// by name.
    pub fn new(name: impl Into<String>, object_adapter: Arc<dyn ObjectAdapter<TV, CV>>) -> Self {
        ObjectTypeSpec {
            name: name.into(),
            object_adapter,
            track_original_value: true,
            check_views_on_commit: false,
            switch_to_read_only_mode_in_prepare: false,
            sync_store_on_container_transaction: true,
            dirty_check: None,
            persistence_adapter: None,
        }
    }

    /// If false, modification listeners, tracked views, and indexes cannot
    /// be registered on the resulting store — there is no `orig_value` to
    /// drive them — though version-based stale detection still works.
    pub fn track_original_value(mut self, value: bool) -> Self {
        self.track_original_value = value;
        self
    }

    /// After each commit, invoke every registered tracked view's
    /// `check_view(all_values)` for consistency testing.
    pub fn check_views_on_commit(mut self, value: bool) -> Self {
        self.check_views_on_commit = value;
        self
    }

    /// At prepare, switch updated TX values into read-only mode, preventing
    /// accidental mutation from an `after_prepare` listener.
    pub fn switch_to_read_only_mode_in_prepare(mut self, value: bool) -> Self {
        self.switch_to_read_only_mode_in_prepare = value;
        self
    }

    /// Use the container-wide lock instead of this store's own lock during
    /// two-phase demarcation. Default true.
    pub fn sync_store_on_container_transaction(mut self, value: bool) -> Self {
        self.sync_store_on_container_transaction = value;
        self
    }

    /// Install a structural dirty checker, consulted during prepare for
    /// entries that were mutated in place without calling `update`.
    pub fn dirty_check(mut self, dirty_check: Arc<dyn DirtyCheck<K, TV>>) -> Self {
        self.dirty_check = Some(dirty_check);
        self
    }

    /// Install a persistence adapter.
    pub fn persistence_adapter(mut self, adapter: Arc<dyn PersistenceAdapter<K, TV>>) -> Self {
        self.persistence_adapter = Some(adapter);
        self
    }

    /// The store's diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured object adapter.
    pub fn object_adapter(&self) -> &Arc<dyn ObjectAdapter<TV, CV>> {
        &self.object_adapter
    }

    /// Whether original values are tracked on each TX-view entry.
    pub fn tracks_original_value(&self) -> bool {
        self.track_original_value
    }

    /// Whether tracked views are re-checked for consistency after commit.
    pub fn checks_views_on_commit(&self) -> bool {
        self.check_views_on_commit
    }

    /// Whether updated TX values switch to read-only mode during prepare.
    pub fn switches_to_read_only_mode_in_prepare(&self) -> bool {
        self.switch_to_read_only_mode_in_prepare
    }

    /// Whether this store participates in the container-wide lock.
    pub fn syncs_store_on_container_transaction(&self) -> bool {
        self.sync_store_on_container_transaction
    }

    /// The configured dirty checker, if any.
    pub fn dirty_checker(&self) -> Option<&Arc<dyn DirtyCheck<K, TV>>> {
        self.dirty_check.as_ref()
    }

    /// The configured persistence adapter, if any.
    pub fn persistence_adapter_ref(&self) -> Option<&Arc<dyn PersistenceAdapter<K, TV>>> {
        self.persistence_adapter.as_ref()
    }
}
