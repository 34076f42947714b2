//! One store's committed state, transaction views, indexes, and tracked
//! views, plus the two-phase prepare/commit/rollback executor that drives
//! them.
//!
//! A [`Container`](../jacis_api/struct.Container.html) owns one `Store` per
//! registered object type; this crate only concerns itself with a single
//! store in isolation.

pub mod index;
pub mod store;
pub mod tracked_view;

pub use index::{IndexMaintainer, IndexRegistry, MultiIndex, NonUniqueIndex, UniqueIndex};
pub use store::{Store, StoreDemarcation, StoreLock};
pub use tracked_view::{ClusteredTrackedView, TrackedView, TrackedViewMaintainer, TrackedViewRegistry};
