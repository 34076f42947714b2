//! End-to-end scenarios exercising a container across full transaction
//! lifecycles: commit/read, stale detection, retry, unique-index violation,
//! rollback garbage collection, and refresh-discards-changes.

use std::sync::Arc;
use std::thread;

use jacis::{Container, Error};

// ============================================================================
// Scenario A — Basic commit/read
// ============================================================================

#[test]
fn scenario_a_basic_commit_and_read() {
    let container = Container::new();
    let store = container.create_store(Container::identity_spec::<String, i64>("kv"));

    let tx1 = container.begin_local_transaction("tx1").unwrap();
    store.update(tx1.handle(), &"a".to_string(), Some(1)).unwrap();
    store.update(tx1.handle(), &"b".to_string(), Some(2)).unwrap();
    tx1.commit().unwrap();

    let tx2 = container.begin_local_transaction("tx2").unwrap();
    assert_eq!(store.get_read_only(tx2.handle(), &"a".to_string()), Some(1));
    assert_eq!(store.get_read_only(tx2.handle(), &"b".to_string()), Some(2));
    assert!(!store.contains(tx2.handle(), &"c".to_string()));
    tx2.rollback();
}

// ============================================================================
// Scenario B — Stale detection
// ============================================================================

#[test]
fn scenario_b_stale_detection() {
    let container = Container::new();
    let store = container.create_store(Container::identity_spec::<String, i64>("kv"));

    let tx0 = container.begin_local_transaction("seed").unwrap();
    store.update(tx0.handle(), &"a".to_string(), Some(0)).unwrap();
    tx0.commit().unwrap();

    let tx1 = container.begin_local_transaction("tx1").unwrap();
    assert_eq!(store.get(tx1.handle(), &"a".to_string()).unwrap(), Some(0));

    let tx2 = container.begin_local_transaction("tx2").unwrap();
    store.update(tx2.handle(), &"a".to_string(), Some(5)).unwrap();
    tx2.commit().unwrap();

    store.update(tx1.handle(), &"a".to_string(), Some(6)).unwrap();
    let result = tx1.commit();
    assert!(matches!(result, Err(Error::StaleObject { .. })));
}

// ============================================================================
// Scenario C — Retry
// ============================================================================

#[test]
fn scenario_c_retry_converges_under_contention() {
    let container = Container::new();
    let store = container.create_store(Container::identity_spec::<String, i64>("counters"));

    let tx0 = container.begin_local_transaction("seed").unwrap();
    store.update(tx0.handle(), &"a".to_string(), Some(10)).unwrap();
    tx0.commit().unwrap();

    let run = |container: Arc<jacis::Container>, store: Arc<jacis::Store<String, i64, i64>>| {
        jacis::with_local_tx_and_retry(&container, 10, "increment", move |tx| {
            let current = store.get(tx.handle(), &"a".to_string())?.unwrap();
            store.update(tx.handle(), &"a".to_string(), Some(current + 1))
        })
    };

    let c1 = container.clone();
    let s1 = store.clone();
    let c2 = container.clone();
    let s2 = store.clone();
    let t1 = thread::spawn(move || run(c1, s1));
    let t2 = thread::spawn(move || run(c2, s2));
    t1.join().unwrap().unwrap();
    t2.join().unwrap().unwrap();

    let check = container.begin_local_transaction("check").unwrap();
    assert_eq!(store.get_read_only(check.handle(), &"a".to_string()), Some(12));
}

// ============================================================================
// Scenario D — Unique index violation at prepare
// ============================================================================

#[derive(Clone, Debug)]
struct Widget {
    name: String,
}

#[test]
fn scenario_d_unique_index_violation_at_prepare() {
    let container = Container::new();
    let store = container.create_store(Container::identity_spec::<String, Widget>("widgets"));
    let by_name = store.create_unique_index("by_name", |w: &Widget| Some(w.name.clone())).unwrap();

    let tx1 = container.begin_local_transaction("tx1").unwrap();
    store
        .update(tx1.handle(), &"k1".to_string(), Some(Widget { name: "X".to_string() }))
        .unwrap();
    tx1.prepare().unwrap();

    let tx2 = container.begin_local_transaction("tx2").unwrap();
    store
        .update(tx2.handle(), &"k2".to_string(), Some(Widget { name: "X".to_string() }))
        .unwrap();
    let prepare_result = tx2.prepare();
    assert!(matches!(prepare_result, Err(Error::UniqueIndexViolation { .. })));
    tx2.rollback();

    tx1.commit().unwrap();

    let check = container.begin_local_transaction("check").unwrap();
    assert_eq!(
        store.get_read_only(check.handle(), &"k1".to_string()).map(|w| w.name),
        Some("X".to_string())
    );
    assert!(store.get_read_only(check.handle(), &"k2".to_string()).is_none());
    assert_eq!(by_name.lookup_committed(&"X".to_string()), Some("k1".to_string()));
    check.rollback();
}

// ============================================================================
// Scenario E — Rollback GC
// ============================================================================

#[test]
fn scenario_e_rollback_gc_leaves_no_committed_entry() {
    let container = Container::new();
    let store = container.create_store(Container::identity_spec::<String, i64>("kv"));

    let tx1 = container.begin_local_transaction("tx1").unwrap();
    assert_eq!(store.get(tx1.handle(), &"a".to_string()).unwrap(), None);
    tx1.rollback();

    let check = container.begin_local_transaction("check").unwrap();
    assert!(!store.contains(check.handle(), &"a".to_string()));
    assert_eq!(store.get(check.handle(), &"a".to_string()).unwrap(), None);
    check.rollback();
}

// ============================================================================
// Scenario F — Refresh discards changes
// ============================================================================

#[test]
fn scenario_f_refresh_discards_uncommitted_changes() {
    let container = Container::new();
    let store = container.create_store(Container::identity_spec::<String, i64>("kv"));

    let tx0 = container.begin_local_transaction("seed").unwrap();
    store.update(tx0.handle(), &"a".to_string(), Some(1)).unwrap();
    tx0.commit().unwrap();

    let tx1 = container.begin_local_transaction("tx1").unwrap();
    store.update(tx1.handle(), &"a".to_string(), Some(7)).unwrap();
    let refreshed = store.refresh(tx1.handle(), &"a".to_string()).unwrap();
    assert_eq!(refreshed, Some(1));
    tx1.commit().unwrap();

    let check = container.begin_local_transaction("check").unwrap();
    assert_eq!(store.get_read_only(check.handle(), &"a".to_string()), Some(1));
    check.rollback();
}
