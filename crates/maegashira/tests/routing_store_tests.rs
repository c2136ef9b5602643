use maegashira::models::error::ProxyError;
use maegashira::models::route::{Route, Target};
use maegashira::services::routing_table::{RoutingTableStore, WorkerTable};
use std::sync::Arc;
use std::time::Duration;

fn forward_route(hostname: &str, url: &str) -> Route {
    Route {
        hostname: hostname.to_string(),
        path: String::new(),
        timeout_ms: None,
        middlewares: None,
        load_balancing: None,
        authentication: None,
        cache: None,
        targets: vec![Target::Forward {
            url: url.to_string(),
        }],
    }
}

fn invalid_route() -> Route {
    Route {
        hostname: String::new(),
        path: String::new(),
        timeout_ms: None,
        middlewares: None,
        load_balancing: None,
        authentication: None,
        cache: None,
        targets: vec![],
    }
}

#[test]
fn get_returns_empty_table_before_first_set() {
    let store = RoutingTableStore::new();
    assert!(store.get().is_empty());
    assert_eq!(store.version(), 0);
}

#[test]
fn set_then_get_returns_structurally_equal_table() {
    let store = RoutingTableStore::new();
    let table = vec![forward_route("localhost", "http://origin")];

    store.set(table.clone()).expect("table should be accepted");
    assert_eq!(*store.get(), table);
    assert_eq!(store.version(), 1);
}

#[test]
fn invalid_set_fails_and_leaves_current_table_unchanged() {
    let store = RoutingTableStore::new();
    let good = vec![forward_route("localhost", "http://origin")];
    store.set(good.clone()).expect("table should be accepted");

    let err = store.set(vec![invalid_route()]).unwrap_err();
    assert!(matches!(err, ProxyError::InvalidRoutingTable { .. }));
    assert_eq!(*store.get(), good);
    assert_eq!(store.version(), 1);
}

#[test]
fn consecutive_sets_of_the_same_table_are_idempotent_in_state() {
    let store = RoutingTableStore::new();
    let table = vec![forward_route("localhost", "http://origin")];

    store.set(table.clone()).expect("first set");
    store.set(table.clone()).expect("second set");

    assert_eq!(*store.get(), table);
    assert_eq!(store.version(), 2);
}

#[tokio::test]
async fn subscribers_receive_updates_in_order() {
    let store = RoutingTableStore::new();
    let mut updates = store.subscribe();

    store
        .set(vec![forward_route("one.example", "http://one")])
        .expect("first set");
    store
        .set(vec![forward_route("two.example", "http://two")])
        .expect("second set");

    let first = updates.recv().await.expect("first update");
    assert_eq!(first.version, 1);
    assert_eq!(first.table[0].hostname, "one.example");

    let second = updates.recv().await.expect("second update");
    assert_eq!(second.version, 2);
    assert_eq!(second.table[0].hostname, "two.example");
}

#[tokio::test]
async fn attached_worker_starts_from_the_current_snapshot() {
    let store = Arc::new(RoutingTableStore::new());
    store
        .set(vec![forward_route("localhost", "http://origin")])
        .expect("set before attach");

    let worker = WorkerTable::attach(Arc::clone(&store));
    assert_eq!(worker.load()[0].hostname, "localhost");
    assert_eq!(worker.version(), 1);
}

#[tokio::test]
async fn attached_worker_applies_broadcast_updates() {
    let store = Arc::new(RoutingTableStore::new());
    let worker = WorkerTable::attach(Arc::clone(&store));
    assert!(worker.load().is_empty());

    store
        .set(vec![forward_route("fresh.example", "http://fresh")])
        .expect("set after attach");

    // The update task runs on this runtime; yield until it applies.
    for _ in 0..50 {
        if !worker.load().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(worker.load()[0].hostname, "fresh.example");
    assert_eq!(worker.version(), 1);
}

#[tokio::test]
async fn in_flight_snapshot_is_unaffected_by_a_swap() {
    let store = Arc::new(RoutingTableStore::new());
    store
        .set(vec![forward_route("old.example", "http://old")])
        .expect("initial set");

    let worker = WorkerTable::attach(Arc::clone(&store));
    let captured = worker.load();

    store
        .set(vec![forward_route("new.example", "http://new")])
        .expect("replacement set");

    assert_eq!(captured[0].hostname, "old.example");
    assert_eq!(store.get()[0].hostname, "new.example");
}
