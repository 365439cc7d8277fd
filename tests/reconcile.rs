//! Reconciliation behavior of pools and interfaces against the mock host

use std::collections::BTreeSet;

use beacon_transients::mock::{MockAdapter, MockSystem};
use beacon_transients::{Category, ResourceName, TransientPool, TransientSet};

mod common;
use common::names;

fn services_pool(system: &MockSystem) -> TransientPool<MockAdapter> {
    TransientPool::new("services", system.adapter(Category::Services))
}

fn add_all(system: &MockSystem, list: &[&str]) {
    for name in list {
        system.add(Category::Services, name, "Trigger");
    }
}

fn request_all(pool: &mut TransientPool<MockAdapter>, list: &[&str]) {
    for name in list {
        pool.request(*name, serde_json::Value::Null);
    }
}

#[test]
fn empty_update_changes_nothing() {
    let system = MockSystem::new();
    add_all(&system, &["a", "b"]);
    let mut pool = services_pool(&system);
    request_all(&mut pool, &["a"]);
    pool.reconcile(pool.list_current_names());
    let before = pool.exposed_names();

    let report = pool.update(&BTreeSet::new(), &BTreeSet::new());

    assert!(!report.has_changes());
    assert_eq!(pool.exposed_names(), before);
}

#[test]
fn only_requested_and_available_is_exposed() {
    let system = MockSystem::new();
    add_all(&system, &["a", "b"]);
    let mut pool = services_pool(&system);
    request_all(&mut pool, &["b", "c"]);

    pool.reconcile(pool.list_current_names());

    assert_eq!(pool.exposed_names(), names(&["b"]));
    assert_eq!(system.live(Category::Services), names(&["b"]));
}

#[test]
fn vanished_name_is_cleaned_but_stays_requested() {
    let system = MockSystem::new();
    add_all(&system, &["a", "b"]);
    let mut pool = services_pool(&system);
    request_all(&mut pool, &["b"]);
    pool.reconcile(pool.list_current_names());
    assert!(pool.exposed_names().contains("b"));

    system.remove(Category::Services, "b");
    let snapshot = pool.list_current_names();
    assert_eq!(snapshot, names(&["a"]));

    let changes = pool.change_detect(&snapshot);
    assert_eq!(changes.gone, names(&["b"]));
    let diff = pool.change_diff(&changes);
    assert_eq!(diff.to_remove, names(&["b"]));

    let pass = pool.reconcile(snapshot);
    assert_eq!(pass.update.removed, names(&["b"]));
    assert!(pool.exposed_names().is_empty());
    assert!(pool.requested_names().contains("b"));
    assert!(system.live(Category::Services).is_empty());

    // comes back: exposed again without a new request
    system.add(Category::Services, "b", "Trigger");
    pool.reconcile(pool.list_current_names());
    assert_eq!(pool.exposed_names(), names(&["b"]));
}

#[test]
fn diff_update_exposes_requested_and_available() {
    let system = MockSystem::new();
    let mut pool = services_pool(&system);
    request_all(&mut pool, &["b", "c", "d"]);

    add_all(&system, &["a", "b"]);
    let snapshot_a = pool.list_current_names();
    pool.reconcile(snapshot_a.clone());

    add_all(&system, &["c"]);
    system.remove(Category::Services, "b");
    let snapshot_b = pool.list_current_names();

    let changes = pool.change_detect(&snapshot_b);
    let appeared: BTreeSet<ResourceName> = snapshot_b.difference(&snapshot_a).cloned().collect();
    let gone: BTreeSet<ResourceName> = snapshot_a.difference(&snapshot_b).cloned().collect();
    assert_eq!(changes.appeared, appeared);
    assert_eq!(changes.gone, gone);

    let diff = pool.change_diff(&changes);
    pool.update(&diff.to_add, &diff.to_remove);

    let requested_and_available: BTreeSet<ResourceName> = pool
        .requested_names()
        .intersection(&snapshot_b)
        .cloned()
        .collect();
    let exposed_and_available: BTreeSet<ResourceName> = pool
        .exposed_names()
        .intersection(&snapshot_b)
        .cloned()
        .collect();
    assert_eq!(exposed_and_available, requested_and_available);
    assert_eq!(pool.exposed_names(), names(&["c"]));
}

#[test]
fn pattern_exposure_is_applied_on_next_pass() {
    let system = MockSystem::new();
    add_all(&system, &["/cam/left", "/cam/right", "/imu"]);
    let mut pool = services_pool(&system);
    pool.reconcile(pool.list_current_names());

    let matched = pool.expose_by_pattern("^/cam/").unwrap();
    assert_eq!(matched, names(&["/cam/left", "/cam/right"]));
    // declaring interest constructs nothing
    assert!(pool.exposed_names().is_empty());

    pool.reconcile(pool.list_current_names());
    assert_eq!(pool.exposed_names(), matched);
}

#[test]
fn invalid_pattern_is_an_error() {
    let system = MockSystem::new();
    let mut pool = services_pool(&system);
    assert!(pool.expose_by_pattern("(unclosed").is_err());
}

#[test]
fn exposed_stays_within_requested_or_available() {
    let system = MockSystem::new();
    let mut pool = services_pool(&system);
    request_all(&mut pool, &["a", "c", "e"]);

    let steps: [(&[&str], &[&str]); 6] = [
        (&["a", "b"], &[]),
        (&["c"], &["a"]),
        (&["a", "d", "e"], &[]),
        (&[], &["c", "e"]),
        (&["b"], &["a", "d"]),
        (&[], &["b"]),
    ];

    for (add, remove) in steps {
        add_all(&system, add);
        for name in remove {
            system.remove(Category::Services, name);
        }
        let snapshot = pool.list_current_names();
        let changes = pool.change_detect(&snapshot);
        let diff = pool.change_diff(&changes);
        pool.reconcile(snapshot);
        // a direct update on top of the pass must not break the invariant either
        pool.update(&diff.to_add, &names(&[]));

        let allowed: BTreeSet<ResourceName> = pool
            .requested_names()
            .union(&pool.list_available())
            .cloned()
            .collect();
        assert!(pool.exposed_names().is_subset(&allowed));
        assert_eq!(system.live(Category::Services), pool.exposed_names());
    }
}

#[test]
fn construction_failure_is_retried_next_pass() {
    let system = MockSystem::new();
    add_all(&system, &["ok", "flaky"]);
    system.fail_construction(Category::Services, "flaky", true);
    let mut pool = services_pool(&system);
    request_all(&mut pool, &["ok", "flaky"]);

    let pass = pool.reconcile(pool.list_current_names());
    assert_eq!(pass.update.added, names(&["ok"]));
    assert!(pass.update.failures.contains_key("flaky"));

    system.fail_construction(Category::Services, "flaky", false);
    let pass = pool.reconcile(pool.list_current_names());
    assert_eq!(pass.update.added, names(&["flaky"]));
    assert!(pass.update.is_clean());
}

#[test]
fn failed_remake_leaves_exposed_resource_alive() {
    let system = MockSystem::new();
    add_all(&system, &["/s"]);
    let mut pool = services_pool(&system);
    request_all(&mut pool, &["/s"]);
    pool.reconcile(pool.list_current_names());

    system.fail_construction(Category::Services, "/s", true);
    let resource_type = pool.resolve_type("/s").unwrap();
    assert!(pool.make("/s", &resource_type, &serde_json::json!(1)).is_err());

    assert_eq!(pool.exposed_names(), names(&["/s"]));
    assert_eq!(system.live(Category::Services), names(&["/s"]));
    assert_eq!(pool.get("/s").map(|r| r.args.clone()), Some(serde_json::Value::Null));

    system.fail_construction(Category::Services, "/s", false);
    pool.make("/s", &resource_type, &serde_json::json!(1)).unwrap();
    assert_eq!(pool.get("/s").map(|r| r.args.clone()), Some(serde_json::json!(1)));
    assert_eq!(system.live(Category::Services), names(&["/s"]));
}

#[test]
fn interface_reconciles_all_categories_in_one_tick() {
    let system = MockSystem::new();
    system.add(Category::Publishers, "/chatter", "std_msgs/String");
    system.add(Category::Subscribers, "/cmd_vel", "geometry_msgs/Twist");
    system.add(Category::Params, "/rate", "int");
    let mut interface = system.interface();
    interface.reconcile_all();

    for category in [Category::Publishers, Category::Subscribers, Category::Params] {
        interface.expose(category, ".*").unwrap();
    }
    let report = interface.reconcile_all();

    assert!(report.has_changes());
    assert_eq!(report.passes.len(), 4);
    assert_eq!(interface.exposed_names(Category::Publishers), names(&["/chatter"]));
    assert_eq!(interface.exposed_names(Category::Subscribers), names(&["/cmd_vel"]));
    assert_eq!(interface.exposed_names(Category::Params), names(&["/rate"]));
    assert!(interface.exposed_names(Category::Services).is_empty());

    assert_eq!(interface.shutdown(), 3);
    assert!(system.live(Category::Params).is_empty());
}

#[test]
fn dropping_the_interface_destroys_resources() {
    let system = MockSystem::new();
    system.add(Category::Services, "/srv", "Trigger");
    {
        let mut interface = system.interface();
        interface.services_mut().request("/srv", serde_json::Value::Null);
        interface.reconcile_all();
        assert_eq!(system.live(Category::Services), names(&["/srv"]));
    }
    assert!(system.live(Category::Services).is_empty());
}
