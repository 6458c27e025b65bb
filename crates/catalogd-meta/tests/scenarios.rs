//! End-to-end registry scenarios: leader DDL, follower replay, event races.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use common::{hive, Fixture, SHARED_RESOURCE};

use catalogd_meta::collab::IdAllocator;
use catalogd_meta::property::{
    Properties, HIVE_METASTORE_URIS, METADATA_REFRESH_INTERVAL_SEC,
};
use catalogd_meta::{
    CatalogError, CatalogId, CatalogLog, CatalogOp, CatalogRegistry, Collaborators,
    LifecycleState, MemoryEditLog, RefreshEntry, RegistryConfig, Timestamp,
};

fn props(pairs: &[(&str, &str)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_create_lookup_and_if_not_exists() {
    let f = Fixture::new();
    let id = f.registry.create(hive("hive1"), false).unwrap();

    let c = f.registry.catalog_by_name("hive1").unwrap();
    assert_eq!(c.id(), id);
    assert_eq!(c.lifecycle_state(), LifecycleState::Uninitialized);

    assert!(matches!(
        f.registry.create(hive("hive1"), false),
        Err(CatalogError::AlreadyExists(_))
    ));
    let before = f.state();
    assert_eq!(f.registry.create(hive("hive1"), true).unwrap(), id);
    assert_eq!(f.state(), before);
    assert_eq!(f.log.len(), 1);
}

#[test]
fn test_refresh_entry_follows_properties_and_drop() {
    let f = Fixture::new();
    let id = f.registry.create(hive("hive1"), false).unwrap();
    f.registry
        .set_properties("hive1", props(&[(METADATA_REFRESH_INTERVAL_SEC, "60")]))
        .unwrap();
    assert_eq!(
        f.registry.refresh_entries(),
        vec![RefreshEntry {
            catalog_id: id,
            interval_secs: 60
        }]
    );

    f.registry.drop("hive1", false).unwrap();
    assert!(matches!(
        f.registry.catalog_by_name("hive1"),
        Err(CatalogError::CatalogNotFound(_))
    ));
    assert!(f.registry.refresh_entries().is_empty());
}

#[test]
fn test_register_existing_database_is_noop() {
    let f = Fixture::new();
    f.registry.create(hive("hive1"), false).unwrap();
    f.registry.register_external_database("hive1", "db1", false).unwrap();
    f.registry.register_external_database("hive1", "db1", false).unwrap();

    let c = f.registry.catalog_by_name("hive1").unwrap();
    assert_eq!(c.external_state().unwrap().database_names(), vec!["db1".to_string()]);
}

#[test]
fn test_duplicate_create_delivery_is_ignored() {
    let f = Fixture::new();
    f.registry.create(hive("hive1"), false).unwrap();
    f.registry.set_comment("hive1", "after create").unwrap();
    let create = f.log.records()[0].clone();

    let before = f.state();
    f.registry.replay(&create).unwrap();
    assert_eq!(f.state(), before);
    assert_eq!(f.registry.catalog_by_name("hive1").unwrap().comment(), "after create");
}

#[test]
fn test_drop_replay_is_idempotent() {
    let leader = Fixture::new();
    leader
        .registry
        .create(hive("hive1").with_resource(SHARED_RESOURCE), false)
        .unwrap();
    leader.registry.create(hive("hive2"), false).unwrap();
    leader.registry.drop("hive1", false).unwrap();
    let records = leader.log.records();
    let drop = records.last().unwrap().clone();

    let once = Fixture::new();
    for r in &records {
        once.registry.replay(r).unwrap();
    }
    let twice = Fixture::new();
    for r in &records {
        twice.registry.replay(r).unwrap();
    }
    twice.registry.replay(&drop).unwrap();
    twice.registry.replay(&drop).unwrap();

    assert_eq!(once.state(), twice.state());
    assert_eq!(twice.resources.reference_count(SHARED_RESOURCE), 0);
}

#[test]
fn test_invalid_properties_roll_back() {
    let f = Fixture::new();
    f.registry.create(hive("hive1"), false).unwrap();
    let before = f.registry.catalog_by_name("hive1").unwrap().properties().clone();
    let records_before = f.log.len();

    for bad in [
        props(&[(METADATA_REFRESH_INTERVAL_SEC, "-5")]),
        props(&[(HIVE_METASTORE_URIS, "")]),
        props(&[("type", "jdbc")]),
    ] {
        let err = f.registry.set_properties("hive1", bad).unwrap_err();
        assert!(matches!(err, CatalogError::ValidationFailed { .. }), "{:?}", err);
        assert_eq!(
            f.registry.catalog_by_name("hive1").unwrap().properties(),
            &before
        );
    }
    assert_eq!(f.log.len(), records_before);
    assert!(f.registry.refresh_entries().is_empty());
}

#[test]
fn test_internal_catalog_cannot_be_dropped_or_renamed() {
    let f = Fixture::new();
    f.registry.create(hive("hive1"), false).unwrap();
    let before = f.state();

    assert!(matches!(
        f.registry.drop("internal", false),
        Err(CatalogError::Unsupported { .. })
    ));
    assert!(matches!(
        f.registry.drop("internal", true),
        Err(CatalogError::Unsupported { .. })
    ));
    assert!(matches!(
        f.registry.rename("internal", "x"),
        Err(CatalogError::Unsupported { .. })
    ));
    assert!(matches!(
        f.registry.set_properties("internal", props(&[("k", "v")])),
        Err(CatalogError::Unsupported { .. })
    ));
    assert!(matches!(
        f.registry.rename("hive1", "internal"),
        Err(CatalogError::AlreadyExists(_))
    ));

    assert_eq!(f.state(), before);
    assert_eq!(f.log.len(), 1);
}

#[test]
fn test_replayed_drop_of_internal_is_rejected() {
    let f = Fixture::new();
    let before = f.state();
    let record = CatalogLog::new(CatalogId::INTERNAL, CatalogOp::Drop);
    assert!(matches!(
        f.registry.replay(&record),
        Err(CatalogError::InconsistentReplay { .. })
    ));
    assert_eq!(f.state(), before);
}

#[test]
fn test_follower_converges_with_leader() {
    let leader = Fixture::new();
    leader
        .registry
        .create(hive("hive1").with_resource(SHARED_RESOURCE), false)
        .unwrap();
    leader.registry.create(hive("hive2"), false).unwrap();
    leader.registry.rename("hive1", "hive_prod").unwrap();
    leader.registry.set_comment("hive_prod", "prod").unwrap();
    leader
        .registry
        .set_properties("hive2", props(&[(METADATA_REFRESH_INTERVAL_SEC, "300")]))
        .unwrap();
    leader.registry.initialize_catalog("hive2").unwrap();
    leader.registry.drop("hive2", false).unwrap();

    let follower = Fixture::new();
    for r in leader.log.records() {
        follower.registry.replay(&r).unwrap();
    }
    assert_eq!(follower.state(), leader.state());
    assert_eq!(
        follower.resources.references(SHARED_RESOURCE),
        leader.resources.references(SHARED_RESOURCE)
    );
    assert!(follower.registry.indexes_consistent());
}

#[test]
fn test_event_racing_drop_is_harmless() {
    let f = Fixture::new();
    f.registry.create(hive("hive1"), false).unwrap();
    f.registry.register_external_database("hive1", "db1", false).unwrap();
    f.registry
        .register_external_table("hive1", "db1", "t1", Timestamp::now(), false)
        .unwrap();
    f.registry.drop("hive1", false).unwrap();

    f.registry.unregister_external_table("hive1", "db1", "t1", true).unwrap();
    f.registry.unregister_external_database("hive1", "db1", true).unwrap();
    f.registry
        .add_external_partitions("hive1", "db1", "t1", &["p=1".to_string()], Timestamp::now(), true)
        .unwrap();
    assert!(matches!(
        f.registry.unregister_external_database("hive1", "db1", false),
        Err(CatalogError::CatalogNotFound(_))
    ));
}

#[test]
fn test_follower_allocates_past_replayed_ids() {
    let leader = Fixture::new();
    let first = leader.registry.create(hive("hive1"), false).unwrap();

    let follower = Fixture::new();
    for r in leader.log.records() {
        follower.registry.replay(&r).unwrap();
    }
    let second = follower.registry.create(hive("hive2"), false).unwrap();
    assert!(second > first);
    assert_eq!(follower.registry.catalog_by_name("hive2").unwrap().id(), second);
    assert_eq!(follower.registry.catalog_by_name("hive1").unwrap().id(), first);
    assert!(follower.registry.indexes_consistent());
}

struct FixedIds(i64);

impl IdAllocator for FixedIds {
    fn next_id(&self) -> i64 {
        self.0
    }
}

#[test]
fn test_create_refuses_live_id() {
    let log = Arc::new(MemoryEditLog::new());
    let mut collab = Collaborators::in_memory(10_000);
    collab.ids = Arc::new(FixedIds(10_000));
    let registry = CatalogRegistry::new(RegistryConfig::default(), log.clone(), collab);

    registry.create(hive("hive1"), false).unwrap();
    assert!(matches!(
        registry.create(hive("hive2"), false),
        Err(CatalogError::InconsistentReplay { .. })
    ));
    assert!(registry.catalog_by_name("hive2").is_err());
    assert_eq!(registry.catalog_by_name("hive1").unwrap().id(), CatalogId::new(10_000));
    assert_eq!(log.len(), 1);
}

#[test]
fn test_concurrent_create_same_name() {
    const THREADS: usize = 8;
    let f = Fixture::new();
    let barrier = Barrier::new(THREADS);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    f.registry.create(hive("hive_race"), false)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(created.len(), 1);
    for r in &results {
        if let Err(e) = r {
            assert!(matches!(e, CatalogError::AlreadyExists(_)), "unexpected error {e:?}");
        }
    }
    assert_eq!(f.log.len(), 1);
    assert_eq!(f.registry.catalog_by_name("hive_race").unwrap().id(), *created[0]);
    assert!(f.registry.indexes_consistent());
}

#[test]
fn test_readers_see_consistent_indexes_during_writes() {
    const READERS: usize = 4;
    const ROUNDS: usize = 200;
    let f = Fixture::new();
    let barrier = Barrier::new(READERS + 2);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let writers: Vec<_> = ["west", "east"]
            .into_iter()
            .map(|prefix| {
                let (f, barrier) = (&f, &barrier);
                s.spawn(move || {
                    let (from, to) = (format!("{prefix}_a"), format!("{prefix}_b"));
                    barrier.wait();
                    for _ in 0..ROUNDS {
                        f.registry.create(hive(&from), false).unwrap();
                        f.registry.rename(&from, &to).unwrap();
                        f.registry.drop(&to, false).unwrap();
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let (f, barrier, done) = (&f, &barrier, &done);
                s.spawn(move || {
                    barrier.wait();
                    while !done.load(Ordering::Acquire) {
                        assert!(f.registry.indexes_consistent());
                        for c in f.registry.list() {
                            if let Ok(found) = f.registry.catalog_by_name(c.name()) {
                                assert_eq!(found.name(), c.name());
                            }
                        }
                    }
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }
        done.store(true, Ordering::Release);
        for r in readers {
            r.join().unwrap();
        }
    });

    assert_eq!(f.log.len(), 2 * ROUNDS * 3);
    assert!(f.registry.catalog_by_name("west_b").is_err());
    assert!(f.registry.indexes_consistent());
}

fn external_db(f: &Fixture, catalog: &str, db: &str) -> Arc<catalogd_meta::ExternalDatabase> {
    f.registry
        .catalog_by_name(catalog)
        .unwrap()
        .external_state()
        .unwrap()
        .database(db)
        .unwrap()
}

#[test]
fn test_initialize_database_replicates() {
    let leader = Fixture::new();
    leader.registry.create(hive("hive1"), false).unwrap();
    leader.registry.register_external_database("hive1", "db1", false).unwrap();
    leader.registry.initialize_database("hive1", "db1").unwrap();
    assert!(external_db(&leader, "hive1", "db1").is_initialized());

    // Already initialized: no second record.
    leader.registry.initialize_database("hive1", "db1").unwrap();
    let records = leader.log.records();
    assert_eq!(records.len(), 2);
    let db_id = external_db(&leader, "hive1", "db1").id();
    assert_eq!(records[1].op, CatalogOp::InitDb { db_id });

    let follower = Fixture::new();
    follower.registry.replay(&records[0]).unwrap();
    follower.registry.register_external_database("hive1", "db1", false).unwrap();
    assert!(!external_db(&follower, "hive1", "db1").is_initialized());
    follower.registry.replay(&records[1]).unwrap();
    assert!(external_db(&follower, "hive1", "db1").is_initialized());
}

#[test]
fn test_init_db_replay_without_target_is_noop() {
    let leader = Fixture::new();
    leader.registry.create(hive("hive1"), false).unwrap();
    leader.registry.register_external_database("hive1", "db1", false).unwrap();
    leader.registry.initialize_database("hive1", "db1").unwrap();
    let records = leader.log.records();

    // Catalog present, database never registered locally.
    let follower = Fixture::new();
    follower.registry.replay(&records[0]).unwrap();
    let before = follower.state();
    follower.registry.replay(&records[1]).unwrap();
    assert_eq!(follower.state(), before);

    // Catalog absent entirely.
    let empty = Fixture::new();
    let before = empty.state();
    empty.registry.replay(&records[1]).unwrap();
    assert_eq!(empty.state(), before);
}

#[test]
fn test_initialize_database_missing_targets() {
    let f = Fixture::new();
    f.registry.create(hive("hive1"), false).unwrap();
    assert!(matches!(
        f.registry.initialize_database("hive1", "nope"),
        Err(CatalogError::DatabaseNotFound { .. })
    ));
    assert!(matches!(
        f.registry.initialize_database("gone", "db1"),
        Err(CatalogError::CatalogNotFound(_))
    ));
    assert!(matches!(
        f.registry.initialize_database("internal", "db1"),
        Err(CatalogError::Unsupported { .. })
    ));
    assert_eq!(f.log.len(), 1);
}
