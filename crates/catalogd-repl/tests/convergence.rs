//! Leader/follower convergence through the edit journal.

use std::sync::Arc;

use catalogd_meta::property::{HIVE_METASTORE_URIS, METADATA_REFRESH_INTERVAL_SEC};
use catalogd_meta::{
    CatalogRegistry, CatalogType, Collaborators, CreateCatalogRequest, MemoryEditLog,
    RegistryConfig, RegistrySnapshot,
};
use catalogd_repl::{EditJournal, Follower, ReplError, ReplicationTracker};
use tempfile::TempDir;

fn hive(name: &str) -> CreateCatalogRequest {
    CreateCatalogRequest::new(name, CatalogType::Hms)
        .with_property(HIVE_METASTORE_URIS, "thrift://127.0.0.1:9083")
}

fn leader(journal: Arc<EditJournal>) -> CatalogRegistry {
    CatalogRegistry::new(
        RegistryConfig::default(),
        journal,
        Collaborators::in_memory(10_000),
    )
}

fn empty_follower(id: u64) -> Follower {
    let registry = CatalogRegistry::new(
        RegistryConfig::default(),
        Arc::new(MemoryEditLog::new()),
        Collaborators::in_memory(1),
    );
    Follower::new(id, Arc::new(registry))
}

fn same_state(a: &CatalogRegistry, b: &CatalogRegistry) -> bool {
    RegistrySnapshot::capture(a, || 0).catalogs == RegistrySnapshot::capture(b, || 0).catalogs
        && a.refresh_entries() == b.refresh_entries()
}

fn run_workload(registry: &CatalogRegistry) {
    registry.create(hive("hive1"), false).unwrap();
    registry.create(hive("hive2"), false).unwrap();
    registry
        .set_properties(
            "hive1",
            [(METADATA_REFRESH_INTERVAL_SEC.to_string(), "60".to_string())]
                .into_iter()
                .collect(),
        )
        .unwrap();
    registry.rename("hive2", "hive_archive").unwrap();
    registry.set_comment("hive_archive", "read only").unwrap();
    registry.initialize_catalog("hive1").unwrap();
}

#[tokio::test]
async fn test_follower_task_converges() {
    let journal = Arc::new(EditJournal::new(1_000));
    let leader = leader(journal.clone());

    let follower = empty_follower(1);
    let subscription = follower.subscribe(&journal).unwrap();
    let handle = tokio::spawn(follower.run(subscription));

    run_workload(&leader);
    leader.drop("hive_archive", false).unwrap();
    journal.close().unwrap();

    let follower = handle.await.unwrap().unwrap();
    assert_eq!(
        follower.cursor().last_applied,
        journal.latest_sequence().unwrap()
    );
    assert!(same_state(&leader, follower.registry()));
}

#[test]
fn test_restart_from_checkpoint() {
    let journal = Arc::new(EditJournal::new(1_000));
    let leader = leader(journal.clone());
    run_workload(&leader);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.snapshot");
    let checkpoint = journal.checkpoint(&leader).unwrap();
    assert_eq!(checkpoint.log_sequence, journal.latest_sequence().unwrap());
    checkpoint.write_to(&path).unwrap();

    leader.create(hive("hive3"), false).unwrap();
    leader.drop("hive1", false).unwrap();
    journal.compact_before(checkpoint.log_sequence + 1).unwrap();

    let snapshot = RegistrySnapshot::read_from(&path).unwrap();
    let mut follower = Follower::from_snapshot(
        2,
        &snapshot,
        RegistryConfig::default(),
        Arc::new(MemoryEditLog::new()),
        Collaborators::in_memory(1),
    )
    .unwrap();
    assert_eq!(follower.drain(&journal, 16).unwrap(), 2);
    assert!(same_state(&leader, follower.registry()));

    // A fresh follower cannot start from sequence 1 any more.
    let mut fresh = empty_follower(3);
    assert!(matches!(
        fresh.drain(&journal, 16),
        Err(ReplError::Lagged { .. })
    ));
}

#[test]
fn test_tracker_drives_compaction() {
    let journal = Arc::new(EditJournal::new(1_000));
    let leader = leader(journal.clone());
    let tracker = ReplicationTracker::new(journal.clone());

    let mut a = empty_follower(1);
    let mut b = empty_follower(2);
    tracker.register_follower(1, 0).unwrap();
    tracker.register_follower(2, 0).unwrap();

    run_workload(&leader);
    a.drain(&journal, 4).unwrap();
    tracker.acknowledge(1, a.cursor().last_applied).unwrap();
    assert_eq!(tracker.lag_for_follower(1).unwrap(), 0);
    assert_eq!(tracker.lag_for_follower(2).unwrap(), 6);

    assert_eq!(tracker.compact_acknowledged().unwrap(), 0);
    b.drain(&journal, 4).unwrap();
    tracker.acknowledge(2, b.cursor().last_applied).unwrap();
    assert_eq!(tracker.compact_acknowledged().unwrap(), 6);
    assert!(journal.is_empty().unwrap());
    assert!(same_state(a.registry(), b.registry()));
}
