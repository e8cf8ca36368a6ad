//! End-to-end scenarios against a real [`PartitionManager`] over a tempdir.

use shardvec::config::ManagerConfig;
use shardvec::id::VectorId;
use shardvec::partition::{CreatePartitionOptions, PartitionManager, SearchOptions};

fn manager(capacity: u64) -> (tempfile::TempDir, PartitionManager) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = ManagerConfig::new(dir.path());
    config.partition_capacity = capacity;
    let mut db = PartitionManager::new(config);
    db.initialize().expect("initialize");
    (dir, db)
}

#[test]
fn partition_rolls_over_and_old_partition_stays_searchable() {
    let (_dir, mut db) = manager(2);

    let (first_partition, _) = db.add_vector(None, vec![0.0, 0.0], None).unwrap();
    db.add_vector(None, vec![0.1, 0.1], None).unwrap();
    // Third insert exceeds the 2-vector capacity, forcing rollover.
    let (second_partition, _) = db.add_vector(None, vec![9.0, 9.0], None).unwrap();

    assert_ne!(first_partition, second_partition);
    assert_eq!(db.partition_ids().len(), 2);

    let hits = db.find_nearest(&[0.05, 0.05], 2, &SearchOptions::default());
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().any(|(pid, _, _)| *pid == first_partition));

    db.close().unwrap();
}

#[test]
fn clustered_search_prefers_the_nearby_cluster() {
    let (_dir, mut db) = manager(1_000);

    for v in [[0.0, 0.0], [0.1, 0.0], [0.0, 0.1]] {
        db.add_vector(None, v.to_vec(), None).unwrap();
    }
    for v in [[50.0, 50.0], [50.1, 50.0], [50.0, 50.1]] {
        db.add_vector(None, v.to_vec(), None).unwrap();
    }

    let hits = db.find_nearest(&[50.05, 50.0], 1, &SearchOptions::default());
    assert_eq!(hits.len(), 1);
    let vector = db.get_vector(&hits[0].1).expect("vector present");
    assert!(vector[0] > 10.0);

    db.close().unwrap();
}

#[test]
fn deleting_a_vector_removes_it_from_future_results() {
    let (_dir, mut db) = manager(1_000);
    let (_partition, id) = db.add_vector(None, vec![1.0, 1.0], None).unwrap();
    db.add_vector(None, vec![5.0, 5.0], None).unwrap();

    assert!(db.delete_vector(&id).unwrap());
    assert!(db.get_vector(&id).is_none());

    let hits = db.find_nearest(&[1.0, 1.0], 10, &SearchOptions::default());
    assert!(!hits.iter().any(|(_, hit_id, _)| hit_id == &id));

    db.close().unwrap();
}

#[test]
fn building_the_hnsw_index_makes_find_nearest_hnsw_return_hits() {
    let (_dir, mut db) = manager(1_000);
    for i in 0..20u64 {
        db.add_vector(Some(VectorId::Int(i)), vec![i as f32, 0.0], None)
            .unwrap();
    }

    db.build_index_hnsw(None, None).expect("build index");
    let hits = db
        .find_nearest_hnsw(&[0.0, 0.0], 3, &SearchOptions::default())
        .expect("search");
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().any(|(_, id, _)| *id == VectorId::Int(0)));

    db.close().unwrap();
}

#[test]
fn evicting_a_resident_partition_does_not_lose_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = ManagerConfig::new(dir.path());
    config.partition_capacity = 1;
    config.max_active_partitions = 1;
    let mut db = PartitionManager::new(config);
    db.initialize().expect("initialize");

    let (first_partition, first_id) = db.add_vector(None, vec![1.0], None).unwrap();
    // Forces rollover to a second partition, evicting the first from the
    // bounded-size resident cache.
    let (second_partition, _) = db.add_vector(None, vec![2.0], None).unwrap();
    assert_ne!(first_partition, second_partition);

    db.set_active_partition(&first_partition).unwrap();
    assert_eq!(db.get_vector(&first_id), Some(vec![1.0]));

    db.close().unwrap();
}

#[test]
fn reopening_a_closed_manager_recovers_every_vector() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_path_buf();

    let id = {
        let mut db = PartitionManager::new(ManagerConfig::new(&path));
        db.initialize().unwrap();
        let (_, id) = db.add_vector(None, vec![3.0, 4.0], None).unwrap();
        db.close().unwrap();
        id
    };

    let mut db = PartitionManager::new(ManagerConfig::new(&path));
    db.initialize().unwrap();
    assert_eq!(db.get_vector(&id), Some(vec![3.0, 4.0]));
    db.close().unwrap();
}

#[test]
fn explicit_partition_creation_without_activation_leaves_it_inert() {
    let (_dir, mut db) = manager(1_000);
    db.create_partition(
        "archive",
        "Archive",
        CreatePartitionOptions {
            set_active: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert_ne!(db.active_partition_id(), Some("archive"));
    assert!(db.partition_ids().contains(&"archive".to_string()));

    db.close().unwrap();
}
