//! Concurrency tests: every thread maps the region on its own, standing in
//! for a separate process

use std::{
    sync::{Arc, Barrier},
    thread,
};

use shmconf::{
    records::{
        builtin_registry, ComponentConfig, ComponentConfigKey, ComponentStatistics,
        ComponentStatisticsKey,
    },
    ConfigStore, RegionConfig, SchemaRegistry, SharedMemoryRegion, ShmConfError, StoreConfig,
};
use tempfile::TempDir;

fn setup(temp_dir: &TempDir, name: &str, size: usize) -> (ConfigStore, Arc<SchemaRegistry>) {
    let registry = Arc::new(builtin_registry().unwrap());
    let config = RegionConfig::new(name, size).with_file_path(temp_dir.path().join(name));
    let store = ConfigStore::create_with_registry(
        SharedMemoryRegion::create(config).unwrap(),
        StoreConfig::default(),
        Arc::clone(&registry),
    )
    .unwrap();
    (store, registry)
}

fn attach(path: &std::path::Path, name: &str, registry: &Arc<SchemaRegistry>) -> ConfigStore {
    let config = RegionConfig::open(name).with_file_path(path);
    ConfigStore::open_with_registry(
        SharedMemoryRegion::open(config).unwrap(),
        StoreConfig::default(),
        Arc::clone(registry),
    )
    .unwrap()
}

#[cfg(test)]
mod concurrent_tests {
    use super::*;

    /// Two claimants race to insert the same key into an empty table
    #[test]
    fn test_claim_race_has_one_winner() {
        for round in 0..20 {
            let temp_dir = TempDir::new().unwrap();
            let name = format!("race_{}", round);
            let (_owner, registry) = setup(&temp_dir, &name, 64 * 1024);
            let path = temp_dir.path().join(&name);
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|claimant| {
                    let path = path.clone();
                    let name = name.clone();
                    let registry = Arc::clone(&registry);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let store = attach(&path, &name, &registry);
                        let delay = 10.0 + claimant as f64;
                        barrier.wait();
                        let inserted = match store.insert(&ComponentConfig::new(1, 1, delay)) {
                            Ok(_) => true,
                            Err(ShmConfError::AlreadyExists { .. }) => false,
                            Err(e) => panic!("unexpected error: {}", e),
                        };
                        let seen = store
                            .lookup(&ComponentConfigKey {
                                component_type: 1,
                                category: 1,
                            })
                            .unwrap()
                            .get(ComponentConfig::DELAY);
                        (inserted, delay, seen)
                    })
                })
                .collect();

            let results: Vec<(bool, f64, f64)> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            let winners: Vec<_> = results.iter().filter(|r| r.0).collect();
            assert_eq!(winners.len(), 1, "round {}", round);
            let winning_delay = winners[0].1;
            for (_, _, seen) in &results {
                assert_eq!(*seen, winning_delay);
            }
        }
    }

    /// Many mappings inserting overlapping key ranges end with one slot per key
    #[test]
    fn test_overlapping_inserts_from_many_mappings() {
        let temp_dir = TempDir::new().unwrap();
        let (owner, registry) = setup(&temp_dir, "overlap", 256 * 1024);
        let path = temp_dir.path().join("overlap");
        let thread_count = 4;
        let barrier = Arc::new(Barrier::new(thread_count));

        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let path = path.clone();
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let store = attach(&path, "overlap", &registry);
                    barrier.wait();
                    let mut inserted = 0usize;
                    for id in 0..300 {
                        let (_, fresh) = store.insert_or_get(&ComponentStatistics::new(id)).unwrap();
                        if fresh {
                            inserted += 1;
                        }
                    }
                    inserted
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 300);
        assert_eq!(owner.len(), 300);
        assert_eq!(owner.keys().len(), 300);
    }

    /// Atomic counters never lose increments across mappings
    #[test]
    fn test_counter_increments_are_not_lost() {
        let temp_dir = TempDir::new().unwrap();
        let (owner, registry) = setup(&temp_dir, "counters", 64 * 1024);
        owner.insert(&ComponentStatistics::new(42)).unwrap();
        let path = temp_dir.path().join("counters");
        let thread_count = 4;
        let increments = 10_000u64;

        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let path = path.clone();
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let store = attach(&path, "counters", &registry);
                    let view = store.lookup(&ComponentStatisticsKey { id: 42 }).unwrap();
                    for _ in 0..increments {
                        view.fetch_add(ComponentStatistics::REF_COUNT, 1);
                        view.fetch_add_at(ComponentStatistics::COUNTERS, 1, 2);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let view = owner.lookup(&ComponentStatisticsKey { id: 42 }).unwrap();
        assert_eq!(
            view.get(ComponentStatistics::REF_COUNT),
            thread_count as u64 * increments
        );
        assert_eq!(
            view.get_at(ComponentStatistics::COUNTERS, 1),
            thread_count as u64 * increments * 2
        );
    }
}
