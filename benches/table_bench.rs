use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shmconf::{
    layout::TableLayout,
    records::{builtin_registry, ComponentConfig, ComponentStatistics, ComponentStatisticsKey},
    ConfigStore, RegionConfig, SharedMemoryRegion, StoreConfig,
};
use std::sync::Arc;
use tempfile::TempDir;

fn new_store(dir: &TempDir, name: &str, capacity: u32) -> ConfigStore {
    let registry = Arc::new(builtin_registry().unwrap());
    let size = TableLayout::required_region_size(registry.max_payload_size(), capacity);
    let config = RegionConfig::new(name, size)
        .with_file_path(dir.path().join(name))
        .with_cleanup_on_close(true);
    let region = SharedMemoryRegion::create(config).unwrap();
    ConfigStore::create_with_registry(region, StoreConfig::new().with_capacity(capacity), registry)
        .unwrap()
}

fn benchmark_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConfigStore_Insert");

    // Load factors of roughly 25%, 50% and 90%
    for &(capacity, count) in [(4099u32, 1024u32), (2039, 1024), (1151, 1024)].iter() {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("config_records", capacity),
            &(capacity, count),
            |b, &(capacity, count)| {
                let dir = TempDir::new().unwrap();
                let mut round = 0;
                b.iter(|| {
                    round += 1;
                    let store = new_store(&dir, &format!("insert_{}", round), capacity);
                    for i in 0..count {
                        store.insert(&ComponentConfig::new(i, 0, 5.0)).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("ConfigStore_Lookup");
    let dir = TempDir::new().unwrap();
    let store = new_store(&dir, "lookup", 1151);
    for id in 0..1024 {
        store.insert(&ComponentStatistics::new(id)).unwrap();
    }

    group.throughput(Throughput::Elements(1024));
    group.bench_function("hit", |b| {
        b.iter(|| {
            for id in 0..1024 {
                store.lookup(&ComponentStatisticsKey { id }).unwrap();
            }
        });
    });

    group.bench_function("miss", |b| {
        b.iter(|| {
            for id in 1024..2048 {
                assert!(!store.contains(&ComponentStatisticsKey { id }).unwrap());
            }
        });
    });

    group.finish();
}

fn benchmark_counter_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("RecordView_Counters");
    let dir = TempDir::new().unwrap();
    let store = new_store(&dir, "counters", 31);
    let view = store.insert(&ComponentStatistics::new(1)).unwrap();

    group.bench_function("fetch_add", |b| {
        b.iter(|| view.fetch_add(ComponentStatistics::REF_COUNT, 1));
    });

    group.bench_function("fetch_add_at", |b| {
        b.iter(|| view.fetch_add_at(ComponentStatistics::COUNTERS, 2, 1));
    });

    group.bench_function("read_snapshot", |b| {
        b.iter(|| view.read());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_insert,
    benchmark_lookup,
    benchmark_counter_updates
);
criterion_main!(benches);
