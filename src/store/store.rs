//! The public configuration store

use std::collections::HashSet;
use std::fmt;
use std::mem::offset_of;
use std::ptr::addr_of_mut;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::error::{Result, ShmConfError};
use crate::layout::{
    init_state, SchemaDirectoryEntry, TableHeader, TableLayout, LAYOUT_VERSION,
    MAX_SCHEMAS, SCHEMA_DIRECTORY_OFFSET, SCHEMA_ENTRY_SIZE, SHMCONF_MAGIC, SLOTS_OFFSET,
};
use crate::memory::{RegionConfig, SharedMemoryRegion};
use crate::record::{global_registry, Record, RecordKey, RecordKeySource, RecordView, SchemaRegistry};
use crate::table::wait::SpinWait;
use crate::table::{is_valid_capacity, SlotClaim, SlotTable};

use super::config::StoreConfig;
use super::stats::TableStats;

/// Shared key/value store of typed records inside one mapped region.
///
/// Holds no state of its own beyond the mapping: every process builds a
/// fresh store over the same region and sees the same records.
pub struct ConfigStore {
    table: SlotTable,
    region: Arc<SharedMemoryRegion>,
    registry: Arc<SchemaRegistry>,
    usable: HashSet<u32>,
    config: StoreConfig,
}

impl ConfigStore {
    /// Lay out a new table in a freshly created region, using the global
    /// registry
    pub fn create(region: SharedMemoryRegion, config: StoreConfig) -> Result<Self> {
        Self::create_with_registry(region, config, global_registry()?)
    }

    /// Attach to a table another process laid out, using the global registry
    pub fn open(region: SharedMemoryRegion, config: StoreConfig) -> Result<Self> {
        Self::open_with_registry(region, config, global_registry()?)
    }

    /// Create the region described by `region_config` and lay out a table
    /// in it, using the global registry
    pub fn create_new(region_config: RegionConfig, config: StoreConfig) -> Result<Self> {
        Self::create_new_with_registry(region_config, config, global_registry()?)
    }

    /// Create a region and lay out a table for the schemas in `registry`.
    ///
    /// The store config and layout are checked before the region exists. If
    /// the table still cannot be laid out, the backing file is removed again
    /// so the same name can be created later.
    pub fn create_new_with_registry(
        region_config: RegionConfig,
        config: StoreConfig,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        Self::plan_layout(region_config.size, &config, &registry)?;

        let keep_on_close = region_config.cleanup_on_close;
        let region = SharedMemoryRegion::create(region_config.with_cleanup_on_close(true))?;
        let store = Self::create_with_registry(region, config, registry)?;
        store.region.set_cleanup_on_close(keep_on_close);
        Ok(store)
    }

    /// Lay out a new table for the schemas in `registry`.
    ///
    /// The region must be zeroed and not yet hold a table.
    pub fn create_with_registry(
        region: SharedMemoryRegion,
        config: StoreConfig,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        let layout = Self::plan_layout(region.size(), &config, &registry)?;

        let init = region.atomic_u32(offset_of!(TableHeader, init_state))?;
        if init
            .compare_exchange(
                init_state::UNINITIALIZED,
                init_state::INITIALIZING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ShmConfError::region_exists(region.name()));
        }

        let header = region.base_ptr().as_ptr() as *mut TableHeader;
        // SAFETY: we won the initialization CAS; nobody reads the header or
        // directory until READY is published below.
        unsafe {
            addr_of_mut!((*header).magic).write(SHMCONF_MAGIC);
            addr_of_mut!((*header).version).write(LAYOUT_VERSION);
            addr_of_mut!((*header).capacity).write(layout.capacity);
            addr_of_mut!((*header).slot_size).write(layout.slot_size);
            addr_of_mut!((*header).payload_size).write(layout.payload_size);
            addr_of_mut!((*header).schema_count).write(registry.len() as u32);
            addr_of_mut!((*header).slots_offset).write(layout.slots_offset as u64);
            addr_of_mut!((*header).region_size).write(layout.region_size as u64);
            addr_of_mut!((*header).creator_pid).write(std::process::id());
            addr_of_mut!((*header).created_at).write(unix_time());

            for (i, schema) in registry.iter().enumerate() {
                let entry = region
                    .base_ptr()
                    .as_ptr()
                    .add(SCHEMA_DIRECTORY_OFFSET + i * SCHEMA_ENTRY_SIZE)
                    as *mut SchemaDirectoryEntry;
                entry.write(schema.directory_entry());
            }
        }
        init.store(init_state::READY, Ordering::Release);

        debug!(
            "Created table in region '{}': {} slots of {} bytes, {} schemas",
            region.name(),
            layout.capacity,
            layout.slot_size,
            registry.len()
        );

        let usable = registry.iter().map(|s| s.type_id).collect();
        Ok(Self::assemble(region, layout, registry, usable, config))
    }

    /// Attach to an existing table, checking that every schema both sides
    /// know has the same layout
    pub fn open_with_registry(
        region: SharedMemoryRegion,
        config: StoreConfig,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        if region.size() < SLOTS_OFFSET {
            return Err(ShmConfError::invalid_layout(format!(
                "region of {} bytes cannot hold a table",
                region.size()
            )));
        }

        let init = region.atomic_u32(offset_of!(TableHeader, init_state))?;
        let mut wait = SpinWait::new(config.claim_timeout);
        while init.load(Ordering::Acquire) != init_state::READY {
            if !wait.pause() {
                return Err(ShmConfError::concurrency(format!(
                    "region '{}' was not initialized within {:?}",
                    region.name(),
                    config.claim_timeout
                )));
            }
        }

        // SAFETY: READY was observed with Acquire; the header is immutable now.
        let header = unsafe { &*(region.base_ptr().as_ptr() as *const TableHeader) };
        header.validate()?;
        let layout = Self::layout_from_header(header, region.size())?;

        if let Some(requested) = config.capacity {
            if requested != layout.capacity {
                return Err(ShmConfError::invalid_parameter(
                    "capacity",
                    format!(
                        "region holds {} slots, {} requested",
                        layout.capacity, requested
                    ),
                ));
            }
        }

        let usable = Self::check_directory(&region, header, &registry)?;

        debug!(
            "Opened table in region '{}': {} slots, {} occupied, {} of {} local schemas usable",
            region.name(),
            layout.capacity,
            header.occupied(),
            usable.len(),
            registry.len()
        );

        Ok(Self::assemble(region, layout, registry, usable, config))
    }

    fn plan_layout(
        region_size: usize,
        config: &StoreConfig,
        registry: &SchemaRegistry,
    ) -> Result<TableLayout> {
        config.validate()?;
        if registry.is_empty() {
            return Err(ShmConfError::invalid_parameter(
                "registry",
                "At least one record schema must be registered",
            ));
        }
        if region_size < SLOTS_OFFSET {
            return Err(ShmConfError::invalid_parameter(
                "size",
                format!(
                    "region of {} bytes is smaller than the table header",
                    region_size
                ),
            ));
        }
        TableLayout::compute(region_size, registry.max_payload_size(), config.capacity)
    }

    fn assemble(
        region: SharedMemoryRegion,
        layout: TableLayout,
        registry: Arc<SchemaRegistry>,
        usable: HashSet<u32>,
        config: StoreConfig,
    ) -> Self {
        let region = Arc::new(region);
        // SAFETY: the layout was checked against the region size, the mapping
        // is page aligned, and `region` is kept alive alongside the table.
        let table = unsafe { SlotTable::new(region.base_ptr(), layout, config.claim_timeout) };
        Self {
            table,
            region,
            registry,
            usable,
            config,
        }
    }

    fn layout_from_header(header: &TableHeader, mapped: usize) -> Result<TableLayout> {
        let layout = TableLayout {
            capacity: header.capacity,
            slot_size: header.slot_size,
            payload_size: header.payload_size,
            slots_offset: header.slots_offset as usize,
            region_size: header.region_size as usize,
        };

        if !is_valid_capacity(layout.capacity) {
            return Err(ShmConfError::invalid_layout(format!(
                "capacity {} is not a prime congruent to 3 mod 4",
                layout.capacity
            )));
        }
        if layout.slot_size as usize != TableLayout::slot_size_for(layout.payload_size as usize) {
            return Err(ShmConfError::invalid_layout(format!(
                "slot size {} does not fit payload size {}",
                layout.slot_size, layout.payload_size
            )));
        }
        if layout.slots_offset != SLOTS_OFFSET {
            return Err(ShmConfError::invalid_layout(format!(
                "slots start at {}, expected {}",
                layout.slots_offset, SLOTS_OFFSET
            )));
        }
        if layout.end_offset() > mapped || layout.region_size > mapped {
            return Err(ShmConfError::invalid_layout(format!(
                "table needs {} bytes but only {} are mapped",
                layout.end_offset().max(layout.region_size),
                mapped
            )));
        }
        Ok(layout)
    }

    fn check_directory(
        region: &SharedMemoryRegion,
        header: &TableHeader,
        registry: &SchemaRegistry,
    ) -> Result<HashSet<u32>> {
        let count = header.schema_count as usize;
        if count > MAX_SCHEMAS {
            return Err(ShmConfError::invalid_layout(format!(
                "schema directory claims {} entries",
                count
            )));
        }

        let entries: Vec<SchemaDirectoryEntry> = (0..count)
            .map(|i| {
                // SAFETY: within the directory, written before READY.
                unsafe {
                    (region
                        .base_ptr()
                        .as_ptr()
                        .add(SCHEMA_DIRECTORY_OFFSET + i * SCHEMA_ENTRY_SIZE)
                        as *const SchemaDirectoryEntry)
                        .read()
                }
            })
            .collect();

        if let Some(entry) = entries
            .iter()
            .find(|e| e.payload_size > header.payload_size)
        {
            return Err(ShmConfError::invalid_layout(format!(
                "directory entry {} needs {} payload bytes, slots hold {}",
                entry.name(),
                entry.payload_size,
                header.payload_size
            )));
        }

        let mut usable = HashSet::new();
        for schema in registry.iter() {
            match entries.iter().find(|e| e.type_id == schema.type_id) {
                Some(entry) => {
                    if entry.fingerprint != schema.fingerprint
                        || entry.payload_size as usize != schema.size
                    {
                        return Err(ShmConfError::schema_mismatch(
                            schema.type_name,
                            format!(
                                "region stores {} ({} bytes, fingerprint {:#018x}), \
                                 local layout is {} bytes, fingerprint {:#018x}",
                                entry.name(),
                                entry.payload_size,
                                entry.fingerprint,
                                schema.size,
                                schema.fingerprint
                            ),
                        ));
                    }
                    usable.insert(schema.type_id);
                }
                None => {
                    warn!(
                        "Record {} is not described in region '{}' and cannot be stored there",
                        schema.type_name,
                        region.name()
                    );
                }
            }
        }
        Ok(usable)
    }

    /// Insert a new record.
    ///
    /// Fails with `AlreadyExists` if a record with the same key is present;
    /// the existing record is left untouched.
    pub fn insert<R: Record>(&self, record: &R) -> Result<RecordView<'_, R>> {
        let (view, inserted) = self.insert_or_get(record)?;
        if !inserted {
            return Err(ShmConfError::already_exists(view.key().to_string()));
        }
        Ok(view)
    }

    /// Insert a record unless one with the same key exists, returning the
    /// view and whether this call inserted it
    pub fn insert_or_get<R: Record>(&self, record: &R) -> Result<(RecordView<'_, R>, bool)> {
        self.ensure_usable::<R>()?;
        let key = record.key();
        match self.table.find_or_claim(&key)? {
            SlotClaim::Claimed(pending) => {
                // SAFETY: the claimed payload is exclusively ours and sized
                // and aligned for every registered record.
                unsafe { RecordView::initialize(pending.payload_ptr(), record) };
                let index = pending.publish();
                Ok((self.view(index, key), true))
            }
            SlotClaim::Existing(index) => Ok((self.view(index, key), false)),
        }
    }

    /// Look up a record by key, or by a record carrying the key
    pub fn lookup<K: RecordKeySource>(&self, key: &K) -> Result<RecordView<'_, K::Record>> {
        let key = self.resolve_key(key)?;
        match self.table.find(&key)? {
            Some(index) => Ok(self.view(index, key)),
            None => Err(ShmConfError::not_found(key.to_string())),
        }
    }

    /// Whether a record with the key is present
    pub fn contains<K: RecordKeySource>(&self, key: &K) -> Result<bool> {
        let key = self.resolve_key(key)?;
        Ok(self.table.find(&key)?.is_some())
    }

    /// Refresh `record` from the shared copy stored under its key.
    ///
    /// Shared state is authoritative: the caller's non-key fields are
    /// overwritten, nothing is written to the region. Fails with `NotFound`
    /// if no record has the key.
    pub fn update_config<R: Record>(&self, record: &mut R) -> Result<RecordView<'_, R>> {
        let view = self.lookup(&*record)?;
        view.read_into(record);
        Ok(view)
    }

    /// Keys of every published record, in slot order
    pub fn keys(&self) -> Vec<RecordKey> {
        self.table
            .used_indices()
            .into_iter()
            .filter_map(|i| self.table.key_at(i))
            .collect()
    }

    /// Views over every published record of type `R`
    pub fn records<R: Record>(&self) -> Result<Vec<RecordView<'_, R>>> {
        self.ensure_usable::<R>()?;
        Ok(self
            .table
            .used_indices()
            .into_iter()
            .filter_map(|i| self.table.key_at(i).map(|key| (i, key)))
            .filter(|(_, key)| key.type_id() == R::TYPE_ID)
            .map(|(i, key)| self.view(i, key))
            .collect())
    }

    /// Number of published records
    pub fn len(&self) -> usize {
        self.table.occupied() as usize
    }

    /// Whether no record has been published
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot count
    pub fn capacity(&self) -> u32 {
        self.table.capacity()
    }

    /// Current table statistics
    pub fn stats(&self) -> TableStats {
        let layout = self.table.layout();
        // SAFETY: the header is immutable once the store exists.
        let header = unsafe { &*(self.region.base_ptr().as_ptr() as *const TableHeader) };
        TableStats {
            capacity: layout.capacity,
            occupied: self.table.occupied(),
            slot_size: layout.slot_size,
            payload_size: layout.payload_size,
            schema_count: header.schema_count,
            region_size: self.region.size(),
        }
    }

    /// The mapped region
    pub fn region(&self) -> &Arc<SharedMemoryRegion> {
        &self.region
    }

    /// Schemas this process was built with
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Table geometry
    pub fn layout(&self) -> &TableLayout {
        self.table.layout()
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn ensure_usable<R: Record>(&self) -> Result<()> {
        self.registry.schema_of::<R>()?;
        if !self.usable.contains(&R::TYPE_ID) {
            return Err(ShmConfError::schema_not_registered(R::TYPE_NAME));
        }
        Ok(())
    }

    fn resolve_key<K: RecordKeySource>(&self, key: &K) -> Result<RecordKey> {
        self.ensure_usable::<K::Record>()?;
        let key = key.record_key();
        if key.type_id() != <K::Record as Record>::TYPE_ID {
            return Err(ShmConfError::invalid_parameter(
                "key",
                format!(
                    "key {} does not address {}",
                    key,
                    <K::Record as Record>::TYPE_NAME
                ),
            ));
        }
        Ok(key)
    }

    fn view<R: Record>(&self, index: u32, key: RecordKey) -> RecordView<'_, R> {
        // SAFETY: slot `index` is published under a key of type `R`, so its
        // payload holds an `R`; the region outlives `&self`.
        unsafe { RecordView::new(self.table.payload_ptr(index), index, key) }
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("region", &self.region.name())
            .field("table", &self.table)
            .field("schemas", &self.registry.len())
            .finish()
    }
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        builtin_registry, ComponentConfig, ComponentConfigKey, ComponentStatistics,
        ComponentStatisticsKey,
    };
    use tempfile::TempDir;

    fn region(dir: &TempDir, name: &str, size: usize) -> SharedMemoryRegion {
        let config = RegionConfig::new(name, size).with_file_path(dir.path().join(name));
        SharedMemoryRegion::create(config).unwrap()
    }

    fn store(dir: &TempDir, capacity: u32) -> ConfigStore {
        let registry = Arc::new(builtin_registry().unwrap());
        let size = TableLayout::required_region_size(registry.max_payload_size(), capacity);
        ConfigStore::create_with_registry(
            region(dir, "store", size),
            StoreConfig::new().with_capacity(capacity),
            registry,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 31);

        let view = store.insert(&ComponentConfig::new(4, 1, 5.0)).unwrap();
        assert_eq!(view.get(ComponentConfig::DELAY), 5.0);

        let found = store
            .lookup(&ComponentConfigKey {
                component_type: 4,
                category: 1,
            })
            .unwrap();
        assert_eq!(found.slot_index(), view.slot_index());
        assert_eq!(found.read(), ComponentConfig::new(4, 1, 5.0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_is_not_upsert() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 31);

        store.insert(&ComponentConfig::new(4, 1, 5.0)).unwrap();
        let err = store.insert(&ComponentConfig::new(4, 1, 9.0)).unwrap_err();
        assert!(matches!(err, ShmConfError::AlreadyExists { .. }));

        let view = store.lookup(&ComponentConfig::new(4, 1, 0.0)).unwrap();
        assert_eq!(view.get(ComponentConfig::DELAY), 5.0);

        let (_, inserted) = store.insert_or_get(&ComponentConfig::new(4, 1, 9.0)).unwrap();
        assert!(!inserted);
    }

    #[test]
    fn test_lookup_missing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 31);
        let err = store.lookup(&ComponentStatisticsKey { id: 3 }).unwrap_err();
        assert!(matches!(err, ShmConfError::NotFound { .. }));
        assert!(!store.contains(&ComponentStatisticsKey { id: 3 }).unwrap());
    }

    #[test]
    fn test_update_config_refreshes_local_copy() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 31);
        store.insert(&ComponentConfig::new(2, 7, 5.0)).unwrap();

        let mut local = ComponentConfig::new(2, 7, 123.0);
        let view = store.update_config(&mut local).unwrap();
        assert_eq!(local.delay, 5.0);
        assert_eq!(view.get(ComponentConfig::DELAY), 5.0);

        let mut missing = ComponentConfig::new(9, 9, 1.0);
        assert!(matches!(
            store.update_config(&mut missing),
            Err(ShmConfError::NotFound { .. })
        ));
        assert_eq!(missing.delay, 1.0);
    }

    #[test]
    fn test_counters_through_view() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 31);
        let view = store.insert(&ComponentStatistics::new(11)).unwrap();

        view.fetch_add(ComponentStatistics::REF_COUNT, 5);
        view.fetch_add_at(ComponentStatistics::COUNTERS, 3, 2);
        let seen = store.lookup(&ComponentStatisticsKey { id: 11 }).unwrap();
        assert_eq!(seen.get(ComponentStatistics::REF_COUNT), 5);
        assert_eq!(seen.get_at(ComponentStatistics::COUNTERS, 3), 2);
        assert_eq!(seen.swap(ComponentStatistics::REF_COUNT, 0), 5);
        assert_eq!(seen.get(ComponentStatistics::ID), 11);
    }

    #[test]
    fn test_unregistered_schema_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(
            SchemaRegistry::builder()
                .register::<ComponentConfig>()
                .unwrap()
                .build(),
        );
        let store = ConfigStore::create_with_registry(
            region(&dir, "partial", 64 * 1024),
            StoreConfig::default(),
            registry,
        )
        .unwrap();
        assert!(matches!(
            store.insert(&ComponentStatistics::new(1)),
            Err(ShmConfError::SchemaNotRegistered { .. })
        ));
    }

    #[test]
    fn test_second_create_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 31);
        let config = RegionConfig::open("store").with_file_path(dir.path().join("store"));
        let again = SharedMemoryRegion::open(config).unwrap();
        let err = ConfigStore::create_with_registry(
            again,
            StoreConfig::default(),
            Arc::clone(store.registry()),
        )
        .unwrap_err();
        assert!(matches!(err, ShmConfError::RegionExists { .. }));
    }

    #[test]
    fn test_keys_and_records() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 31);
        store.insert(&ComponentConfig::new(1, 1, 1.0)).unwrap();
        store.insert(&ComponentStatistics::new(1)).unwrap();
        store.insert(&ComponentStatistics::new(2)).unwrap();

        assert_eq!(store.keys().len(), 3);
        assert_eq!(store.records::<ComponentStatistics>().unwrap().len(), 2);
        assert_eq!(store.records::<ComponentConfig>().unwrap().len(), 1);

        let stats = store.stats();
        assert_eq!(stats.capacity, 31);
        assert_eq!(stats.occupied, 3);
        assert_eq!(stats.schema_count, 2);
    }
}
