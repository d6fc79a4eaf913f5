//! # shmconf - Shared-Memory Configuration Store
//!
//! shmconf lets independent processes share a small, fixed-capacity store of
//! typed configuration and statistics records placed in a memory-mapped
//! region. There is no broker and no serialization: every process reads and
//! updates the same bytes in place.
//!
//! ## Features
//!
//! - **Named shared memory regions**: file-backed and memfd support
//! - **Cross-process hash table**: quadratic probing over a prime number of
//!   slots, with compare-and-swap slot claims
//! - **Typed zero-copy views**: plain configuration fields and atomic counters
//! - **Schema checking**: every process verifies record layouts on open
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   ConfigStore                    │
//! │   insert / lookup / update_config                │
//! ├──────────────────────────────────────────────────┤
//! │  SlotTable            │  RecordView              │
//! │  - probe sequence     │  - typed field access    │
//! │  - claim / publish    │  - atomic counters       │
//! ├──────────────────────────────────────────────────┤
//! │          SharedMemoryRegion (mmap)               │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use shmconf::records::{ComponentConfig, ComponentConfigKey};
//! use shmconf::{ConfigStore, RegionConfig, SharedMemoryRegion, StoreConfig};
//!
//! # fn main() -> shmconf::Result<()> {
//! let region = SharedMemoryRegion::create(RegionConfig::new("settings", 256 * 1024))?;
//! let store = ConfigStore::create(region, StoreConfig::default())?;
//!
//! store.insert(&ComponentConfig::new(1, 0, 5.0))?;
//! let view = store.lookup(&ComponentConfigKey { component_type: 1, category: 0 })?;
//! assert_eq!(view.get(ComponentConfig::DELAY), 5.0);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod layout;
pub mod memory;
pub mod record;
pub mod records;
pub mod store;
pub mod table;

// Main API re-exports
pub use error::{Result, ShmConfError};
pub use memory::{BackingType, RegionConfig, RegionInfo, SharedMemoryRegion};
pub use record::{
    global_registry, install_global_registry, Atomic, AtomicField, Field, FieldAccess,
    FieldDescriptor, KeyField, Plain, PlainField, Record, RecordKey, RecordKeySource, RecordSchema,
    RecordView, ScalarType, SchemaRegistry,
};
pub use store::{ConfigStore, StoreConfig, StoreConfigBuilder, TableStats};
pub use table::{SlotState, SlotTable};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    use std::time::Duration;

    /// Default region size for the CLI (256KB)
    pub const DEFAULT_REGION_SIZE: usize = 256 * 1024;

    /// Alignment of every slot and payload
    pub const SLOT_ALIGNMENT: usize = crate::layout::CACHE_LINE_SIZE;

    /// Maximum number of record schemas per region
    pub const MAX_SCHEMAS: usize = crate::layout::MAX_SCHEMAS;

    /// Maximum number of key fields per record
    pub const MAX_KEY_FIELDS: usize = crate::layout::MAX_KEY_FIELDS;

    /// Default bound on waiting for another process's claim
    pub const DEFAULT_CLAIM_TIMEOUT: Duration = crate::store::DEFAULT_CLAIM_TIMEOUT;
}
