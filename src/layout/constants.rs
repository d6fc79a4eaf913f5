//! Constants for the on-region table layout

/// Cache line size for alignment (64 bytes on most x86_64 systems)
pub const CACHE_LINE_SIZE: usize = 64;

/// Magic number identifying a shmconf table region
pub const SHMCONF_MAGIC: u64 = 0x53484D434F4E4631; // "SHMCONF1"

/// Current layout version
pub const LAYOUT_VERSION: u32 = 1;

/// Size of the table header at offset 0
pub const HEADER_SIZE: usize = CACHE_LINE_SIZE;

/// Maximum number of record schemas a region can describe
pub const MAX_SCHEMAS: usize = 64;

/// Maximum schema name length stored in the directory (including NUL)
pub const MAX_SCHEMA_NAME_LEN: usize = 48;

/// Size of one schema directory entry
pub const SCHEMA_ENTRY_SIZE: usize = CACHE_LINE_SIZE;

/// Offset of the schema directory
pub const SCHEMA_DIRECTORY_OFFSET: usize = HEADER_SIZE;

/// Offset of the first slot
pub const SLOTS_OFFSET: usize = SCHEMA_DIRECTORY_OFFSET + MAX_SCHEMAS * SCHEMA_ENTRY_SIZE;

/// Maximum number of discriminant fields in a record key
pub const MAX_KEY_FIELDS: usize = 4;

/// Size of the per-slot header that precedes the payload
pub const SLOT_HEADER_SIZE: usize = CACHE_LINE_SIZE;

/// Largest alignment a record payload may require
pub const MAX_PAYLOAD_ALIGN: usize = CACHE_LINE_SIZE;

/// Table header initialization states
pub mod init_state {
    /// Zeroed region, nobody has started initializing
    pub const UNINITIALIZED: u32 = 0;
    /// A creator is writing the header and schema directory
    pub const INITIALIZING: u32 = 1;
    /// Header and directory are published
    pub const READY: u32 = 2;
}

const _: () = assert!(SLOTS_OFFSET % CACHE_LINE_SIZE == 0);
