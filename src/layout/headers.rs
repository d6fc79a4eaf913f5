//! Header structures placed inside the shared region

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, ShmConfError};
use super::constants::*;

/// Table header at offset 0 of the region.
///
/// Plain fields are written once by the creator while `init_state` is
/// `INITIALIZING` and are immutable after it is published as `READY`.
#[repr(C)]
pub struct TableHeader {
    /// Magic number for validation
    pub magic: u64,
    /// Layout version
    pub version: u32,
    /// Initialization state (see [`init_state`])
    pub init_state: AtomicU32,
    /// Slot count, a prime congruent to 3 mod 4
    pub capacity: u32,
    /// Bytes per slot, header included
    pub slot_size: u32,
    /// Bytes of payload per slot
    pub payload_size: u32,
    /// Number of valid schema directory entries
    pub schema_count: u32,
    /// Offset of slot 0
    pub slots_offset: u64,
    /// Region size the table was laid out for
    pub region_size: u64,
    /// Number of published slots
    pub occupied: AtomicU32,
    /// Process that initialized the table
    pub creator_pid: u32,
    /// Initialization timestamp (Unix epoch seconds)
    pub created_at: u64,
}

const _: () = assert!(size_of::<TableHeader>() == HEADER_SIZE);

impl TableHeader {
    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != SHMCONF_MAGIC {
            return Err(ShmConfError::invalid_layout("Invalid magic number"));
        }
        if self.version != LAYOUT_VERSION {
            return Err(ShmConfError::version_mismatch(
                LAYOUT_VERSION as u64,
                self.version as u64,
            ));
        }
        Ok(())
    }

    /// Number of published slots
    pub fn occupied(&self) -> u32 {
        self.occupied.load(Ordering::Acquire)
    }
}

/// One schema directory entry, describing a record layout every process
/// attached to the region must agree on.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SchemaDirectoryEntry {
    /// Type identity of the record
    pub type_id: u32,
    /// Size of the record payload
    pub payload_size: u32,
    /// Hash over the record's field layout
    pub fingerprint: u64,
    /// Record type name (NUL-terminated, truncated)
    pub name: [u8; MAX_SCHEMA_NAME_LEN],
}

const _: () = assert!(size_of::<SchemaDirectoryEntry>() == SCHEMA_ENTRY_SIZE);

impl SchemaDirectoryEntry {
    /// Create a directory entry; the name is truncated to fit
    pub fn new(type_id: u32, payload_size: u32, fingerprint: u64, name: &str) -> Self {
        let mut buf = [0u8; MAX_SCHEMA_NAME_LEN];
        let len = name.len().min(MAX_SCHEMA_NAME_LEN - 1);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            type_id,
            payload_size,
            fingerprint,
            name: buf,
        }
    }

    /// The stored name, lossily decoded
    pub fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_SCHEMA_NAME_LEN);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }
}

/// Header at the start of every slot.
///
/// `state` is the only field touched concurrently. The key fields are
/// written by the claimant before the slot is published as used and never
/// change afterwards.
#[repr(C)]
pub struct SlotHeader {
    /// Occupancy state
    pub state: AtomicU32,
    /// Type identity of the stored record
    pub type_id: u32,
    /// Cached key hash for cheap mismatch rejection
    pub key_hash: u64,
    /// Number of discriminant fields in use
    pub key_len: u32,
    _reserved: u32,
    /// Discriminant field values
    pub key_fields: [u64; MAX_KEY_FIELDS],
    _padding: [u8; 8],
}

const _: () = assert!(size_of::<SlotHeader>() == SLOT_HEADER_SIZE);
