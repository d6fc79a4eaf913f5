//! Structural record keys and the deterministic hashes behind them

use std::fmt;

use crate::error::{Result, ShmConfError};
use crate::layout::MAX_KEY_FIELDS;

use super::field::FieldAccess;
use super::scalar::read_local;
use super::Record;

const FNV64_OFFSET: u64 = 0xcbf29ce484222325;
const FNV64_PRIME: u64 = 0x100000001b3;
const FNV32_OFFSET: u32 = 0x811c9dc5;
const FNV32_PRIME: u32 = 0x01000193;

/// FNV-1a, 64-bit. Deterministic across processes, unlike the std hasher.
pub const fn fnv1a_64(bytes: &[u8]) -> u64 {
    fnv1a_64_extend(FNV64_OFFSET, bytes)
}

/// Continue an FNV-1a 64-bit hash with more bytes
pub const fn fnv1a_64_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV64_PRIME);
        i += 1;
    }
    hash
}

/// FNV-1a, 32-bit; used for record type identities
pub const fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV32_PRIME);
        i += 1;
    }
    hash
}

/// Structural key of a record: type identity plus its discriminant fields.
///
/// Field values are the raw zero-extended bits of each key field, in the
/// order the record's descriptors list them. Unused positions are zero so
/// derived equality is structural.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    type_id: u32,
    len: u32,
    fields: [u64; MAX_KEY_FIELDS],
}

impl RecordKey {
    /// Build a key from a type identity and raw field values
    pub fn new(type_id: u32, fields: &[u64]) -> Result<Self> {
        if fields.len() > MAX_KEY_FIELDS {
            return Err(ShmConfError::invalid_parameter(
                "fields",
                format!(
                    "{} key fields given, at most {} supported",
                    fields.len(),
                    MAX_KEY_FIELDS
                ),
            ));
        }
        let mut buf = [0u64; MAX_KEY_FIELDS];
        buf[..fields.len()].copy_from_slice(fields);
        Ok(Self {
            type_id,
            len: fields.len() as u32,
            fields: buf,
        })
    }

    /// Build a key for record type `R`, checking the field count
    pub fn of<R: Record>(fields: &[u64]) -> Result<Self> {
        let expected = R::FIELDS
            .iter()
            .filter(|d| d.access == FieldAccess::Key)
            .count();
        if fields.len() != expected {
            return Err(ShmConfError::invalid_parameter(
                "fields",
                format!(
                    "{} expects {} key fields, got {}",
                    R::TYPE_NAME,
                    expected,
                    fields.len()
                ),
            ));
        }
        Self::new(R::TYPE_ID, fields)
    }

    /// Extract the key of a process-local record.
    ///
    /// Key fields beyond [`MAX_KEY_FIELDS`] are ignored; registration rejects
    /// such schemas before they reach a table.
    pub fn from_record<R: Record>(record: &R) -> Self {
        let base = record as *const R as *const u8;
        let mut fields = [0u64; MAX_KEY_FIELDS];
        let mut len = 0;
        for desc in R::FIELDS.iter().filter(|d| d.access == FieldAccess::Key) {
            if len == MAX_KEY_FIELDS {
                break;
            }
            // SAFETY: `Record` guarantees descriptors lie within `R` and are aligned.
            fields[len] = unsafe { read_local(base.add(desc.offset), desc.scalar.width()) };
            len += 1;
        }
        Self {
            type_id: R::TYPE_ID,
            len: len as u32,
            fields,
        }
    }

    pub(crate) fn from_raw_parts(type_id: u32, len: u32, fields: [u64; MAX_KEY_FIELDS]) -> Option<Self> {
        if len as usize > MAX_KEY_FIELDS {
            return None;
        }
        let mut key = Self {
            type_id,
            len,
            fields,
        };
        for slot in key.fields[len as usize..].iter_mut() {
            *slot = 0;
        }
        Some(key)
    }

    /// Type identity of the keyed record
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    /// Raw discriminant values
    pub fn fields(&self) -> &[u64] {
        &self.fields[..self.len as usize]
    }

    pub(crate) fn raw_fields(&self) -> [u64; MAX_KEY_FIELDS] {
        self.fields
    }

    /// Hash that picks the home slot; identical in every process
    pub fn signature_hash(&self) -> u64 {
        let mut hash = fnv1a_64_extend(FNV64_OFFSET, &self.type_id.to_le_bytes());
        hash = fnv1a_64_extend(hash, &self.len.to_le_bytes());
        for field in self.fields() {
            hash = fnv1a_64_extend(hash, &field.to_le_bytes());
        }
        hash
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordKey")
            .field("type_id", &format_args!("{:#010x}", self.type_id))
            .field("fields", &self.fields())
            .finish()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}{:?}", self.type_id, self.fields())
    }
}

/// Anything a record can be looked up by.
///
/// Every record is its own key source; standalone key structs implement this
/// to look up records without building a full value.
pub trait RecordKeySource {
    /// Record type the key addresses
    type Record: Record;

    /// The structural key
    fn record_key(&self) -> RecordKey;
}

impl<R: Record> RecordKeySource for R {
    type Record = R;

    fn record_key(&self) -> RecordKey {
        self.key()
    }
}
