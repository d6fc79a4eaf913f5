//! Typed records stored in table slots
//!
//! A record is a `#[repr(C)]` plain-data struct described by a static list of
//! [`FieldDescriptor`]s. Key fields form its [`RecordKey`]; plain fields hold
//! configuration values; atomic fields hold counters mutated concurrently by
//! several processes. [`RecordView`] projects a slot payload back into the
//! record's fields without copying it out of the region.

pub mod field;
pub mod key;
pub mod registry;
pub mod scalar;
pub mod view;

pub use field::{
    Access, Atomic, AtomicField, Field, FieldAccess, FieldDescriptor, KeyAccess, KeyField, Plain,
    PlainField, Writable,
};
pub use key::{fnv1a_32, fnv1a_64, RecordKey, RecordKeySource};
pub use registry::{
    global_registry, install_global_registry, RecordSchema, SchemaRegistry, SchemaRegistryBuilder,
};
pub use scalar::{Counter, Scalar, ScalarType};
pub use view::RecordView;

/// A record type that can live in a table slot.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` plain data that is valid for any bit
/// pattern of its fields, and `FIELDS` must describe real fields of the
/// struct: each descriptor's offset and scalar type must match the field it
/// names, and descriptors must not overlap. [`SchemaRegistry`] checks bounds,
/// alignment and overlap, but cannot see the struct definition itself.
pub unsafe trait Record: Copy + Default + Send + Sync + 'static {
    /// Stable type name; hashed into the type identity
    const TYPE_NAME: &'static str;

    /// Field layout in declaration order
    const FIELDS: &'static [FieldDescriptor];

    /// Type identity shared by every process
    const TYPE_ID: u32 = fnv1a_32(Self::TYPE_NAME.as_bytes());

    /// Structural key of this record
    fn key(&self) -> RecordKey {
        RecordKey::from_record(self)
    }
}
