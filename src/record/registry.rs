//! Schema registry
//!
//! Every process attached to a region must agree on the layout of every
//! record it stores there. A [`SchemaRegistry`] is built once at startup,
//! never mutated afterwards, and its schemas are mirrored into the region's
//! schema directory so that mismatched builds are caught on open.

use std::any::TypeId;
use std::collections::HashMap;
use std::mem::{align_of, size_of};
use std::sync::{Arc, OnceLock};

use crate::error::{Result, ShmConfError};
use crate::layout::{SchemaDirectoryEntry, MAX_KEY_FIELDS, MAX_PAYLOAD_ALIGN, MAX_SCHEMAS};

use super::field::{FieldAccess, FieldDescriptor};
use super::key::{fnv1a_64, fnv1a_64_extend};
use super::Record;

/// Layout description of one record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    /// Record type name
    pub type_name: &'static str,
    /// Type identity
    pub type_id: u32,
    /// Payload size in bytes
    pub size: usize,
    /// Payload alignment
    pub align: usize,
    /// Field descriptors
    pub fields: &'static [FieldDescriptor],
    /// Hash over the name, size and every field descriptor
    pub fingerprint: u64,
}

impl RecordSchema {
    /// Describe record type `R`
    pub fn of<R: Record>() -> Self {
        let size = size_of::<R>();
        let mut fingerprint = fnv1a_64(R::TYPE_NAME.as_bytes());
        fingerprint = fnv1a_64_extend(fingerprint, &(size as u64).to_le_bytes());
        for field in R::FIELDS {
            fingerprint = fnv1a_64_extend(fingerprint, field.name.as_bytes());
            fingerprint = fnv1a_64_extend(fingerprint, &(field.offset as u64).to_le_bytes());
            fingerprint = fnv1a_64_extend(fingerprint, &[field.scalar as u8, field.access as u8]);
            fingerprint = fnv1a_64_extend(fingerprint, &(field.len as u64).to_le_bytes());
        }

        Self {
            type_name: R::TYPE_NAME,
            type_id: R::TYPE_ID,
            size,
            align: align_of::<R>(),
            fields: R::FIELDS,
            fingerprint,
        }
    }

    /// Number of discriminant fields
    pub fn key_field_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.access == FieldAccess::Key)
            .count()
    }

    /// Check that the descriptors are usable against shared memory
    pub fn validate(&self) -> Result<()> {
        let mismatch = |message: String| ShmConfError::schema_mismatch(self.type_name, message);

        if self.type_name.is_empty() {
            return Err(ShmConfError::invalid_parameter(
                "type_name",
                "Record type name cannot be empty",
            ));
        }
        if self.size == 0 {
            return Err(mismatch("zero-sized record".to_string()));
        }
        if self.size > u32::MAX as usize {
            return Err(mismatch(format!("record of {} bytes is too large", self.size)));
        }
        if self.align > MAX_PAYLOAD_ALIGN {
            return Err(mismatch(format!(
                "alignment {} exceeds the slot payload alignment {}",
                self.align, MAX_PAYLOAD_ALIGN
            )));
        }

        let mut spans: Vec<(usize, usize, &str)> = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            if field.len == 0 {
                return Err(mismatch(format!("field `{}` has no elements", field.name)));
            }
            let width = field.scalar.width();
            if field.offset % width != 0 {
                return Err(mismatch(format!(
                    "field `{}` at offset {} is not aligned to {}",
                    field.name, field.offset, width
                )));
            }
            let end = field.offset + field.byte_len();
            if end > self.size {
                return Err(mismatch(format!(
                    "field `{}` ends at {} past the record size {}",
                    field.name, end, self.size
                )));
            }
            if field.access == FieldAccess::Key && field.len != 1 {
                return Err(mismatch(format!(
                    "key field `{}` must be a scalar",
                    field.name
                )));
            }
            spans.push((field.offset, end, field.name));
        }

        spans.sort_unstable();
        for pair in spans.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(mismatch(format!(
                    "fields `{}` and `{}` overlap",
                    pair[0].2, pair[1].2
                )));
            }
        }

        if self.key_field_count() > MAX_KEY_FIELDS {
            return Err(mismatch(format!(
                "{} key fields, at most {} supported",
                self.key_field_count(),
                MAX_KEY_FIELDS
            )));
        }

        Ok(())
    }

    /// Entry mirrored into the region's schema directory
    pub fn directory_entry(&self) -> SchemaDirectoryEntry {
        SchemaDirectoryEntry::new(self.type_id, self.size as u32, self.fingerprint, self.type_name)
    }
}

/// Immutable set of record schemas known to this process
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<RecordSchema>,
    by_type_id: HashMap<u32, usize>,
    by_rust_type: HashMap<TypeId, usize>,
}

impl SchemaRegistry {
    /// Start building a registry
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Schema with the given type identity
    pub fn get(&self, type_id: u32) -> Option<&RecordSchema> {
        self.by_type_id.get(&type_id).map(|&i| &self.schemas[i])
    }

    /// Schema registered for record type `R`
    pub fn schema_of<R: Record>(&self) -> Result<&RecordSchema> {
        self.by_rust_type
            .get(&TypeId::of::<R>())
            .map(|&i| &self.schemas[i])
            .ok_or_else(|| ShmConfError::schema_not_registered(R::TYPE_NAME))
    }

    /// Number of registered schemas
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schema is registered
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Schemas in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RecordSchema> {
        self.schemas.iter()
    }

    /// Largest payload among the registered schemas
    pub fn max_payload_size(&self) -> usize {
        self.schemas.iter().map(|s| s.size).max().unwrap_or(0)
    }
}

/// Builder for [`SchemaRegistry`]
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    registry: SchemaRegistry,
}

impl SchemaRegistryBuilder {
    /// Register record type `R`
    pub fn register<R: Record>(mut self) -> Result<Self> {
        let schema = RecordSchema::of::<R>();
        schema.validate()?;

        let registry = &mut self.registry;
        if registry.by_rust_type.contains_key(&TypeId::of::<R>()) {
            return Err(ShmConfError::invalid_parameter(
                "record",
                format!("{} is already registered", schema.type_name),
            ));
        }
        if let Some(existing) = registry.get(schema.type_id) {
            return Err(ShmConfError::schema_mismatch(
                schema.type_name,
                format!(
                    "type id {:#010x} collides with {}",
                    schema.type_id, existing.type_name
                ),
            ));
        }
        if registry.schemas.len() == MAX_SCHEMAS {
            return Err(ShmConfError::invalid_parameter(
                "record",
                format!("at most {} schemas can be registered", MAX_SCHEMAS),
            ));
        }

        let index = registry.schemas.len();
        registry.by_type_id.insert(schema.type_id, index);
        registry.by_rust_type.insert(TypeId::of::<R>(), index);
        registry.schemas.push(schema);
        Ok(self)
    }

    /// Finish the registry
    pub fn build(self) -> SchemaRegistry {
        self.registry
    }
}

/// Process-wide registry
static GLOBAL_REGISTRY: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();

/// Install the process-wide registry.
///
/// Fails if a registry was already installed, or if [`global_registry`] has
/// already initialized the built-in one.
pub fn install_global_registry(registry: SchemaRegistry) -> Result<Arc<SchemaRegistry>> {
    let registry = Arc::new(registry);
    GLOBAL_REGISTRY
        .set(Arc::clone(&registry))
        .map_err(|_| ShmConfError::invalid_parameter("registry", "Global registry already installed"))?;
    log::debug!("Installed global registry with {} schemas", registry.len());
    Ok(registry)
}

/// The process-wide registry, initialized with the built-in records if
/// nothing was installed
pub fn global_registry() -> Result<Arc<SchemaRegistry>> {
    if let Some(registry) = GLOBAL_REGISTRY.get() {
        return Ok(Arc::clone(registry));
    }
    let builtin = Arc::new(crate::records::builtin_registry()?);
    Ok(Arc::clone(GLOBAL_REGISTRY.get_or_init(|| builtin)))
}
