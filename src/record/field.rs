//! Field descriptors and typed field handles

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};

use super::scalar::{Scalar, ScalarType};
use super::Record;

/// How a field may be accessed through a shared view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldAccess {
    /// Discriminant field, part of the record key, read-only once published
    Key = 0,
    /// Configuration value, written in place without ordering guarantees
    Plain = 1,
    /// Concurrently mutated counter, accessed with acquire/release atomics
    Atomic = 2,
}

impl FieldAccess {
    pub(crate) fn load_ordering(self) -> Ordering {
        match self {
            FieldAccess::Atomic => Ordering::Acquire,
            FieldAccess::Key | FieldAccess::Plain => Ordering::Relaxed,
        }
    }

    pub(crate) fn store_ordering(self) -> Ordering {
        match self {
            FieldAccess::Atomic => Ordering::Release,
            FieldAccess::Key | FieldAccess::Plain => Ordering::Relaxed,
        }
    }

    pub(crate) fn rmw_ordering(self) -> Ordering {
        match self {
            FieldAccess::Atomic => Ordering::AcqRel,
            FieldAccess::Key | FieldAccess::Plain => Ordering::Relaxed,
        }
    }

    /// Short lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            FieldAccess::Key => "key",
            FieldAccess::Plain => "plain",
            FieldAccess::Atomic => "atomic",
        }
    }
}

/// Describes one field of a record payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: &'static str,
    /// Byte offset within the record
    pub offset: usize,
    /// Element type
    pub scalar: ScalarType,
    /// Access capability
    pub access: FieldAccess,
    /// Number of elements (1 for scalars, N for fixed arrays)
    pub len: usize,
}

impl FieldDescriptor {
    const fn with_access<T: Scalar>(name: &'static str, offset: usize, access: FieldAccess) -> Self {
        Self {
            name,
            offset,
            scalar: T::TYPE,
            access,
            len: 1,
        }
    }

    /// A discriminant field
    pub const fn key<T: Scalar>(name: &'static str, offset: usize) -> Self {
        Self::with_access::<T>(name, offset, FieldAccess::Key)
    }

    /// A plain configuration field
    pub const fn plain<T: Scalar>(name: &'static str, offset: usize) -> Self {
        Self::with_access::<T>(name, offset, FieldAccess::Plain)
    }

    /// An atomically mutated field
    pub const fn atomic<T: Scalar>(name: &'static str, offset: usize) -> Self {
        Self::with_access::<T>(name, offset, FieldAccess::Atomic)
    }

    /// Turn the field into a fixed array of `len` elements
    pub const fn array(self, len: usize) -> Self {
        Self { len, ..self }
    }

    /// Total bytes occupied by the field
    pub const fn byte_len(&self) -> usize {
        self.scalar.width() * self.len
    }

    /// Offset of element `index`
    pub const fn element_offset(&self, index: usize) -> usize {
        self.offset + index * self.scalar.width()
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len == 1 {
            write!(f, "{}: {} @{} ({})", self.name, self.scalar, self.offset, self.access.name())
        } else {
            write!(
                f,
                "{}: [{}; {}] @{} ({})",
                self.name,
                self.scalar,
                self.len,
                self.offset,
                self.access.name()
            )
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Access capability carried by a [`Field`] handle
pub trait Access: sealed::Sealed + 'static {
    const KIND: FieldAccess;
}

/// Capabilities that allow writes through a view
pub trait Writable: Access {}

/// Marker: key field, read-only
#[derive(Debug, Clone, Copy)]
pub struct KeyAccess;

/// Marker: plain field
#[derive(Debug, Clone, Copy)]
pub struct Plain;

/// Marker: atomic field
#[derive(Debug, Clone, Copy)]
pub struct Atomic;

impl sealed::Sealed for KeyAccess {}
impl sealed::Sealed for Plain {}
impl sealed::Sealed for Atomic {}

impl Access for KeyAccess {
    const KIND: FieldAccess = FieldAccess::Key;
}

impl Access for Plain {
    const KIND: FieldAccess = FieldAccess::Plain;
}

impl Access for Atomic {
    const KIND: FieldAccess = FieldAccess::Atomic;
}

impl Writable for Plain {}
impl Writable for Atomic {}

/// Typed handle to field `index` of record `R`.
///
/// Handles are bound with [`Field::bind`], which fails const evaluation if
/// `T` or `A` disagree with the record's descriptor.
pub struct Field<R, T, A> {
    index: usize,
    _marker: PhantomData<fn() -> (R, T, A)>,
}

/// Handle to a key field
pub type KeyField<R, T> = Field<R, T, KeyAccess>;
/// Handle to a plain field
pub type PlainField<R, T> = Field<R, T, Plain>;
/// Handle to an atomic field
pub type AtomicField<R, T> = Field<R, T, Atomic>;

impl<R, T, A> Clone for Field<R, T, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, T, A> Copy for Field<R, T, A> {}

impl<R: Record, T: Scalar, A: Access> Field<R, T, A> {
    /// Bind a handle to `R::FIELDS[index]`
    pub const fn bind(index: usize) -> Self {
        let desc = &R::FIELDS[index];
        if desc.scalar as u8 != T::TYPE as u8 {
            panic!("field handle scalar type does not match its descriptor");
        }
        if desc.access as u8 != A::KIND as u8 {
            panic!("field handle access does not match its descriptor");
        }
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Index into `R::FIELDS`
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The descriptor this handle is bound to
    pub fn descriptor(&self) -> &'static FieldDescriptor {
        &R::FIELDS[self.index]
    }
}

impl<R: Record, T: Scalar, A: Access> fmt::Debug for Field<R, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("record", &R::TYPE_NAME)
            .field("descriptor", self.descriptor())
            .finish()
    }
}
