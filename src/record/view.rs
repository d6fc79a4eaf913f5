//! Zero-copy typed views over slot payloads

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use super::field::{Access, Atomic, Field, FieldDescriptor, Writable};
use super::key::RecordKey;
use super::scalar::{
    fetch_add_shared, load_shared, store_shared, swap_shared, write_local, Counter, Scalar,
};
use super::Record;

/// A live handle onto one slot's payload, typed as record `R`.
///
/// Writes are visible to every process mapping the region as soon as they
/// land; nothing is buffered. Individual fields are never torn, but a record
/// read field by field may mix values from concurrent writers.
pub struct RecordView<'a, R: Record> {
    payload: NonNull<u8>,
    slot_index: u32,
    key: RecordKey,
    _marker: PhantomData<(&'a (), fn() -> R)>,
}

// SAFETY: every access through a view is an atomic operation on shared memory.
unsafe impl<R: Record> Send for RecordView<'_, R> {}
unsafe impl<R: Record> Sync for RecordView<'_, R> {}

impl<'a, R: Record> RecordView<'a, R> {
    /// # Safety
    /// `payload` must point to a published slot payload holding an `R`,
    /// aligned for `R`, that stays mapped for `'a`.
    pub(crate) unsafe fn new(payload: NonNull<u8>, slot_index: u32, key: RecordKey) -> Self {
        Self {
            payload,
            slot_index,
            key,
            _marker: PhantomData,
        }
    }

    /// Copy a full record into a payload nobody else can observe yet.
    ///
    /// # Safety
    /// `payload` must be the payload of a slot this caller has claimed and
    /// not yet published, aligned for `R` and large enough to hold it.
    pub(crate) unsafe fn initialize(payload: NonNull<u8>, record: &R) {
        std::ptr::write(payload.as_ptr() as *mut R, *record);
    }

    /// Index of the slot this view projects
    pub fn slot_index(&self) -> u32 {
        self.slot_index
    }

    /// Key the slot was published under
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Read a scalar field
    pub fn get<T: Scalar, A: Access>(&self, field: Field<R, T, A>) -> T {
        self.get_at(field, 0)
    }

    /// Read element `index` of an array field
    pub fn get_at<T: Scalar, A: Access>(&self, field: Field<R, T, A>, index: usize) -> T {
        let desc = field.descriptor();
        let ptr = self.element_ptr(desc, index);
        // SAFETY: in bounds and aligned per the validated descriptor.
        T::from_raw(unsafe { load_shared(ptr, desc.scalar.width(), desc.access.load_ordering()) })
    }

    /// Write a scalar field in place
    pub fn set<T: Scalar, A: Writable>(&self, field: Field<R, T, A>, value: T) {
        self.set_at(field, 0, value)
    }

    /// Write element `index` of an array field in place
    pub fn set_at<T: Scalar, A: Writable>(&self, field: Field<R, T, A>, index: usize, value: T) {
        let desc = field.descriptor();
        let ptr = self.element_ptr(desc, index);
        // SAFETY: in bounds and aligned per the validated descriptor.
        unsafe {
            store_shared(
                ptr,
                desc.scalar.width(),
                value.into_raw(),
                desc.access.store_ordering(),
            )
        }
    }

    /// Atomically add to a counter field, returning the previous value
    pub fn fetch_add<T: Counter>(&self, field: Field<R, T, Atomic>, delta: T) -> T {
        self.fetch_add_at(field, 0, delta)
    }

    /// Atomically add to element `index` of a counter array
    pub fn fetch_add_at<T: Counter>(&self, field: Field<R, T, Atomic>, index: usize, delta: T) -> T {
        let desc = field.descriptor();
        let ptr = self.element_ptr(desc, index);
        // SAFETY: in bounds and aligned per the validated descriptor.
        T::from_raw(unsafe {
            fetch_add_shared(
                ptr,
                desc.scalar.width(),
                delta.into_raw(),
                desc.access.rmw_ordering(),
            )
        })
    }

    /// Atomically replace an atomic field, returning the previous value
    pub fn swap<T: Scalar>(&self, field: Field<R, T, Atomic>, value: T) -> T {
        let desc = field.descriptor();
        let ptr = self.element_ptr(desc, 0);
        // SAFETY: in bounds and aligned per the validated descriptor.
        T::from_raw(unsafe {
            swap_shared(
                ptr,
                desc.scalar.width(),
                value.into_raw(),
                desc.access.rmw_ordering(),
            )
        })
    }

    /// Snapshot the shared record into a fresh local copy
    pub fn read(&self) -> R {
        let mut local = R::default();
        self.read_into(&mut local);
        local
    }

    /// Refresh a local mirror from the shared record, field by field
    pub fn read_into(&self, local: &mut R) {
        let dst = local as *mut R as *mut u8;
        for desc in R::FIELDS {
            let width = desc.scalar.width();
            for i in 0..desc.len {
                let offset = desc.element_offset(i);
                // SAFETY: descriptors are validated to lie within `R` and be
                // aligned; the source is the shared payload, the destination
                // the caller's exclusive copy.
                unsafe {
                    let raw = load_shared(
                        self.payload.as_ptr().add(offset),
                        width,
                        desc.access.load_ordering(),
                    );
                    write_local(dst.add(offset), width, raw);
                }
            }
        }
    }

    fn element_ptr(&self, desc: &FieldDescriptor, index: usize) -> *mut u8 {
        assert!(
            index < desc.len,
            "index {} out of bounds for field `{}` of length {}",
            index,
            desc.name,
            desc.len
        );
        // SAFETY: the element lies within the payload per the descriptor.
        unsafe { self.payload.as_ptr().add(desc.element_offset(index)) }
    }
}

impl<R: Record> fmt::Debug for RecordView<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("record", &R::TYPE_NAME)
            .field("slot_index", &self.slot_index)
            .field("key", &self.key)
            .finish()
    }
}
