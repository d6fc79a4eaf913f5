//! Scalar field types and width-dispatched raw memory access

use std::fmt;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Scalar types a record field may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScalarType {
    U8 = 1,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarType {
    /// Width in bytes
    pub const fn width(self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::I8 => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::U64 | ScalarType::I64 | ScalarType::F64 => 8,
        }
    }

    /// Whether the type supports atomic addition
    pub const fn is_integer(self) -> bool {
        !matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Short lowercase name, as in Rust source
    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::U8 => "u8",
            ScalarType::I8 => "i8",
            ScalarType::U16 => "u16",
            ScalarType::I16 => "i16",
            ScalarType::U32 => "u32",
            ScalarType::I32 => "i32",
            ScalarType::U64 => "u64",
            ScalarType::I64 => "i64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type that can be stored in a record field.
///
/// Values travel through shared memory as raw bits zero-extended to `u64`.
pub trait Scalar: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Descriptor tag for this type
    const TYPE: ScalarType;

    /// Raw bits of the value, zero-extended
    fn into_raw(self) -> u64;

    /// Rebuild a value from its raw bits (upper bits are ignored)
    fn from_raw(raw: u64) -> Self;
}

/// Integer scalars, which support atomic fetch-add
pub trait Counter: Scalar {}

macro_rules! impl_integer_scalar {
    ($($ty:ty => $unsigned:ty, $tag:ident;)*) => {
        $(
            impl Scalar for $ty {
                const TYPE: ScalarType = ScalarType::$tag;

                #[inline]
                fn into_raw(self) -> u64 {
                    self as $unsigned as u64
                }

                #[inline]
                fn from_raw(raw: u64) -> Self {
                    raw as $unsigned as $ty
                }
            }

            impl Counter for $ty {}
        )*
    };
}

impl_integer_scalar! {
    u8 => u8, U8;
    i8 => u8, I8;
    u16 => u16, U16;
    i16 => u16, I16;
    u32 => u32, U32;
    i32 => u32, I32;
    u64 => u64, U64;
    i64 => u64, I64;
}

impl Scalar for f32 {
    const TYPE: ScalarType = ScalarType::F32;

    #[inline]
    fn into_raw(self) -> u64 {
        f32::to_bits(self) as u64
    }

    #[inline]
    fn from_raw(raw: u64) -> Self {
        f32::from_bits(raw as u32)
    }
}

impl Scalar for f64 {
    const TYPE: ScalarType = ScalarType::F64;

    #[inline]
    fn into_raw(self) -> u64 {
        f64::to_bits(self)
    }

    #[inline]
    fn from_raw(raw: u64) -> Self {
        f64::from_bits(raw)
    }
}

// Shared-memory access. `ptr` must be valid for `width` bytes, aligned to
// `width`, and live for the duration of the call.

#[inline]
pub(crate) unsafe fn load_shared(ptr: *const u8, width: usize, order: Ordering) -> u64 {
    match width {
        1 => (*(ptr as *const AtomicU8)).load(order) as u64,
        2 => (*(ptr as *const AtomicU16)).load(order) as u64,
        4 => (*(ptr as *const AtomicU32)).load(order) as u64,
        8 => (*(ptr as *const AtomicU64)).load(order),
        _ => unreachable!("unsupported scalar width {}", width),
    }
}

#[inline]
pub(crate) unsafe fn store_shared(ptr: *mut u8, width: usize, raw: u64, order: Ordering) {
    match width {
        1 => (*(ptr as *const AtomicU8)).store(raw as u8, order),
        2 => (*(ptr as *const AtomicU16)).store(raw as u16, order),
        4 => (*(ptr as *const AtomicU32)).store(raw as u32, order),
        8 => (*(ptr as *const AtomicU64)).store(raw, order),
        _ => unreachable!("unsupported scalar width {}", width),
    }
}

#[inline]
pub(crate) unsafe fn fetch_add_shared(ptr: *mut u8, width: usize, delta: u64, order: Ordering) -> u64 {
    match width {
        1 => (*(ptr as *const AtomicU8)).fetch_add(delta as u8, order) as u64,
        2 => (*(ptr as *const AtomicU16)).fetch_add(delta as u16, order) as u64,
        4 => (*(ptr as *const AtomicU32)).fetch_add(delta as u32, order) as u64,
        8 => (*(ptr as *const AtomicU64)).fetch_add(delta, order),
        _ => unreachable!("unsupported scalar width {}", width),
    }
}

#[inline]
pub(crate) unsafe fn swap_shared(ptr: *mut u8, width: usize, raw: u64, order: Ordering) -> u64 {
    match width {
        1 => (*(ptr as *const AtomicU8)).swap(raw as u8, order) as u64,
        2 => (*(ptr as *const AtomicU16)).swap(raw as u16, order) as u64,
        4 => (*(ptr as *const AtomicU32)).swap(raw as u32, order) as u64,
        8 => (*(ptr as *const AtomicU64)).swap(raw, order),
        _ => unreachable!("unsupported scalar width {}", width),
    }
}

// Process-local access, for records owned by the caller.

#[inline]
pub(crate) unsafe fn read_local(ptr: *const u8, width: usize) -> u64 {
    match width {
        1 => *ptr as u64,
        2 => *(ptr as *const u16) as u64,
        4 => *(ptr as *const u32) as u64,
        8 => *(ptr as *const u64),
        _ => unreachable!("unsupported scalar width {}", width),
    }
}

#[inline]
pub(crate) unsafe fn write_local(ptr: *mut u8, width: usize, raw: u64) {
    match width {
        1 => *ptr = raw as u8,
        2 => *(ptr as *mut u16) = raw as u16,
        4 => *(ptr as *mut u32) = raw as u32,
        8 => *(ptr as *mut u64) = raw,
        _ => unreachable!("unsupported scalar width {}", width),
    }
}
