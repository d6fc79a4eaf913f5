//! Shared memory regions: creation, attachment and byte-offset atomics

pub mod config;
pub mod regions;

pub use config::{BackingType, RegionConfig};
pub use regions::{RegionInfo, SharedMemoryRegion};
