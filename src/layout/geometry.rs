//! Slot geometry: where each slot and payload lives inside the region

use crate::error::{Result, ShmConfError};
use crate::table::probe;

use super::constants::*;

/// Computed placement of the slot array within a region of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    /// Slot count
    pub capacity: u32,
    /// Bytes per slot, header included, multiple of the cache line
    pub slot_size: u32,
    /// Bytes of payload per slot
    pub payload_size: u32,
    /// Offset of slot 0
    pub slots_offset: usize,
    /// Region size the layout was computed for
    pub region_size: usize,
}

impl TableLayout {
    /// Lay out a table for `payload_size`-byte payloads.
    ///
    /// With `capacity` unset, picks the largest prime congruent to 3 mod 4
    /// whose slots fit the region.
    pub fn compute(region_size: usize, payload_size: usize, capacity: Option<u32>) -> Result<Self> {
        let slot_size = Self::slot_size_for(payload_size);
        if slot_size > u32::MAX as usize {
            return Err(ShmConfError::invalid_parameter(
                "payload_size",
                format!("{} bytes is too large for a slot", payload_size),
            ));
        }

        let available = region_size.saturating_sub(SLOTS_OFFSET);
        let fits = (available / slot_size).min(u32::MAX as usize) as u32;

        let capacity = match capacity {
            Some(requested) => {
                if !probe::is_valid_capacity(requested) {
                    return Err(ShmConfError::invalid_parameter(
                        "capacity",
                        format!("{} is not a prime congruent to 3 mod 4", requested),
                    ));
                }
                if requested > fits {
                    return Err(ShmConfError::invalid_parameter(
                        "capacity",
                        format!(
                            "{} slots of {} bytes do not fit in a {} byte region",
                            requested, slot_size, region_size
                        ),
                    ));
                }
                requested
            }
            None => probe::largest_capacity_at_most(fits).ok_or_else(|| {
                ShmConfError::invalid_parameter(
                    "size",
                    format!("region of {} bytes cannot hold a table", region_size),
                )
            })?,
        };

        Ok(Self {
            capacity,
            slot_size: slot_size as u32,
            payload_size: payload_size as u32,
            slots_offset: SLOTS_OFFSET,
            region_size,
        })
    }

    /// Slot size for a payload: header plus payload, rounded to the cache line
    pub fn slot_size_for(payload_size: usize) -> usize {
        let raw = SLOT_HEADER_SIZE + payload_size;
        (raw + CACHE_LINE_SIZE - 1) / CACHE_LINE_SIZE * CACHE_LINE_SIZE
    }

    /// Region bytes needed to hold `capacity` slots of `payload_size` bytes
    pub fn required_region_size(payload_size: usize, capacity: u32) -> usize {
        SLOTS_OFFSET + Self::slot_size_for(payload_size) * capacity as usize
    }

    /// Byte offset of slot `index`
    #[inline]
    pub fn slot_offset(&self, index: u32) -> usize {
        debug_assert!(index < self.capacity);
        self.slots_offset + index as usize * self.slot_size as usize
    }

    /// Byte offset of the payload of slot `index`
    #[inline]
    pub fn payload_offset(&self, index: u32) -> usize {
        self.slot_offset(index) + SLOT_HEADER_SIZE
    }

    /// Offset one past the last slot
    pub fn end_offset(&self) -> usize {
        self.slots_offset + self.capacity as usize * self.slot_size as usize
    }
}
