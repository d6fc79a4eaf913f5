//! Table statistics

use std::fmt;

use serde::Serialize;

/// Point-in-time view of a store's table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStats {
    /// Slot count
    pub capacity: u32,
    /// Published slots
    pub occupied: u32,
    /// Bytes per slot, header included
    pub slot_size: u32,
    /// Bytes of payload per slot
    pub payload_size: u32,
    /// Schemas described in the region's directory
    pub schema_count: u32,
    /// Size of the mapped region
    pub region_size: usize,
}

impl TableStats {
    /// Fraction of slots in use (0.0 to 1.0)
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupied as f64 / self.capacity as f64
    }

    /// Slots still free
    pub fn free_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.occupied)
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TableStats {{ capacity: {}, occupied: {}, load: {:.2}%, slot_size: {}, \
             payload_size: {}, schemas: {}, region_size: {} }}",
            self.capacity,
            self.occupied,
            self.load_factor() * 100.0,
            self.slot_size,
            self.payload_size,
            self.schema_count,
            self.region_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_factor() {
        let stats = TableStats {
            capacity: 7,
            occupied: 7,
            slot_size: 128,
            payload_size: 48,
            schema_count: 2,
            region_size: 8192,
        };
        assert_eq!(stats.load_factor(), 1.0);
        assert_eq!(stats.free_slots(), 0);
        assert!(stats.to_string().contains("load: 100.00%"));
    }
}
