//! Slot occupancy states

use std::fmt;

/// Occupancy state stored in each slot header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SlotState {
    /// Never claimed
    Free = 0,
    /// Won by a claimant that is still writing key and payload
    Claimed = 1,
    /// Key and payload published; terminal
    Used = 2,
}

impl SlotState {
    /// Decode a raw state word
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SlotState::Free),
            1 => Some(SlotState::Claimed),
            2 => Some(SlotState::Used),
            _ => None,
        }
    }

    /// Raw state word
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Free => "free",
            SlotState::Claimed => "claimed",
            SlotState::Used => "used",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [SlotState::Free, SlotState::Claimed, SlotState::Used] {
            assert_eq!(SlotState::from_raw(state.as_raw()), Some(state));
        }
        assert_eq!(SlotState::from_raw(7), None);
    }
}
