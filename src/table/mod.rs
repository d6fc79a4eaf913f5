//! Fixed-capacity slot table living inside a shared region
//!
//! Slots move `Free -> Claimed -> Used` and never back. A claimant wins a
//! free slot with a compare-and-swap, writes key and payload, then publishes
//! the slot with a release store. Probers that meet a claimed slot wait for
//! its publication before comparing keys, so no two slots ever hold the same
//! key.

pub mod probe;
pub mod slot;
pub mod slot_table;
pub(crate) mod wait;

pub use probe::{is_prime, is_valid_capacity, largest_capacity_at_most, ProbeSequence};
pub use slot::SlotState;
pub use slot_table::{PendingSlot, SlotClaim, SlotTable};
