//! On-region layout of the shared table
//!
//! ```text
//! +--------------+---------------------+---------------------------------+
//! | TableHeader  | Schema directory    | Slot 0 | Slot 1 | ... | Slot N-1 |
//! | (64 bytes)   | (MAX_SCHEMAS x 64)  | SlotHeader (64) + payload       |
//! +--------------+---------------------+---------------------------------+
//! ```
//!
//! Every reference inside the region is a byte offset from its base.

pub mod constants;
pub mod geometry;
pub mod headers;

pub use constants::*;
pub use geometry::TableLayout;
pub use headers::{SchemaDirectoryEntry, SlotHeader, TableHeader};
