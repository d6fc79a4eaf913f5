//! Insert, lookup and update of typed records in a shared region

pub mod config;
pub mod stats;
#[allow(clippy::module_inception)]
pub mod store;

pub use config::{StoreConfig, StoreConfigBuilder, DEFAULT_CLAIM_TIMEOUT};
pub use stats::TableStats;
pub use store::ConfigStore;
