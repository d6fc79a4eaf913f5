//! Built-in record schemas
//!
//! These back the CLI and are registered in the global registry when an
//! application does not install its own.

pub mod component;

pub use component::{
    ComponentConfig, ComponentConfigKey, ComponentStatistics, ComponentStatisticsKey,
    COUNTER_SLOTS,
};

use crate::error::Result;
use crate::record::SchemaRegistry;

/// Registry holding every built-in record
pub fn builtin_registry() -> Result<SchemaRegistry> {
    Ok(SchemaRegistry::builder()
        .register::<ComponentConfig>()?
        .register::<ComponentStatistics>()?
        .build())
}
