//! Store configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShmConfError};
use crate::table::is_valid_capacity;

/// Default bound on waiting for another process's claim or initialization
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for creating or opening a [`ConfigStore`](super::ConfigStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Slot count; must be a prime congruent to 3 mod 4. When unset, the
    /// largest such prime whose slots fit in the region.
    pub capacity: Option<u32>,
    /// How long a prober waits for a concurrently claimed slot to be published
    pub claim_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an exact slot count
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the claim timeout
    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if !is_valid_capacity(capacity) {
                return Err(ShmConfError::invalid_parameter(
                    "capacity",
                    format!("{} is not a prime congruent to 3 mod 4", capacity),
                ));
            }
        }

        if self.claim_timeout.is_zero() {
            return Err(ShmConfError::invalid_parameter(
                "claim_timeout",
                "Claim timeout cannot be zero",
            ));
        }

        Ok(())
    }
}

/// Builder pattern for store configuration
#[derive(Debug, Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the slot count
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = Some(capacity);
        self
    }

    /// Set the claim timeout
    pub fn claim_timeout(mut self, timeout: Duration) -> Self {
        self.config.claim_timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.capacity, None);
        assert_eq!(config.claim_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validates_capacity() {
        assert!(StoreConfigBuilder::new().capacity(1019).build().is_ok());
        assert!(StoreConfigBuilder::new().capacity(1021).build().is_err());
        assert!(StoreConfigBuilder::new()
            .claim_timeout(Duration::ZERO)
            .build()
            .is_err());
    }
}
