//! Component configuration and statistics records

use std::mem::offset_of;

use crate::record::{
    AtomicField, Field, FieldDescriptor, KeyField, PlainField, Record, RecordKey, RecordKeySource,
};

/// Per-component configuration, keyed by component type and category
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct ComponentConfig {
    pub component_type: u32,
    pub category: u32,
    /// Delay applied by the component, in seconds
    pub delay: f64,
}

unsafe impl Record for ComponentConfig {
    const TYPE_NAME: &'static str = "ComponentConfig";
    const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::key::<u32>("component_type", offset_of!(ComponentConfig, component_type)),
        FieldDescriptor::key::<u32>("category", offset_of!(ComponentConfig, category)),
        FieldDescriptor::plain::<f64>("delay", offset_of!(ComponentConfig, delay)),
    ];
}

impl ComponentConfig {
    pub const COMPONENT_TYPE: KeyField<Self, u32> = Field::bind(0);
    pub const CATEGORY: KeyField<Self, u32> = Field::bind(1);
    pub const DELAY: PlainField<Self, f64> = Field::bind(2);

    pub fn new(component_type: u32, category: u32, delay: f64) -> Self {
        Self {
            component_type,
            category,
            delay,
        }
    }
}

/// Lookup key for [`ComponentConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentConfigKey {
    pub component_type: u32,
    pub category: u32,
}

impl RecordKeySource for ComponentConfigKey {
    type Record = ComponentConfig;

    fn record_key(&self) -> RecordKey {
        ComponentConfig::new(self.component_type, self.category, 0.0).key()
    }
}

/// Number of general-purpose counters in [`ComponentStatistics`]
pub const COUNTER_SLOTS: usize = 4;

/// Runtime statistics of one component instance, keyed by id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ComponentStatistics {
    pub id: i64,
    pub ref_count: u64,
    pub counters: [u64; COUNTER_SLOTS],
}

unsafe impl Record for ComponentStatistics {
    const TYPE_NAME: &'static str = "ComponentStatistics";
    const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::key::<i64>("id", offset_of!(ComponentStatistics, id)),
        FieldDescriptor::atomic::<u64>("ref_count", offset_of!(ComponentStatistics, ref_count)),
        FieldDescriptor::atomic::<u64>("counters", offset_of!(ComponentStatistics, counters))
            .array(COUNTER_SLOTS),
    ];
}

impl ComponentStatistics {
    pub const ID: KeyField<Self, i64> = Field::bind(0);
    pub const REF_COUNT: AtomicField<Self, u64> = Field::bind(1);
    pub const COUNTERS: AtomicField<Self, u64> = Field::bind(2);

    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// Lookup key for [`ComponentStatistics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentStatisticsKey {
    pub id: i64,
}

impl RecordKeySource for ComponentStatisticsKey {
    type Record = ComponentStatistics;

    fn record_key(&self) -> RecordKey {
        ComponentStatistics::new(self.id).key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fnv1a_32;

    #[test]
    fn test_layouts() {
        assert_eq!(std::mem::size_of::<ComponentConfig>(), 16);
        assert_eq!(std::mem::size_of::<ComponentStatistics>(), 48);
        assert_eq!(ComponentConfig::TYPE_ID, fnv1a_32(b"ComponentConfig"));
        assert_ne!(ComponentConfig::TYPE_ID, ComponentStatistics::TYPE_ID);
    }

    #[test]
    fn test_keys_match_records() {
        let config = ComponentConfig::new(3, 1, 5.0);
        let key = ComponentConfigKey {
            component_type: 3,
            category: 1,
        };
        assert_eq!(config.key(), key.record_key());
        assert_eq!(config.key().fields(), &[3, 1]);

        let stats = ComponentStatistics {
            id: -2,
            ref_count: 5,
            counters: [2; COUNTER_SLOTS],
        };
        assert_eq!(stats.key(), ComponentStatisticsKey { id: -2 }.record_key());
        assert_eq!(stats.key().fields(), &[(-2i64) as u64]);
    }

    #[test]
    fn test_delay_is_not_part_of_key() {
        assert_eq!(
            ComponentConfig::new(1, 1, 5.0).key(),
            ComponentConfig::new(1, 1, 9.0).key()
        );
    }
}
