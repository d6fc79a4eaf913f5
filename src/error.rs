//! Error types and handling for shmconf

/// Result type alias for shmconf operations
pub type Result<T> = std::result::Result<T, ShmConfError>;

/// Errors surfaced by the shared configuration store and its region layer
#[derive(Debug, thiserror::Error)]
pub enum ShmConfError {
    /// I/O related errors (file operations, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Region not found or doesn't exist
    #[error("Region not found: {name}")]
    RegionNotFound { name: String },

    /// Region already exists
    #[error("Region already exists: {name}")]
    RegionExists { name: String },

    /// Every slot of the table is occupied by another key
    #[error("Table capacity exhausted: all {capacity} slots are in use")]
    CapacityExhausted { capacity: u32 },

    /// Insert targeted a key that is already present
    #[error("Record already exists: {key}")]
    AlreadyExists { key: String },

    /// No slot holds the requested key
    #[error("Record not found: {key}")]
    NotFound { key: String },

    /// The record type was never registered with the schema registry
    #[error("Schema not registered: {type_name}")]
    SchemaNotRegistered { type_name: String },

    /// The region was created with a different layout for this record type
    #[error("Schema mismatch for {type_name}: {message}")]
    SchemaMismatch { type_name: String, message: String },

    /// The region does not hold a valid table layout
    #[error("Invalid layout: {message}")]
    InvalidLayout { message: String },

    /// Layout version mismatch between the region and this build
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    /// Concurrency related errors
    #[error("Concurrency error: {message}")]
    Concurrency { message: String },

    /// Platform-specific errors
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl ShmConfError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a region not found error
    pub fn region_not_found(name: impl Into<String>) -> Self {
        Self::RegionNotFound { name: name.into() }
    }

    /// Create a region exists error
    pub fn region_exists(name: impl Into<String>) -> Self {
        Self::RegionExists { name: name.into() }
    }

    /// Create a capacity exhausted error
    pub fn capacity_exhausted(capacity: u32) -> Self {
        Self::CapacityExhausted { capacity }
    }

    /// Create an already exists error
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a schema not registered error
    pub fn schema_not_registered(type_name: impl Into<String>) -> Self {
        Self::SchemaNotRegistered {
            type_name: type_name.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid layout error
    pub fn invalid_layout(message: impl Into<String>) -> Self {
        Self::InvalidLayout {
            message: message.into(),
        }
    }

    /// Create a version mismatch error
    pub fn version_mismatch(expected: u64, actual: u64) -> Self {
        Self::VersionMismatch { expected, actual }
    }

    /// Create a concurrency error
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency {
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// True for the errors a caller may treat as an expected outcome
    /// rather than a fault (absence, duplicate, full table).
    pub fn is_table_outcome(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::CapacityExhausted { .. }
        )
    }
}

impl From<std::io::Error> for ShmConfError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}
