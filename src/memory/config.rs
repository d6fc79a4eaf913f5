//! Configuration types for shared memory regions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, ShmConfError};

/// Prefix used for the default backing path of named regions
pub const DEFAULT_PATH_PREFIX: &str = "/tmp/shmconf_";

/// Types of shared memory backing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingType {
    /// File-backed shared memory, openable by name from any process
    FileBacked,
    /// Anonymous memory file descriptor (Linux-specific), shared across fork only
    #[cfg(target_os = "linux")]
    MemFd,
}

impl Default for BackingType {
    fn default() -> Self {
        Self::FileBacked
    }
}

impl BackingType {
    /// Check if this backing type is supported on the current platform
    pub fn is_supported(&self) -> bool {
        match self {
            BackingType::FileBacked => true,
            #[cfg(target_os = "linux")]
            BackingType::MemFd => true,
        }
    }

    /// Whether another process can attach to the region by name
    pub fn is_nameable(&self) -> bool {
        matches!(self, BackingType::FileBacked)
    }

    /// Get a human-readable name for the backing type
    pub fn name(&self) -> &'static str {
        match self {
            BackingType::FileBacked => "file-backed",
            #[cfg(target_os = "linux")]
            BackingType::MemFd => "memfd",
        }
    }
}

/// Configuration for creating or opening shared memory regions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Name of the shared memory region
    pub name: String,
    /// Total size of the region in bytes (0 when opening means "use the existing size")
    pub size: usize,
    /// Backing type for the shared memory
    pub backing_type: BackingType,
    /// Optional file path for file-backed regions
    pub file_path: Option<PathBuf>,
    /// Whether to create the region (true) or open an existing one (false)
    pub create: bool,
    /// Permissions for the region (Unix permissions)
    pub permissions: u32,
    /// Remove the backing file when this handle is dropped
    pub cleanup_on_close: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            backing_type: BackingType::default(),
            file_path: None,
            create: true,
            permissions: 0o644,
            cleanup_on_close: false,
        }
    }
}

impl RegionConfig {
    /// Create a new region configuration
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Configuration for attaching to an existing region by name
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: false,
            ..Default::default()
        }
    }

    /// Set the backing type
    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    /// Set the file path for file-backed regions
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Set whether to create the region if it doesn't exist
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Set the permissions for the region
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Remove the backing file when the handle closes
    pub fn with_cleanup_on_close(mut self, cleanup: bool) -> Self {
        self.cleanup_on_close = cleanup;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ShmConfError::invalid_parameter(
                "name",
                "Region name cannot be empty",
            ));
        }

        if self.name.contains('/') || self.name.contains('\0') {
            return Err(ShmConfError::invalid_parameter(
                "name",
                "Region name cannot contain '/' or NUL",
            ));
        }

        if self.create && self.size == 0 {
            return Err(ShmConfError::invalid_parameter(
                "size",
                "Region size must be greater than 0",
            ));
        }

        if !self.backing_type.is_supported() {
            return Err(ShmConfError::invalid_parameter(
                "backing_type",
                format!(
                    "Backing type {} is not supported on this platform",
                    self.backing_type.name()
                ),
            ));
        }

        if !self.create && !self.backing_type.is_nameable() {
            return Err(ShmConfError::invalid_parameter(
                "backing_type",
                format!(
                    "A {} region cannot be opened by name",
                    self.backing_type.name()
                ),
            ));
        }

        Ok(())
    }

    /// Get the default file path for this region
    pub fn default_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}{}", DEFAULT_PATH_PREFIX, self.name)))
    }
}
