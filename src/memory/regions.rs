//! Shared memory region implementation

use std::{
    ffi::CString,
    fs::{File, OpenOptions},
    io::ErrorKind,
    os::fd::{AsRawFd, OwnedFd, RawFd},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use log::debug;
use memmap2::{MmapMut, MmapOptions};
#[cfg(target_os = "linux")]
use nix::{
    sys::memfd::{memfd_create, MemFdCreateFlag},
    unistd::ftruncate,
};

use crate::error::{Result, ShmConfError};

use super::config::{BackingType, RegionConfig};

/// Descriptive information about a mapped region
#[derive(Debug, Clone)]
pub struct RegionInfo {
    /// Name of the region
    pub name: String,
    /// Mapped size in bytes
    pub size: usize,
    /// Type of backing storage
    pub backing_type: BackingType,
    /// Backing file, if the region is file-backed
    pub path: Option<PathBuf>,
    /// Whether this handle created the OS object
    pub created: bool,
}

/// A fixed-size, zero-initialized byte buffer shared between processes.
///
/// The mapping stays at the same address for the lifetime of the handle;
/// other processes may map it at a different base, so everything stored
/// inside the region must be addressed by offset.
#[derive(Debug)]
pub struct SharedMemoryRegion {
    info: RegionInfo,
    mmap: MmapMut,
    base: NonNull<u8>,
    _file: Option<File>,
    _owned_fd: Option<OwnedFd>,
    fd: RawFd,
    cleanup_on_close: AtomicBool,
}

impl SharedMemoryRegion {
    /// Create or open a shared memory region, depending on `config.create`
    pub fn new(config: RegionConfig) -> Result<Self> {
        if config.create {
            Self::create(config)
        } else {
            Self::open(config)
        }
    }

    /// Create a new region. Fails with `RegionExists` if a file-backed
    /// region is already present at the configured path.
    pub fn create(mut config: RegionConfig) -> Result<Self> {
        config.create = true;
        config.validate()?;

        let (file, owned_fd, path) = match config.backing_type {
            BackingType::FileBacked => {
                let (file, path) = Self::create_file_backing(&config)?;
                (Some(file), None, Some(path))
            }
            #[cfg(target_os = "linux")]
            BackingType::MemFd => (None, Some(Self::create_memfd_backing(&config)?), None),
        };

        let created_path = path.clone();
        let region = Self::map(config, file, owned_fd, path, true).map_err(|e| {
            if let Some(path) = &created_path {
                remove_created_file(path);
            }
            e
        })?;
        debug!(
            "created {} region '{}' ({} bytes)",
            region.info.backing_type.name(),
            region.info.name,
            region.info.size
        );
        Ok(region)
    }

    /// Open an existing file-backed region by name or path
    pub fn open(mut config: RegionConfig) -> Result<Self> {
        config.create = false;
        config.validate()?;

        let path = config.default_file_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ShmConfError::region_not_found(&config.name),
                _ => ShmConfError::from_io(e, "Failed to open existing region"),
            })?;

        let file_len = file
            .metadata()
            .map_err(|e| ShmConfError::from_io(e, "Failed to stat region file"))?
            .len() as usize;

        if config.size == 0 {
            config.size = file_len;
        } else if config.size > file_len {
            return Err(ShmConfError::invalid_parameter(
                "size",
                format!(
                    "Requested {} bytes but region '{}' holds only {}",
                    config.size, config.name, file_len
                ),
            ));
        }

        if config.size == 0 {
            return Err(ShmConfError::invalid_layout(format!(
                "Region '{}' is empty",
                config.name
            )));
        }

        let region = Self::map(config, Some(file), None, Some(path), false)?;
        debug!(
            "opened region '{}' ({} bytes)",
            region.info.name, region.info.size
        );
        Ok(region)
    }

    /// Create file-backed storage
    fn create_file_backing(config: &RegionConfig) -> Result<(File, PathBuf)> {
        let path = config.default_file_path();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(config.permissions)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ShmConfError::region_exists(&config.name),
                _ => ShmConfError::from_io(e, "Failed to create region file"),
            })?;

        // A freshly extended file reads back as zeros
        if let Err(e) = file.set_len(config.size as u64) {
            remove_created_file(&path);
            return Err(ShmConfError::from_io(e, "Failed to set file size"));
        }

        Ok((file, path))
    }

    /// Create memfd-backed storage
    #[cfg(target_os = "linux")]
    fn create_memfd_backing(config: &RegionConfig) -> Result<OwnedFd> {
        let name_cstr = CString::new(config.name.clone())
            .map_err(|_| ShmConfError::invalid_parameter("name", "Name contains null bytes"))?;

        let owned_fd = memfd_create(&name_cstr, MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|e| ShmConfError::platform(format!("Failed to create memfd: {}", e)))?;

        ftruncate(&owned_fd, config.size as libc::off_t)
            .map_err(|e| ShmConfError::platform(format!("Failed to set memfd size: {}", e)))?;

        Ok(owned_fd)
    }

    fn map(
        config: RegionConfig,
        file: Option<File>,
        owned_fd: Option<OwnedFd>,
        path: Option<PathBuf>,
        created: bool,
    ) -> Result<Self> {
        let mut mmap = match (&file, &owned_fd) {
            (Some(f), _) => unsafe { MmapOptions::new().len(config.size).map_mut(f) },
            (None, Some(fd)) => unsafe { MmapOptions::new().len(config.size).map_mut(fd) },
            (None, None) => {
                return Err(ShmConfError::platform(
                    "No file or owned fd available for mapping",
                ))
            }
        }
        .map_err(|e| ShmConfError::from_io(e, "Failed to create memory mapping"))?;

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| ShmConfError::platform("Mapping returned a null pointer"))?;

        let fd = match (&file, &owned_fd) {
            (Some(f), _) => f.as_raw_fd(),
            (None, Some(fd)) => fd.as_raw_fd(),
            (None, None) => -1,
        };

        let info = RegionInfo {
            name: config.name,
            size: config.size,
            backing_type: config.backing_type,
            path,
            created,
        };

        Ok(Self {
            info,
            mmap,
            base,
            _file: file,
            _owned_fd: owned_fd,
            fd,
            cleanup_on_close: AtomicBool::new(config.cleanup_on_close),
        })
    }

    /// Get the region information
    pub fn info(&self) -> &RegionInfo {
        &self.info
    }

    /// Get the size of the region
    pub fn size(&self) -> usize {
        self.info.size
    }

    /// Get the name of the region
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Whether this handle created the underlying OS object
    pub fn is_creator(&self) -> bool {
        self.info.created
    }

    /// Base address of the mapping in this process.
    ///
    /// Only valid for this handle; never store it inside the region.
    pub fn base_ptr(&self) -> NonNull<u8> {
        self.base
    }

    /// Atomic `u32` view of the bytes at `offset`
    pub fn atomic_u32(&self, offset: usize) -> Result<&AtomicU32> {
        self.check_atomic_access(offset, 4)?;
        // SAFETY: in bounds, aligned, and the mapping outlives `&self`.
        Ok(unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU32) })
    }

    /// Atomic `u64` view of the bytes at `offset`
    pub fn atomic_u64(&self, offset: usize) -> Result<&AtomicU64> {
        self.check_atomic_access(offset, 8)?;
        // SAFETY: in bounds, aligned, and the mapping outlives `&self`.
        Ok(unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU64) })
    }

    fn check_atomic_access(&self, offset: usize, width: usize) -> Result<()> {
        let end = offset.checked_add(width).unwrap_or(usize::MAX);
        if end > self.info.size {
            return Err(ShmConfError::invalid_parameter(
                "offset",
                format!("{}..{} exceeds region size {}", offset, end, self.info.size),
            ));
        }
        if (self.base.as_ptr() as usize + offset) % width != 0 {
            return Err(ShmConfError::invalid_parameter(
                "offset",
                format!("{} is not aligned to {}", offset, width),
            ));
        }
        Ok(())
    }

    /// Flush changes to the backing file
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| ShmConfError::from_io(e, "Failed to flush memory mapping"))
    }

    /// Get the file descriptor
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Check if the region is file-backed
    pub fn is_file_backed(&self) -> bool {
        matches!(self.info.backing_type, BackingType::FileBacked)
    }

    /// Remove the backing file when this handle is dropped
    pub fn set_cleanup_on_close(&self, cleanup: bool) {
        self.cleanup_on_close.store(cleanup, Ordering::Relaxed);
    }

    /// Whether the backing file is removed when this handle is dropped
    pub fn cleanup_on_close(&self) -> bool {
        self.cleanup_on_close.load(Ordering::Relaxed)
    }
}

fn remove_created_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("failed to remove region file {}: {}", path.display(), e);
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        if !self.cleanup_on_close() {
            return;
        }
        if let Some(path) = &self.info.path {
            remove_created_file(path);
        }
    }
}

// SAFETY: the mapping is process-shared memory; all mutation inside it goes
// through atomics or through slots owned by a single claimant.
unsafe impl Send for SharedMemoryRegion {}
unsafe impl Sync for SharedMemoryRegion {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_config(dir: &TempDir, name: &str, size: usize) -> RegionConfig {
        RegionConfig::new(name, size).with_file_path(dir.path().join(name))
    }

    #[test]
    fn test_create_file_backed_region() {
        let temp_dir = TempDir::new().unwrap();
        let region = SharedMemoryRegion::create(file_config(&temp_dir, "create", 4096)).unwrap();

        assert_eq!(region.name(), "create");
        assert_eq!(region.size(), 4096);
        assert!(region.is_file_backed());
        assert!(region.is_creator());
        assert_eq!(region.atomic_u64(0).unwrap().load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_create_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        let _first = SharedMemoryRegion::create(file_config(&temp_dir, "twice", 4096)).unwrap();
        let second = SharedMemoryRegion::create(file_config(&temp_dir, "twice", 4096));
        assert!(matches!(second, Err(ShmConfError::RegionExists { .. })));
    }

    #[test]
    fn test_open_sees_creator_writes() {
        let temp_dir = TempDir::new().unwrap();
        let creator = SharedMemoryRegion::create(file_config(&temp_dir, "shared", 8192)).unwrap();
        let opener = SharedMemoryRegion::open(
            RegionConfig::open("shared").with_file_path(temp_dir.path().join("shared")),
        )
        .unwrap();

        assert_eq!(opener.size(), 8192);
        assert!(!opener.is_creator());

        creator.atomic_u32(128).unwrap().store(42, Ordering::Release);
        assert_eq!(opener.atomic_u32(128).unwrap().load(Ordering::Acquire), 42);
    }

    #[test]
    fn test_open_missing_region() {
        let temp_dir = TempDir::new().unwrap();
        let result = SharedMemoryRegion::open(
            RegionConfig::open("missing").with_file_path(temp_dir.path().join("missing")),
        );
        assert!(matches!(result, Err(ShmConfError::RegionNotFound { .. })));
    }

    #[test]
    fn test_cleanup_on_close_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cleanup");
        {
            let _region = SharedMemoryRegion::create(
                file_config(&temp_dir, "cleanup", 4096).with_cleanup_on_close(true),
            )
            .unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_cleanup_flag_can_be_cleared_after_create() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kept");
        {
            let region = SharedMemoryRegion::create(
                file_config(&temp_dir, "kept", 4096).with_cleanup_on_close(true),
            )
            .unwrap();
            assert!(region.cleanup_on_close());
            region.set_cleanup_on_close(false);
        }
        assert!(path.exists());
    }

    #[test]
    fn test_failed_create_leaves_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("huge");

        // Either sizing the file or mapping it fails for a petabyte region
        let result = SharedMemoryRegion::create(file_config(&temp_dir, "huge", 1 << 50));
        assert!(result.is_err());
        assert!(!path.exists());

        let region = SharedMemoryRegion::create(file_config(&temp_dir, "huge", 4096)).unwrap();
        assert_eq!(region.size(), 4096);
    }

    #[test]
    fn test_atomic_access_checks() {
        let temp_dir = TempDir::new().unwrap();
        let region = SharedMemoryRegion::create(file_config(&temp_dir, "bounds", 4096)).unwrap();

        assert!(region.atomic_u64(4088).is_ok());
        assert!(region.atomic_u64(4090).is_err());
        assert!(region.atomic_u32(6).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_create_memfd_region() {
        let region = SharedMemoryRegion::create(
            RegionConfig::new("memfd", 4096).with_backing_type(BackingType::MemFd),
        )
        .unwrap();

        assert!(!region.is_file_backed());
        assert!(region.fd() >= 0);
        assert!(region.info().path.is_none());
    }
}
