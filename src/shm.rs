// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named POSIX shared memory segment (`shm_open` family).
// The segment handle owns a file descriptor; mapping it produces a separate
// `MappedRegion` that outlives the descriptor.

use std::os::fd::RawFd;
use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::error::{IpcError, Operation, ResourceKind, Result};
use crate::handle::{HandleState, OpenFlags};
use crate::name::{NameGenerator, ResourceName};
use crate::platform;

const KIND: ResourceKind = ResourceKind::SharedMemory;

/// Parameters for opening or creating a [`SharedMemory`] segment.
#[derive(Debug, Clone, Copy)]
pub struct SharedMemoryOptions {
    pub flags: OpenFlags,
    pub mode: u32,
    /// If non-zero, the segment is resized to this many bytes after opening.
    pub size: u64,
    pub read_only: bool,
}

impl Default for SharedMemoryOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::NONE,
            mode: 0o600,
            size: 0,
            read_only: false,
        }
    }
}

impl SharedMemoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Open the segment. `None` generates a random name and requires
    /// [`OpenFlags::CREX`].
    pub fn open(&self, name: Option<&str>) -> Result<SharedMemory> {
        self.open_with(name, NameGenerator::process())
    }

    pub fn open_with(&self, name: Option<&str>, names: &NameGenerator) -> Result<SharedMemory> {
        self.flags.validate()?;
        let request = NameGenerator::resolve(name, self.flags.is_exclusive())?;

        let access = if self.read_only {
            libc::O_RDONLY
        } else {
            libc::O_RDWR
        };
        let flags = self.flags.bits() | access;

        let (name, fd) = names
            .open_unique(request, |name| {
                platform::shm_open(name.as_c_str(), flags, self.mode)
            })
            .map_err(|(name, errno)| {
                debug!(name = %name, errno, "shm_open failed");
                IpcError::from_errno(KIND, Operation::Open, errno)
            })?;

        if self.size > 0 {
            if let Err(errno) = platform::ftruncate(fd, self.size) {
                // Undo the open so the caller sees a clean failure.
                if let Err(e) = platform::close_fd(fd) {
                    warn!(name = %name, errno = e, "rollback close failed");
                }
                if let Err(e) = platform::shm_unlink(name.as_c_str()) {
                    warn!(name = %name, errno = e, "rollback unlink failed");
                }
                return Err(IpcError::from_errno(KIND, Operation::Resize, errno));
            }
        }

        debug!(name = %name, fd, size = self.size, "shared memory opened");
        Ok(SharedMemory {
            name,
            mode: self.mode,
            read_only: self.read_only,
            fd: HandleState::Open(fd),
        })
    }
}

/// A named shared memory segment.
///
/// Dropping the handle does not close the descriptor; use
/// [`SharedMemory::close_descriptor`].
#[derive(Debug)]
pub struct SharedMemory {
    name: ResourceName,
    mode: u32,
    read_only: bool,
    fd: HandleState<RawFd>,
}

impl SharedMemory {
    /// Create a segment of `size` bytes, opening it if it already exists.
    pub fn create(name: &str, size: u64) -> Result<Self> {
        SharedMemoryOptions::default()
            .flags(OpenFlags::CREAT)
            .size(size)
            .open(Some(name))
    }

    /// Open an existing segment read-write.
    pub fn open(name: &str) -> Result<Self> {
        SharedMemoryOptions::default().open(Some(name))
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The descriptor, or `None` once closed. Zero is a valid descriptor.
    pub fn fd(&self) -> Option<RawFd> {
        self.fd.get(KIND).ok().copied()
    }

    /// Current size as reported by `fstat`.
    pub fn size(&self) -> Result<u64> {
        let fd = *self.fd.get(KIND)?;
        platform::fstat_size(fd).map_err(|errno| IpcError::from_errno(KIND, Operation::Query, errno))
    }

    /// Map the whole segment into this process.
    pub fn map(&self) -> Result<MappedRegion> {
        let fd = *self.fd.get(KIND)?;
        let size = self.size()?;
        let len = usize::try_from(size)
            .map_err(|_| IpcError::invalid("the segment is too large to map"))?;
        if len == 0 {
            return Err(IpcError::invalid("cannot map a segment of size zero"));
        }
        let ptr = platform::mmap(fd, len, !self.read_only)
            .map_err(|errno| IpcError::from_errno(KIND, Operation::Map, errno))?;
        debug!(name = %self.name, len, "shared memory mapped");
        Ok(MappedRegion {
            ptr: Some(ptr),
            len,
            writable: !self.read_only,
        })
    }

    /// Close the descriptor. Existing mappings stay valid. Closing an
    /// already closed descriptor succeeds.
    pub fn close_descriptor(&mut self) -> Result<()> {
        let Ok(fd) = self.fd.take(KIND) else {
            return Ok(());
        };
        platform::close_fd(fd).map_err(|errno| IpcError::from_errno(KIND, Operation::Close, errno))
    }

    pub fn unlink(&self) -> Result<()> {
        unlink_shared_memory(self.name.as_str())
    }
}

/// A `mmap`ed view of a shared memory segment. Unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: Option<NonNull<u8>>,
    len: usize,
    writable: bool,
}

// Safety: the region is plain shared memory; callers coordinate concurrent
// access across processes anyway (see `ScopedAccess`).
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_mapped(&self) -> bool {
        self.ptr.is_some()
    }

    fn base(&self) -> Result<NonNull<u8>> {
        self.ptr.ok_or_else(|| IpcError::Existential {
            message: "the region has been unmapped".to_string(),
        })
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(IpcError::invalid(format!(
                "range {offset}..{} is outside the {}-byte region",
                offset.saturating_add(len),
                self.len
            ))),
        }
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let base = self.base()?;
        self.check_range(offset, buf.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(base.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy `data` into the region starting at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let base = self.base()?;
        if !self.writable {
            return Err(IpcError::Permissions {
                message: "the memory is read-only".to_string(),
            });
        }
        self.check_range(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.as_ptr().add(offset), data.len());
        }
        Ok(())
    }

    /// Raw pointer to the start of the mapping, or null once unmapped.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.map_or(std::ptr::null(), |p| p.as_ptr() as *const u8)
    }

    /// Mutable raw pointer; null once unmapped or for read-only mappings.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        match self.ptr {
            Some(p) if self.writable => p.as_ptr(),
            _ => std::ptr::null_mut(),
        }
    }

    /// `munmap`. A second call fails with an existential error.
    pub fn unmap(&mut self) -> Result<()> {
        let ptr = self.base()?;
        self.ptr = None;
        unsafe { platform::munmap(ptr, self.len) }
            .map_err(|errno| IpcError::from_errno(KIND, Operation::Map, errno))
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            if let Err(errno) = unsafe { platform::munmap(ptr, self.len) } {
                warn!(errno, len = self.len, "munmap on drop failed");
            }
        }
    }
}

/// `shm_unlink` by name.
pub fn unlink_shared_memory(name: &str) -> Result<()> {
    let name = ResourceName::new(name)?;
    platform::shm_unlink(name.as_c_str())
        .map_err(|errno| IpcError::from_errno(KIND, Operation::Unlink, errno))?;
    debug!(name = %name, "shared memory unlinked");
    Ok(())
}
