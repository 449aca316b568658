// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RAII guard that holds a named semaphore for the lifetime of the access,
// providing read/write to a mapped shared memory region.

use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::{IpcError, Result};
use crate::semaphore::Semaphore;
use crate::shm::MappedRegion;
use crate::timeout::Timeout;

/// RAII guard: acquires the semaphore on construction, releases on drop.
/// Provides `read()` / `write()` access to the underlying region.
pub struct ScopedAccess<'a> {
    region: &'a MappedRegion,
    sem: &'a Semaphore,
}

impl<'a> ScopedAccess<'a> {
    /// Acquire `sem` within `timeout` and grant access to `region`.
    pub fn new(region: &'a MappedRegion, sem: &'a Semaphore, timeout: Timeout) -> Result<Self> {
        sem.acquire(timeout)?;
        Ok(Self { region, sem })
    }

    /// As [`new`](Self::new), with a cancellation hook for the wait.
    pub fn with_cancellation(
        region: &'a MappedRegion,
        sem: &'a Semaphore,
        timeout: Timeout,
        cancel: &dyn Cancellation,
    ) -> Result<Self> {
        sem.acquire_cancellable(timeout, cancel)?;
        Ok(Self { region, sem })
    }

    /// Copy the whole region.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.region.len()];
        self.region.read_at(0, &mut buf)?;
        Ok(buf)
    }

    /// Write `buf` at the start of the region.
    ///
    /// # Errors
    /// `InvalidArgument` if `buf` is larger than the region.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        if buf.len() > self.region.len() {
            return Err(IpcError::invalid(format!(
                "buffer too large for shared memory region ({} > {})",
                buf.len(),
                self.region.len()
            )));
        }
        self.region.write_at(0, buf)
    }

    /// Read a NUL-terminated string from the start of the region. Reads
    /// the whole region if no NUL is present.
    pub fn read_str(&self) -> Result<String> {
        let mut bytes = self.read()?;
        if let Some(end) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(end);
        }
        String::from_utf8(bytes).map_err(|_| IpcError::invalid("region does not hold UTF-8 text"))
    }

    /// Write `s` followed by a NUL terminator.
    pub fn write_str(&self, s: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        self.write(&bytes)
    }

    /// Total mapped size.
    pub fn size(&self) -> usize {
        self.region.len()
    }
}

impl Drop for ScopedAccess<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.sem.release() {
            debug!(error = %err, "scoped access release failed");
        }
    }
}
