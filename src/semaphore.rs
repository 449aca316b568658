// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named POSIX semaphore (`sem_open` family).

use tracing::debug;

use crate::cancel::{Cancellation, NeverCancelled};
use crate::error::{IpcError, Operation, ResourceKind, Result};
use crate::handle::{HandleState, OpenFlags};
use crate::limits::SEMAPHORE_VALUE_MAX;
use crate::name::{NameGenerator, ResourceName};
use crate::platform::{self, RawSemaphore};
use crate::timeout::Timeout;

const KIND: ResourceKind = ResourceKind::Semaphore;

/// Parameters for opening or creating a [`Semaphore`].
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreOptions {
    pub flags: OpenFlags,
    pub mode: u32,
    pub initial_value: u32,
}

impl Default for SemaphoreOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::NONE,
            mode: 0o600,
            initial_value: 0,
        }
    }
}

impl SemaphoreOptions {
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

    pub fn initial_value(mut self, value: u32) -> Self {
        self.initial_value = value;
        self
    }

    /// Open the semaphore. `None` generates a random name and requires
    /// [`OpenFlags::CREX`].
    pub fn open(&self, name: Option<&str>) -> Result<Semaphore> {
        self.open_with(name, NameGenerator::process())
    }

    pub fn open_with(&self, name: Option<&str>, names: &NameGenerator) -> Result<Semaphore> {
        self.flags.validate()?;
        if self.initial_value > SEMAPHORE_VALUE_MAX {
            return Err(IpcError::invalid(format!(
                "the initial value must be <= {SEMAPHORE_VALUE_MAX}"
            )));
        }
        let request = NameGenerator::resolve(name, self.flags.is_exclusive())?;

        let (name, sem) = names
            .open_unique(request, |name| {
                RawSemaphore::open(
                    name.as_c_str(),
                    self.flags.bits(),
                    self.mode,
                    self.initial_value,
                )
            })
            .map_err(|(name, errno)| {
                debug!(name = %name, errno, "sem_open failed");
                IpcError::from_errno(KIND, Operation::Open, errno)
            })?;

        debug!(name = %name, flags = ?self.flags, "semaphore opened");
        Ok(Semaphore {
            name,
            mode: self.mode,
            state: HandleState::Open(sem),
        })
    }
}

/// A named, inter-process counting semaphore.
///
/// Dropping the handle does not call `sem_close`; use [`Semaphore::close`].
#[derive(Debug)]
pub struct Semaphore {
    name: ResourceName,
    mode: u32,
    state: HandleState<RawSemaphore>,
}

impl Semaphore {
    /// Open an existing semaphore with default options.
    pub fn open(name: &str) -> Result<Self> {
        SemaphoreOptions::default().open(Some(name))
    }

    /// Create a semaphore, opening it if it already exists.
    pub fn create(name: &str, initial_value: u32) -> Result<Self> {
        SemaphoreOptions::default()
            .flags(OpenFlags::CREAT)
            .initial_value(initial_value)
            .open(Some(name))
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Decrement the semaphore, waiting according to `timeout`.
    ///
    /// A signal during the wait yields [`IpcError::Signal`].
    pub fn acquire(&self, timeout: Timeout) -> Result<()> {
        self.acquire_cancellable(timeout, &NeverCancelled)
    }

    /// As [`acquire`](Self::acquire), but an interrupted wait for which
    /// `cancel` reports a cancellation yields [`IpcError::Cancelled`].
    pub fn acquire_cancellable(&self, timeout: Timeout, cancel: &dyn Cancellation) -> Result<()> {
        let sem = self.state.get(KIND)?;
        let rc = match timeout {
            Timeout::Unbounded => sem.wait(),
            Timeout::Immediate => sem.try_wait(),
            Timeout::Deadline(deadline) => sem.timed_wait(&deadline),
        };
        match rc {
            Ok(()) => Ok(()),
            Err(libc::EINTR) if cancel.is_cancelled() => {
                debug!(name = %self.name, "semaphore wait cancelled");
                Err(IpcError::Cancelled)
            }
            Err(errno) => Err(IpcError::from_errno(KIND, Operation::Wait, errno)),
        }
    }

    /// Increment the semaphore. Never blocks.
    pub fn release(&self) -> Result<()> {
        self.state
            .get(KIND)?
            .post()
            .map_err(|errno| IpcError::from_errno(KIND, Operation::Post, errno))
    }

    /// The current value.
    pub fn value(&self) -> Result<u32> {
        let sem = self.state.get(KIND)?;
        match sem.value() {
            // Linux reports 0 rather than a negative waiter count.
            Ok(v) => Ok(v.max(0) as u32),
            Err(libc::ENOSYS) => Err(IpcError::Unsupported("sem_getvalue")),
            Err(errno) => Err(IpcError::from_errno(KIND, Operation::Query, errno)),
        }
    }

    /// Acquire and return a guard that releases on drop.
    pub fn lock(&self, timeout: Timeout) -> Result<SemaphoreGuard<'_>> {
        self.acquire(timeout)?;
        Ok(SemaphoreGuard { sem: self })
    }

    /// `sem_close`. A second call fails with an existential error.
    pub fn close(&mut self) -> Result<()> {
        let sem = self.state.take(KIND)?;
        sem.close()
            .map_err(|errno| IpcError::from_errno(KIND, Operation::Close, errno))?;
        debug!(name = %self.name, "semaphore closed");
        Ok(())
    }

    /// Remove the name. Other processes keep their open handles.
    pub fn unlink(&self) -> Result<()> {
        unlink_semaphore(self.name.as_str())
    }
}

/// Holds one unit of a [`Semaphore`]; releases it on drop.
#[must_use = "dropping the guard releases the semaphore immediately"]
#[derive(Debug)]
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.sem.release() {
            debug!(name = %self.sem.name, error = %err, "release on guard drop failed");
        }
    }
}

/// `sem_unlink` by name.
pub fn unlink_semaphore(name: &str) -> Result<()> {
    let name = ResourceName::new(name)?;
    platform::sem_unlink(name.as_c_str())
        .map_err(|errno| IpcError::from_errno(KIND, Operation::Unlink, errno))?;
    debug!(name = %name, "semaphore unlinked");
    Ok(())
}
