// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Pieces shared by every resource handle: the open flags accepted by the
// option builders and the open/closed state of the underlying OS handle.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::error::{IpcError, ResourceKind, Result};

/// Creation flags for `*Options::flags`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(libc::c_int);

impl OpenFlags {
    /// Open an existing object only.
    pub const NONE: OpenFlags = OpenFlags(0);
    /// Create the object if it does not exist.
    pub const CREAT: OpenFlags = OpenFlags(libc::O_CREAT);
    /// With `CREAT`: fail if the object already exists.
    pub const EXCL: OpenFlags = OpenFlags(libc::O_EXCL);
    /// `CREAT | EXCL`.
    pub const CREX: OpenFlags = OpenFlags(libc::O_CREAT | libc::O_EXCL);
    /// Shared memory only: truncate an existing segment to zero.
    pub const TRUNC: OpenFlags = OpenFlags(libc::O_TRUNC);
    /// Message queues only: open in non-blocking mode.
    pub const NONBLOCK: OpenFlags = OpenFlags(libc::O_NONBLOCK);

    pub const fn bits(self) -> libc::c_int {
        self.0
    }

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_exclusive(self) -> bool {
        self.contains(OpenFlags::EXCL)
    }

    pub fn creates(self) -> bool {
        self.contains(OpenFlags::CREAT)
    }

    /// `EXCL` only makes sense together with `CREAT`.
    pub(crate) fn validate(self) -> Result<()> {
        if self.is_exclusive() && !self.creates() {
            return Err(IpcError::invalid("O_EXCL must be combined with O_CREAT"));
        }
        Ok(())
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (flag, label) in [
            (OpenFlags::CREAT, "CREAT"),
            (OpenFlags::EXCL, "EXCL"),
            (OpenFlags::TRUNC, "TRUNC"),
            (OpenFlags::NONBLOCK, "NONBLOCK"),
        ] {
            if self.contains(flag) {
                parts.push(label);
            }
        }
        if parts.is_empty() {
            f.write_str("OpenFlags(NONE)")
        } else {
            write!(f, "OpenFlags({})", parts.join(" | "))
        }
    }
}

/// The OS handle of a resource, or the fact that it has been closed.
#[derive(Debug)]
pub(crate) enum HandleState<H> {
    Open(H),
    Closed,
}

impl<H> HandleState<H> {
    pub(crate) fn get(&self, kind: ResourceKind) -> Result<&H> {
        match self {
            HandleState::Open(h) => Ok(h),
            HandleState::Closed => Err(IpcError::closed(kind)),
        }
    }

    /// Move to `Closed`, returning the handle that was open.
    pub(crate) fn take(&mut self, kind: ResourceKind) -> Result<H> {
        match std::mem::replace(self, HandleState::Closed) {
            HandleState::Open(h) => Ok(h),
            HandleState::Closed => Err(IpcError::closed(kind)),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, HandleState::Open(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excl_requires_creat() {
        assert!(OpenFlags::CREX.validate().is_ok());
        assert!(OpenFlags::NONE.validate().is_ok());
        assert!(matches!(
            OpenFlags::EXCL.validate(),
            Err(IpcError::InvalidArgument(_))
        ));
        assert!((OpenFlags::CREAT | OpenFlags::EXCL).is_exclusive());
    }

    #[test]
    fn debug_lists_flags() {
        assert_eq!(format!("{:?}", OpenFlags::CREX), "OpenFlags(CREAT | EXCL)");
        assert_eq!(format!("{:?}", OpenFlags::NONE), "OpenFlags(NONE)");
    }

    #[test]
    fn state_closes_once() {
        let mut state = HandleState::Open(7);
        assert_eq!(*state.get(ResourceKind::Semaphore).unwrap(), 7);
        assert_eq!(state.take(ResourceKind::Semaphore).unwrap(), 7);
        assert!(!state.is_open());
        assert!(state.take(ResourceKind::Semaphore).unwrap_err().is_existential());
        assert!(state.get(ResourceKind::Semaphore).unwrap_err().is_existential());
    }
}
