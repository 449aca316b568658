// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub(crate) mod posix;

// Re-export the raw call wrappers under a uniform name.

#[cfg(unix)]
pub(crate) use posix::*;
