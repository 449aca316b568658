// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Platform limits and capability flags.
// Selected at compile time with `cfg` where the value is fixed per target,
// queried at runtime where the OS owns the answer.

/// Longest name the random generator may produce, including the leading '/'
/// (minus one). FreeBSD limits names to 14 characters.
pub const MAX_SAFE_NAME_LENGTH: usize = 14;

/// Longest caller-supplied name accepted, including the leading '/'.
///
/// On macOS `PSHMNAMLEN` is 31. On Linux the limit is `NAME_MAX`.
#[cfg(target_os = "macos")]
pub const NAME_MAX_LEN: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const NAME_MAX_LEN: usize = 255;

/// Default queue depth used when creating a message queue.
pub const QUEUE_MESSAGES_MAX_DEFAULT: usize = 10;

/// Default maximum message size used when creating a message queue.
pub const QUEUE_MESSAGE_SIZE_MAX_DEFAULT: usize = 8192;

/// Highest message priority accepted by `send`.
pub const QUEUE_PRIORITY_MAX: u32 = 32767;

/// Largest value a semaphore may hold.
#[cfg(target_os = "macos")]
pub const SEMAPHORE_VALUE_MAX: u32 = 32767;

#[cfg(not(target_os = "macos"))]
pub const SEMAPHORE_VALUE_MAX: u32 = i32::MAX as u32;

/// Whether `sem_timedwait` exists. Without it, deadline waits poll.
pub const SEMAPHORE_TIMEOUT_SUPPORTED: bool = cfg!(not(target_os = "macos"));

/// Whether `sem_getvalue` works. macOS declares it but always fails.
pub const SEMAPHORE_VALUE_SUPPORTED: bool = cfg!(not(target_os = "macos"));

/// Whether POSIX message queues are available.
pub const MESSAGE_QUEUES_SUPPORTED: bool = cfg!(target_os = "linux");

/// The system page size.
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

/// The inclusive range of realtime signals available for user notification.
#[cfg(target_os = "linux")]
pub fn user_signal_range() -> std::ops::RangeInclusive<i32> {
    libc::SIGRTMIN()..=libc::SIGRTMAX()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn user_signals_are_above_standard_signals() {
        let range = user_signal_range();
        assert!(*range.start() > libc::SIGUSR2);
        assert!(range.start() <= range.end());
    }
}
