// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cancellation hook for blocking waits.
// When a wait returns EINTR, the hook decides whether the interruption was
// the caller's own cancellation gesture (propagated as `Cancelled`) or some
// other signal (reported as `Signal`).

use std::sync::atomic::{AtomicBool, Ordering};

/// Answers "did the user ask to cancel?" after a wait was interrupted.
pub trait Cancellation: Sync {
    fn is_cancelled(&self) -> bool;
}

/// Never reports a cancellation. Every interruption is a `Signal` error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancelled;

impl Cancellation for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A flag set from a signal handler or another thread.
///
/// Only atomics are touched, so `cancel()` is async-signal-safe.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl Cancellation for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl<F> Cancellation for F
where
    F: Fn() -> bool + Sync,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_round_trip() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn closures_are_hooks() {
        let hook = || true;
        assert!(hook.is_cancelled());
        assert!(!NeverCancelled.is_cancelled());
    }
}
