// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Adaptive backoff for polling loops: spin → pause → yield → sleep.
// Used where the OS lacks a timed wait and by callers that hand a
// semaphore back and forth in a tight loop.

use std::time::Duration;

/// Progressive backoff state. Each `snooze()` escalates:
///
/// - k < 4:  busy spin (do nothing)
/// - k < 16: CPU pause hint
/// - k < 32: thread yield
/// - k >= 32: sleep 1ms
#[derive(Debug, Default, Clone)]
pub struct Backoff {
    k: u32,
}

impl Backoff {
    pub const fn new() -> Self {
        Self { k: 0 }
    }

    #[inline]
    pub fn snooze(&mut self) {
        if self.k < 4 {
            // busy spin
        } else if self.k < 16 {
            std::hint::spin_loop();
        } else if self.k < 32 {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_millis(1));
            return;
        }
        self.k += 1;
    }

    /// Whether the backoff has escalated to sleeping.
    pub fn is_sleeping(&self) -> bool {
        self.k >= 32
    }

    pub fn reset(&mut self) {
        self.k = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_to_sleep() {
        let mut b = Backoff::new();
        for _ in 0..32 {
            assert!(!b.is_sleeping());
            b.snooze();
        }
        assert!(b.is_sleeping());
        b.reset();
        assert!(!b.is_sleeping());
    }
}
