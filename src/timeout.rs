// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Timeout normalization for blocking operations.
// A caller-supplied duration becomes one of: wait forever, poll once, or
// wait until an absolute wall-clock deadline fixed at normalization time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{IpcError, Result};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// An absolute point on the realtime clock, as consumed by `sem_timedwait`
/// and `mq_timedsend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    secs: u64,
    nanos: u32,
}

impl Deadline {
    /// `now + after`, computed once.
    pub fn after(after: Duration) -> Self {
        Self::from_epoch_offset(now_since_epoch().saturating_add(after))
    }

    /// The deadline that has already been reached.
    pub fn now() -> Self {
        Self::from_epoch_offset(now_since_epoch())
    }

    fn from_epoch_offset(d: Duration) -> Self {
        Self {
            secs: d.as_secs(),
            nanos: d.subsec_nanos(),
        }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Time left until the deadline, zero if it has passed.
    pub fn remaining(&self) -> Duration {
        let at = Duration::new(self.secs, self.nanos);
        at.saturating_sub(now_since_epoch())
    }

    pub fn is_elapsed(&self) -> bool {
        self.remaining().is_zero()
    }

    pub(crate) fn as_timespec(&self) -> libc::timespec {
        debug_assert!(self.nanos < NANOS_PER_SEC);
        libc::timespec {
            tv_sec: self.secs.min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: self.nanos as libc::c_long,
        }
    }
}

/// Normalized wait policy for a blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Block until the operation can proceed.
    #[default]
    Unbounded,
    /// Never block; fail with `Busy` if the operation cannot proceed now.
    Immediate,
    /// Block until the operation can proceed or the deadline passes.
    Deadline(Deadline),
}

impl Timeout {
    /// `None` waits forever, zero polls, anything else becomes a deadline.
    pub fn normalize(duration: Option<Duration>) -> Self {
        match duration {
            None => Timeout::Unbounded,
            Some(d) if d.is_zero() => Timeout::Immediate,
            Some(d) => Timeout::Deadline(Deadline::after(d)),
        }
    }

    /// Normalize a timeout given in (possibly fractional) seconds, the way a
    /// host front-end hands it over. Negative and non-finite values are
    /// rejected before any OS call is made.
    pub fn from_secs_f64(secs: Option<f64>) -> Result<Self> {
        match secs {
            None => Ok(Timeout::Unbounded),
            Some(s) if !s.is_finite() || s < 0.0 => Err(IpcError::invalid(
                "the timeout must be None or a non-negative number",
            )),
            Some(s) => Ok(Self::normalize(Some(duration_from_secs_f64(s)?))),
        }
    }

    /// Shorthand for `Timeout::normalize(Some(d))`.
    pub fn after(d: Duration) -> Self {
        Self::normalize(Some(d))
    }

    /// The deadline an OS timed call should use. `Immediate` maps to a
    /// deadline that has already passed so timed calls fail at once.
    pub(crate) fn deadline_for_timed_call(&self) -> Option<Deadline> {
        match self {
            Timeout::Unbounded => None,
            Timeout::Immediate => Some(Deadline::now()),
            Timeout::Deadline(d) => Some(*d),
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        Timeout::normalize(d)
    }
}

/// Convert a non-negative number of seconds to a `Duration`.
///
/// Values too large to represent saturate to `Duration::MAX`. A positive
/// value below one nanosecond rounds up to one nanosecond so it still means
/// "wait", never "poll".
pub fn duration_from_secs_f64(secs: f64) -> Result<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return Err(IpcError::invalid("the timeout must be a non-negative number"));
    }
    let d = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
    if secs > 0.0 && d.is_zero() {
        return Ok(Duration::from_nanos(1));
    }
    Ok(d)
}

fn now_since_epoch() -> Duration {
    // The realtime clock is before 1970 only on a broken system; treat that
    // as the epoch rather than failing a wait.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}
