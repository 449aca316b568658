// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Two-party hash handshake over one semaphore and one shared memory segment.
//
// The semaphore is a turn token. Each side takes a turn, and if the segment
// holds something new, checks that it is the digest of what it last wrote,
// then writes the digest of what it read. A value that is neither means the
// semaphore failed to provide mutual exclusion.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::cancel::Cancellation;
use crate::error::IpcError;
use crate::handle::OpenFlags;
use crate::scoped_access::ScopedAccess;
use crate::semaphore::{unlink_semaphore, Semaphore, SemaphoreOptions};
use crate::shm::{unlink_shared_memory, MappedRegion, SharedMemory, SharedMemoryOptions};
use crate::timeout::Timeout;

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// The handshake digest: FNV-1a of `s` as 16 lowercase hex digits.
pub fn digest(s: &str) -> String {
    format!("{:016x}", fnv1a_64(s.as_bytes()))
}

/// `digest` applied `n` times.
pub fn digest_n(s: &str, n: usize) -> String {
    (0..n).fold(s.to_string(), |acc, _| digest(&acc))
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error("shared memory corruption after {iterations} iterations: read {found:?}, expected {expected:?}")]
    Corruption {
        iterations: usize,
        found: String,
        expected: String,
    },

    #[error("the peer made no progress for {0:?}")]
    Stalled(Duration),
}

/// Which side of the handshake to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the resources, writes the seed and removes them at the end.
    Premise,
    /// Opens the resources the premise created and answers.
    Conclusion,
}

#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub semaphore_name: String,
    pub shared_memory_name: String,
    pub size: u64,
    pub mode: u32,
    /// Number of replies each side verifies before stopping.
    pub iterations: usize,
    /// How long to wait for the peer (for the turn, for a new value, or for
    /// the resources to appear). `None` waits forever.
    pub timeout: Option<Duration>,
    /// The premise's first value. Defaults to a time-derived string.
    pub seed: Option<String>,
}

impl HandshakeConfig {
    pub fn new(semaphore_name: &str, shared_memory_name: &str) -> Self {
        Self {
            semaphore_name: semaphore_name.to_string(),
            shared_memory_name: shared_memory_name.to_string(),
            size: 4096,
            mode: 0o600,
            iterations: 1000,
            timeout: Some(Duration::from_secs(30)),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub role: Role,
    pub iterations: usize,
    /// What this side wrote last.
    pub last_written: String,
}

/// Play `role` until `config.iterations` replies have been verified.
pub fn run(
    role: Role,
    config: &HandshakeConfig,
    cancel: &dyn Cancellation,
) -> Result<HandshakeOutcome, HandshakeError> {
    match role {
        Role::Premise => run_premise(config, cancel),
        Role::Conclusion => run_conclusion(config, cancel),
    }
}

fn run_premise(
    config: &HandshakeConfig,
    cancel: &dyn Cancellation,
) -> Result<HandshakeOutcome, HandshakeError> {
    // Leftovers from a crashed run would carry a stale count or contents.
    for (kind, unlink) in [
        ("semaphore", unlink_semaphore(&config.semaphore_name)),
        ("shared memory", unlink_shared_memory(&config.shared_memory_name)),
    ] {
        match unlink {
            Ok(()) => warn!(kind, "removed a leftover from an earlier run"),
            Err(e) if e.is_existential() => {}
            Err(e) => warn!(kind, error = %e, "could not remove a leftover"),
        }
    }

    // Segment first: once the semaphore exists the segment is ready.
    let mut shm = SharedMemoryOptions::new()
        .flags(OpenFlags::CREX)
        .mode(config.mode)
        .size(config.size)
        .open(Some(&config.shared_memory_name))?;
    let mut sem = SemaphoreOptions::new()
        .flags(OpenFlags::CREX)
        .mode(config.mode)
        .initial_value(1)
        .open(Some(&config.semaphore_name))?;
    let mut region = shm.map()?;
    shm.close_descriptor()?;

    let result = premise_turns(&sem, &region, config, cancel);

    if let Err(e) = region.unmap() {
        warn!(error = %e, "unmap failed");
    }
    if let Err(e) = sem.close() {
        warn!(error = %e, "semaphore close failed");
    }
    for unlink in [shm.unlink(), sem.unlink()] {
        if let Err(e) = unlink {
            warn!(error = %e, "unlink failed");
        }
    }
    result
}

fn premise_turns(
    sem: &Semaphore,
    region: &MappedRegion,
    config: &HandshakeConfig,
    cancel: &dyn Cancellation,
) -> Result<HandshakeOutcome, HandshakeError> {
    let seed = config.seed.clone().unwrap_or_else(time_seed);
    {
        let access = ScopedAccess::new(region, sem, acquire_timeout(config))?;
        access.write_str(&seed)?;
    }
    info!(seed = %seed, "premise wrote seed");

    let mut last = seed;
    let mut done = 0;
    while done < config.iterations {
        let access = take_new_value(sem, region, &last, config, cancel)?;
        let found = access.read_str()?;
        let expected = digest(&last);
        if found != expected {
            return Err(HandshakeError::Corruption {
                iterations: done,
                found,
                expected,
            });
        }
        done += 1;
        let reply = digest(&found);
        access.write_str(&reply)?;
        trace!(iteration = done, reply = %reply, "premise replied");
        last = reply;
    }

    info!(iterations = done, "premise finished");
    Ok(HandshakeOutcome {
        role: Role::Premise,
        iterations: done,
        last_written: last,
    })
}

fn run_conclusion(
    config: &HandshakeConfig,
    cancel: &dyn Cancellation,
) -> Result<HandshakeOutcome, HandshakeError> {
    let started = Instant::now();
    let mut backoff = Backoff::new();
    let mut sem = loop {
        match Semaphore::open(&config.semaphore_name) {
            Ok(sem) => break sem,
            Err(e) if e.is_existential() => {
                check_stall(started, config)?;
                backoff.snooze();
            }
            Err(e) => return Err(e.into()),
        }
    };
    let mut shm = SharedMemory::open(&config.shared_memory_name)?;
    let mut region = shm.map()?;
    shm.close_descriptor()?;

    let result = conclusion_turns(&sem, &region, config, cancel);

    if let Err(e) = region.unmap() {
        warn!(error = %e, "unmap failed");
    }
    if let Err(e) = sem.close() {
        warn!(error = %e, "semaphore close failed");
    }
    result
}

fn conclusion_turns(
    sem: &Semaphore,
    region: &MappedRegion,
    config: &HandshakeConfig,
    cancel: &dyn Cancellation,
) -> Result<HandshakeOutcome, HandshakeError> {
    let mut last = String::new();
    let mut done = 0;
    while done < config.iterations {
        let access = take_new_value(sem, region, &last, config, cancel)?;
        let found = access.read_str()?;
        // The first value is the seed, which has no predecessor to check.
        if done > 0 {
            let expected = digest(&last);
            if found != expected {
                return Err(HandshakeError::Corruption {
                    iterations: done,
                    found,
                    expected,
                });
            }
        }
        done += 1;
        let reply = digest(&found);
        access.write_str(&reply)?;
        trace!(iteration = done, reply = %reply, "conclusion replied");
        last = reply;
    }

    info!(iterations = done, "conclusion finished");
    Ok(HandshakeOutcome {
        role: Role::Conclusion,
        iterations: done,
        last_written: last,
    })
}

/// Take turns until the segment holds something other than `last`, and
/// return the turn that saw it.
fn take_new_value<'a>(
    sem: &'a Semaphore,
    region: &'a MappedRegion,
    last: &str,
    config: &HandshakeConfig,
    cancel: &dyn Cancellation,
) -> Result<ScopedAccess<'a>, HandshakeError> {
    let started = Instant::now();
    let mut backoff = Backoff::new();
    loop {
        let access = ScopedAccess::with_cancellation(region, sem, acquire_timeout(config), cancel)?;
        if access.read_str()? != last {
            return Ok(access);
        }
        drop(access);
        check_stall(started, config)?;
        backoff.snooze();
    }
}

fn acquire_timeout(config: &HandshakeConfig) -> Timeout {
    Timeout::normalize(config.timeout)
}

fn check_stall(started: Instant, config: &HandshakeConfig) -> Result<(), HandshakeError> {
    match config.timeout {
        Some(limit) if started.elapsed() > limit => {
            debug!(?limit, "peer stalled");
            Err(HandshakeError::Stalled(limit))
        }
        _ => Ok(()),
    }
}

fn time_seed() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    format!("{}.{:09}-{}", now.as_secs(), now.subsec_nanos(), std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_value() {
        // FNV-1a of empty string
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn digest_is_fixed_width_hex() {
        for input in ["", "seed", "a much longer seed string with spaces"] {
            let d = digest(input);
            assert_eq!(d.len(), 16);
            assert!(d.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        }
        assert_eq!(digest(""), "cbf29ce484222325");
    }

    #[test]
    fn digest_n_composes() {
        assert_eq!(digest_n("s", 0), "s");
        assert_eq!(digest_n("s", 2), digest(&digest("s")));
    }
}
