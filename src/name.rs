// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Names for POSIX IPC objects.
// Caller-supplied names are validated and copied; anonymous objects get a
// random lowercase name and are created in an exclusive-create retry loop.

use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::OnceLock;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::{IpcError, Result};
use crate::limits::{MAX_SAFE_NAME_LENGTH, NAME_MAX_LEN};

/// Minimum length of a generated name, including the leading '/'.
const GENERATED_MIN_LEN: usize = 6;

const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// A validated POSIX IPC object name (with leading '/').
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResourceName {
    c_name: CString,
}

impl ResourceName {
    /// Validate a caller-supplied name.
    ///
    /// The name must start with exactly one '/', have at least one character
    /// after it, contain no other '/' and no NUL, and fit in `NAME_MAX_LEN`.
    pub fn new(name: &str) -> Result<Self> {
        let body = name
            .strip_prefix('/')
            .ok_or_else(|| IpcError::invalid(format!("name {name:?} must begin with '/'")))?;
        if body.is_empty() {
            return Err(IpcError::invalid("name must not be empty"));
        }
        if body.contains('/') {
            return Err(IpcError::invalid(format!(
                "name {name:?} must not contain '/' after the leading separator"
            )));
        }
        if name.len() > NAME_MAX_LEN {
            return Err(IpcError::invalid(format!(
                "name is {} bytes long, the limit is {NAME_MAX_LEN}",
                name.len()
            )));
        }
        let c_name = CString::new(name)
            .map_err(|_| IpcError::invalid("name must not contain NUL bytes"))?;
        Ok(Self { c_name })
    }

    pub fn as_str(&self) -> &str {
        // Constructed from a &str or from ASCII, so always valid UTF-8.
        self.c_name.to_str().unwrap_or_default()
    }

    pub(crate) fn as_c_str(&self) -> &CStr {
        &self.c_name
    }
}

impl fmt::Debug for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// How the name of an object being opened is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRequest {
    /// Use this name.
    Named(ResourceName),
    /// Generate a fresh name; only valid with exclusive creation.
    Generated,
}

/// Source of random object names.
///
/// Construct one explicitly (seeded for deterministic tests) or use the
/// process-wide instance from [`NameGenerator::process`].
pub struct NameGenerator {
    rng: Mutex<StdRng>,
}

impl NameGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// The process-wide generator, seeded once on first use.
    pub fn process() -> &'static NameGenerator {
        static PROCESS: OnceLock<NameGenerator> = OnceLock::new();
        PROCESS.get_or_init(NameGenerator::from_entropy)
    }

    /// A random name: '/' followed by lowercase letters, total length in
    /// `[6, MAX_SAFE_NAME_LENGTH - 1]`.
    pub fn generate(&self) -> ResourceName {
        let mut rng = self.rng.lock();
        let len = rng.gen_range(GENERATED_MIN_LEN..MAX_SAFE_NAME_LENGTH);
        let mut name = String::with_capacity(len);
        name.push('/');
        for _ in 1..len {
            name.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
        }
        ResourceName {
            c_name: CString::new(name).unwrap_or_default(),
        }
    }

    /// Decide how an object will be named.
    ///
    /// Omitting the name is only meaningful when the caller is guaranteed to
    /// be the creator, so it requires exclusive creation.
    pub fn resolve(candidate: Option<&str>, exclusive: bool) -> Result<NameRequest> {
        match candidate {
            Some(name) => Ok(NameRequest::Named(ResourceName::new(name)?)),
            None if exclusive => Ok(NameRequest::Generated),
            None => Err(IpcError::invalid("name can only be omitted if O_EXCL is set")),
        }
    }

    /// Run `open` against the requested name.
    ///
    /// For generated names, `open` is retried with a fresh name for as long
    /// as it reports `EEXIST`. Any other errno ends the loop.
    pub fn open_unique<T, F>(
        &self,
        request: NameRequest,
        mut open: F,
    ) -> std::result::Result<(ResourceName, T), (ResourceName, i32)>
    where
        F: FnMut(&ResourceName) -> std::result::Result<T, i32>,
    {
        match request {
            NameRequest::Named(name) => match open(&name) {
                Ok(v) => Ok((name, v)),
                Err(errno) => Err((name, errno)),
            },
            NameRequest::Generated => loop {
                let name = self.generate();
                match open(&name) {
                    Ok(v) => return Ok((name, v)),
                    Err(libc::EEXIST) => {
                        trace!(name = %name, "generated name already taken, retrying");
                    }
                    Err(errno) => return Err((name, errno)),
                }
            },
        }
    }
}

impl fmt::Debug for NameGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_meet_format() {
        let gen = NameGenerator::seeded(7);
        for _ in 0..2000 {
            let name = gen.generate();
            let s = name.as_str();
            assert!(s.len() >= GENERATED_MIN_LEN, "{s}");
            assert!(s.len() <= MAX_SAFE_NAME_LENGTH - 1, "{s}");
            assert!(s.starts_with('/'));
            assert!(s[1..].bytes().all(|b| b.is_ascii_lowercase()), "{s}");
            assert!(ResourceName::new(s).is_ok());
        }
    }

    #[test]
    fn seeded_generators_are_deterministic() {
        let a = NameGenerator::seeded(42);
        let b = NameGenerator::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn generated_lengths_cover_range() {
        let gen = NameGenerator::seeded(1);
        let mut seen = [false; MAX_SAFE_NAME_LENGTH];
        for _ in 0..5000 {
            seen[gen.generate().as_str().len()] = true;
        }
        for len in GENERATED_MIN_LEN..MAX_SAFE_NAME_LENGTH {
            assert!(seen[len], "length {len} never generated");
        }
    }

    #[test]
    fn validation_rejects_malformed_names() {
        assert!(ResourceName::new("/ok_name").is_ok());
        for bad in ["", "/", "noslash", "//double", "/a/b", "/nul\0byte"] {
            let err = ResourceName::new(bad).unwrap_err();
            assert!(matches!(err, IpcError::InvalidArgument(_)), "{bad:?}");
        }
        let long = format!("/{}", "x".repeat(NAME_MAX_LEN));
        assert!(ResourceName::new(&long).is_err());
    }

    #[test]
    fn omitted_name_requires_exclusive() {
        assert_eq!(
            NameGenerator::resolve(None, true).unwrap(),
            NameRequest::Generated
        );
        assert!(matches!(
            NameGenerator::resolve(None, false),
            Err(IpcError::InvalidArgument(_))
        ));
        assert!(matches!(
            NameGenerator::resolve(Some("/x"), false),
            Ok(NameRequest::Named(_))
        ));
    }

    #[test]
    fn retry_loop_regenerates_on_collision() {
        let gen = NameGenerator::seeded(3);
        let mut attempts = Vec::new();
        let (name, value) = gen
            .open_unique(NameRequest::Generated, |n| {
                attempts.push(n.clone());
                if attempts.len() < 4 {
                    Err(libc::EEXIST)
                } else {
                    Ok(99)
                }
            })
            .unwrap();
        assert_eq!(value, 99);
        assert_eq!(attempts.len(), 4);
        assert_eq!(&name, attempts.last().unwrap());
    }

    #[test]
    fn retry_loop_aborts_on_other_errors() {
        let gen = NameGenerator::seeded(3);
        let mut calls = 0;
        let err = gen
            .open_unique::<(), _>(NameRequest::Generated, |_| {
                calls += 1;
                Err(libc::EACCES)
            })
            .unwrap_err();
        assert_eq!(err.1, libc::EACCES);
        assert_eq!(calls, 1);
    }

    #[test]
    fn named_request_is_tried_once() {
        let gen = NameGenerator::seeded(3);
        let name = ResourceName::new("/fixed").unwrap();
        let mut calls = 0;
        let err = gen
            .open_unique::<(), _>(NameRequest::Named(name.clone()), |_| {
                calls += 1;
                Err(libc::EEXIST)
            })
            .unwrap_err();
        assert_eq!(err, (name, libc::EEXIST));
        assert_eq!(calls, 1);
    }
}
