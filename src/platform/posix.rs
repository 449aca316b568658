// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Thin wrappers over the POSIX semaphore, shared memory and message queue
// calls. Every wrapper returns the raw errno on failure; classification is
// left to the caller, which knows which primitive and operation it was.

use std::ffi::{c_void, CStr};
use std::io;
use std::os::fd::RawFd;
use std::ptr::{self, NonNull};

use crate::timeout::Deadline;

pub(crate) type OsResult<T> = std::result::Result<T, i32>;

/// The calling thread's current errno.
pub(crate) fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn check(rc: libc::c_int) -> OsResult<()> {
    if rc == -1 {
        Err(errno())
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------------

/// An open `sem_t *` as returned by `sem_open`.
#[derive(Debug)]
pub(crate) struct RawSemaphore {
    sem: NonNull<libc::sem_t>,
}

// Safety: POSIX semaphore operations are thread-safe; the pointer is only
// invalidated by `sem_close`, which the owning handle sequences with `&mut`.
unsafe impl Send for RawSemaphore {}
unsafe impl Sync for RawSemaphore {}

impl RawSemaphore {
    pub(crate) fn open(
        name: &CStr,
        flags: libc::c_int,
        mode: u32,
        initial_value: u32,
    ) -> OsResult<Self> {
        let sem = unsafe {
            libc::sem_open(
                name.as_ptr(),
                flags,
                mode as libc::c_uint,
                initial_value as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(errno());
        }
        NonNull::new(sem).map(|sem| Self { sem }).ok_or(libc::EINVAL)
    }

    pub(crate) fn wait(&self) -> OsResult<()> {
        check(unsafe { libc::sem_wait(self.sem.as_ptr()) })
    }

    pub(crate) fn try_wait(&self) -> OsResult<()> {
        check(unsafe { libc::sem_trywait(self.sem.as_ptr()) })
    }

    #[cfg(not(target_os = "macos"))]
    pub(crate) fn timed_wait(&self, deadline: &Deadline) -> OsResult<()> {
        let ts = deadline.as_timespec();
        check(unsafe { libc::sem_timedwait(self.sem.as_ptr(), &ts) })
    }

    /// macOS lacks `sem_timedwait`; poll `sem_trywait` until the deadline.
    #[cfg(target_os = "macos")]
    pub(crate) fn timed_wait(&self, deadline: &Deadline) -> OsResult<()> {
        let mut backoff = crate::backoff::Backoff::new();
        loop {
            match self.try_wait() {
                Err(libc::EAGAIN) => {}
                other => return other,
            }
            if deadline.is_elapsed() {
                return Err(libc::ETIMEDOUT);
            }
            backoff.snooze();
        }
    }

    pub(crate) fn post(&self) -> OsResult<()> {
        check(unsafe { libc::sem_post(self.sem.as_ptr()) })
    }

    #[cfg(not(target_os = "macos"))]
    pub(crate) fn value(&self) -> OsResult<i32> {
        let mut value: libc::c_int = 0;
        check(unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut value) })?;
        Ok(value)
    }

    #[cfg(target_os = "macos")]
    pub(crate) fn value(&self) -> OsResult<i32> {
        Err(libc::ENOSYS)
    }

    pub(crate) fn close(&self) -> OsResult<()> {
        check(unsafe { libc::sem_close(self.sem.as_ptr()) })
    }
}

pub(crate) fn sem_unlink(name: &CStr) -> OsResult<()> {
    check(unsafe { libc::sem_unlink(name.as_ptr()) })
}

// ---------------------------------------------------------------------------
// Shared memory
// ---------------------------------------------------------------------------

pub(crate) fn shm_open(name: &CStr, flags: libc::c_int, mode: u32) -> OsResult<RawFd> {
    let fd = unsafe { libc::shm_open(name.as_ptr(), flags, mode as libc::c_uint) };
    if fd == -1 {
        return Err(errno());
    }
    Ok(fd)
}

pub(crate) fn shm_unlink(name: &CStr) -> OsResult<()> {
    check(unsafe { libc::shm_unlink(name.as_ptr()) })
}

pub(crate) fn ftruncate(fd: RawFd, size: u64) -> OsResult<()> {
    let size = libc::off_t::try_from(size).map_err(|_| libc::EFBIG)?;
    check(unsafe { libc::ftruncate(fd, size) })
}

pub(crate) fn fstat_size(fd: RawFd) -> OsResult<u64> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::fstat(fd, &mut st) })?;
    Ok(st.st_size as u64)
}

pub(crate) fn close_fd(fd: RawFd) -> OsResult<()> {
    check(unsafe { libc::close(fd) })
}

pub(crate) fn mmap(fd: RawFd, len: usize, writable: bool) -> OsResult<NonNull<u8>> {
    let prot = if writable {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_READ
    };
    let mem = unsafe { libc::mmap(ptr::null_mut(), len, prot, libc::MAP_SHARED, fd, 0) };
    if mem == libc::MAP_FAILED {
        return Err(errno());
    }
    NonNull::new(mem as *mut u8).ok_or(libc::EINVAL)
}

/// # Safety
/// `mem`/`len` must describe a mapping returned by [`mmap`] that is not
/// used afterwards.
pub(crate) unsafe fn munmap(mem: NonNull<u8>, len: usize) -> OsResult<()> {
    check(libc::munmap(mem.as_ptr() as *mut c_void, len))
}

// ---------------------------------------------------------------------------
// Message queues
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub(crate) use self::mq::*;

#[cfg(target_os = "linux")]
mod mq {
    use super::*;

    /// The portable subset of `struct mq_attr`.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub(crate) struct MqAttr {
        pub(crate) nonblocking: bool,
        pub(crate) max_messages: i64,
        pub(crate) max_message_size: i64,
        pub(crate) current_messages: i64,
    }

    impl MqAttr {
        fn to_raw(self) -> libc::mq_attr {
            let mut raw: libc::mq_attr = unsafe { std::mem::zeroed() };
            raw.mq_flags = if self.nonblocking {
                libc::O_NONBLOCK as libc::c_long
            } else {
                0
            };
            raw.mq_maxmsg = self.max_messages as libc::c_long;
            raw.mq_msgsize = self.max_message_size as libc::c_long;
            raw
        }

        fn from_raw(raw: &libc::mq_attr) -> Self {
            Self {
                nonblocking: raw.mq_flags & libc::O_NONBLOCK as libc::c_long != 0,
                max_messages: raw.mq_maxmsg as i64,
                max_message_size: raw.mq_msgsize as i64,
                current_messages: raw.mq_curmsgs as i64,
            }
        }
    }

    /// `attr` is only passed when creating.
    pub(crate) fn mq_open(
        name: &CStr,
        flags: libc::c_int,
        mode: u32,
        attr: Option<MqAttr>,
    ) -> OsResult<libc::mqd_t> {
        let mqd = match attr {
            Some(attr) => {
                let mut raw = attr.to_raw();
                unsafe {
                    libc::mq_open(
                        name.as_ptr(),
                        flags,
                        mode as libc::mode_t,
                        &mut raw as *mut libc::mq_attr,
                    )
                }
            }
            None => unsafe { libc::mq_open(name.as_ptr(), flags) },
        };
        if mqd == -1 {
            return Err(errno());
        }
        Ok(mqd)
    }

    pub(crate) fn mq_getattr(mqd: libc::mqd_t) -> OsResult<MqAttr> {
        let mut raw: libc::mq_attr = unsafe { std::mem::zeroed() };
        check(unsafe { libc::mq_getattr(mqd, &mut raw) })?;
        Ok(MqAttr::from_raw(&raw))
    }

    /// Only `O_NONBLOCK` can be changed after creation.
    pub(crate) fn mq_set_nonblocking(mqd: libc::mqd_t, nonblocking: bool) -> OsResult<()> {
        let raw = MqAttr {
            nonblocking,
            ..MqAttr::default()
        }
        .to_raw();
        check(unsafe { libc::mq_setattr(mqd, &raw, ptr::null_mut()) })
    }

    pub(crate) fn mq_send(
        mqd: libc::mqd_t,
        msg: &[u8],
        priority: u32,
        deadline: Option<&Deadline>,
    ) -> OsResult<()> {
        let rc = match deadline {
            None => unsafe {
                libc::mq_send(mqd, msg.as_ptr() as *const libc::c_char, msg.len(), priority)
            },
            Some(deadline) => {
                let ts = deadline.as_timespec();
                unsafe {
                    libc::mq_timedsend(
                        mqd,
                        msg.as_ptr() as *const libc::c_char,
                        msg.len(),
                        priority,
                        &ts,
                    )
                }
            }
        };
        check(rc)
    }

    /// Returns `(length, priority)`. `buf` must be at least the queue's
    /// maximum message size.
    pub(crate) fn mq_receive(
        mqd: libc::mqd_t,
        buf: &mut [u8],
        deadline: Option<&Deadline>,
    ) -> OsResult<(usize, u32)> {
        let mut priority: libc::c_uint = 0;
        let n = match deadline {
            None => unsafe {
                libc::mq_receive(
                    mqd,
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.len(),
                    &mut priority,
                )
            },
            Some(deadline) => {
                let ts = deadline.as_timespec();
                unsafe {
                    libc::mq_timedreceive(
                        mqd,
                        buf.as_mut_ptr() as *mut libc::c_char,
                        buf.len(),
                        &mut priority,
                        &ts,
                    )
                }
            }
        };
        if n == -1 {
            return Err(errno());
        }
        Ok((n as usize, priority))
    }

    pub(crate) fn mq_close(mqd: libc::mqd_t) -> OsResult<()> {
        check(unsafe { libc::mq_close(mqd) })
    }

    pub(crate) fn mq_unlink(name: &CStr) -> OsResult<()> {
        check(unsafe { libc::mq_unlink(name.as_ptr()) })
    }

    /// Remove this process's notification registration, if any.
    pub(crate) fn mq_notify_cancel(mqd: libc::mqd_t) -> OsResult<()> {
        check(unsafe { libc::mq_notify(mqd, ptr::null()) })
    }

    pub(crate) fn mq_notify_signal(mqd: libc::mqd_t, signo: libc::c_int) -> OsResult<()> {
        let mut ev: libc::sigevent = unsafe { std::mem::zeroed() };
        ev.sigev_notify = libc::SIGEV_SIGNAL;
        ev.sigev_signo = signo;
        check(unsafe { libc::mq_notify(mqd, &ev) })
    }

    /// `struct sigevent` with the `SIGEV_THREAD` arm of its union spelled
    /// out. The `libc` definition hides the union behind padding.
    #[repr(C)]
    struct ThreadSigevent {
        sigev_value: libc::sigval,
        sigev_signo: libc::c_int,
        sigev_notify: libc::c_int,
        sigev_notify_function: Option<extern "C" fn(libc::sigval)>,
        sigev_notify_attributes: *mut libc::pthread_attr_t,
        _pad: [u8; SIGEV_THREAD_PAD],
    }

    const SIGEV_THREAD_PAD: usize = std::mem::size_of::<libc::sigevent>()
        - std::mem::size_of::<libc::sigval>()
        - 2 * std::mem::size_of::<libc::c_int>()
        - 2 * std::mem::size_of::<usize>();

    const _: () = assert!(
        std::mem::size_of::<ThreadSigevent>() == std::mem::size_of::<libc::sigevent>()
    );

    /// Arm a one-shot notification that makes the OS run `function(payload)`
    /// on a new thread when the queue goes from empty to non-empty.
    pub(crate) fn mq_notify_thread(
        mqd: libc::mqd_t,
        function: extern "C" fn(libc::sigval),
        payload: *mut c_void,
    ) -> OsResult<()> {
        let ev = ThreadSigevent {
            sigev_value: libc::sigval { sival_ptr: payload },
            sigev_signo: 0,
            sigev_notify: libc::SIGEV_THREAD,
            sigev_notify_function: Some(function),
            sigev_notify_attributes: ptr::null_mut(),
            _pad: [0; SIGEV_THREAD_PAD],
        };
        check(unsafe { libc::mq_notify(mqd, &ev as *const ThreadSigevent as *const libc::sigevent) })
    }
}
