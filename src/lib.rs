// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Safe access to POSIX named semaphores, shared memory and message queues.
// Thin wrappers over the same `sem_*`, `shm_*` and `mq_*` calls, with name
// generation, timeout normalization and a categorized error type on top.

#[cfg(not(unix))]
compile_error!("posix-ipc requires a POSIX platform");

pub mod backoff;
pub mod cancel;
pub mod error;
pub mod limits;
pub mod name;
pub mod timeout;

mod handle;
mod platform;

pub mod handshake;

mod semaphore;
pub use semaphore::{unlink_semaphore, Semaphore, SemaphoreGuard, SemaphoreOptions};

mod shm;
pub use shm::{unlink_shared_memory, MappedRegion, SharedMemory, SharedMemoryOptions};

#[cfg(target_os = "linux")]
mod mq;
#[cfg(target_os = "linux")]
pub use mq::{unlink_message_queue, MessageQueue, MessageQueueOptions};

#[cfg(target_os = "linux")]
mod notify;
#[cfg(target_os = "linux")]
pub use notify::{Notification, ThreadCallback};

mod scoped_access;
pub use scoped_access::ScopedAccess;

pub use cancel::{CancelFlag, Cancellation, NeverCancelled};
pub use error::{ErrorCategory, IpcError, Operation, ResourceKind, Result};
pub use handle::OpenFlags;
pub use name::{NameGenerator, NameRequest, ResourceName};
pub use timeout::{Deadline, Timeout};
