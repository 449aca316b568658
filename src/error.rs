// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy shared by every primitive.
// Raw errno values from the platform layer are classified into five
// categories so callers can handle failures without caring which
// primitive raised them.

use std::fmt;
use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IpcError>;

/// The five failure categories every OS-call failure maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Access to an existing object was denied.
    Permissions,
    /// The object does not exist, already exists when exclusive creation was
    /// requested, or the local handle has been closed.
    Existential,
    /// The operation would block and non-blocking or timed semantics were
    /// requested, or the object is at capacity.
    Busy,
    /// A wait was aborted by a signal that was not a cancellation request.
    Signal,
    /// Anything else. The error carries the raw OS code.
    Generic,
}

/// Which primitive an operation was performed on. Used to build messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Semaphore,
    SharedMemory,
    MessageQueue,
}

impl ResourceKind {
    fn noun(self) -> &'static str {
        match self {
            ResourceKind::Semaphore => "semaphore",
            ResourceKind::SharedMemory => "shared memory segment",
            ResourceKind::MessageQueue => "message queue",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// The OS operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `sem_open` / `shm_open` / `mq_open`.
    Open,
    /// `*_unlink`.
    Unlink,
    /// `sem_wait` and friends.
    Wait,
    /// `sem_post`.
    Post,
    /// `sem_getvalue`, `fstat`, `mq_getattr`.
    Query,
    /// `sem_close`, `close`, `mq_close`.
    Close,
    /// `ftruncate` on a freshly created segment.
    Resize,
    /// `mmap` / `munmap`.
    Map,
    /// `mq_send` / `mq_timedsend`.
    Send,
    /// `mq_receive` / `mq_timedreceive`.
    Receive,
    /// `mq_notify`.
    Notify,
    /// `mq_setattr`.
    SetAttr,
}

impl Operation {
    /// Whether this operation acts on a name rather than an open handle.
    /// `EINVAL` from a by-name call means bad parameters, from a by-handle
    /// call it means the handle is gone.
    fn acts_on_name(self) -> bool {
        matches!(self, Operation::Open | Operation::Resize | Operation::Map)
    }
}

/// Map a raw errno to its category for the given operation.
pub fn classify(op: Operation, errno: i32) -> ErrorCategory {
    match errno {
        libc::EACCES | libc::EPERM | libc::EROFS => ErrorCategory::Permissions,
        libc::ENOENT | libc::EEXIST | libc::EBADF => ErrorCategory::Existential,
        libc::EINVAL if !op.acts_on_name() => ErrorCategory::Existential,
        libc::EAGAIN | libc::ETIMEDOUT | libc::EBUSY => ErrorCategory::Busy,
        libc::EINTR => ErrorCategory::Signal,
        _ => ErrorCategory::Generic,
    }
}

/// Error type for every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("{message}")]
    Permissions { message: String },

    #[error("{message}")]
    Existential { message: String },

    #[error("{message}")]
    Busy { message: String },

    #[error("the wait was interrupted by a signal")]
    Signal,

    #[error("{message}: {source}")]
    Generic {
        message: String,
        #[source]
        source: io::Error,
    },

    /// Rejected before any OS call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The platform lacks the capability (e.g. `sem_getvalue` on macOS).
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    /// A blocking wait was interrupted by the caller's own cancellation
    /// gesture. Not part of the taxonomy: it is handed back to the caller's
    /// cancellation handling untouched.
    #[error("the wait was cancelled")]
    Cancelled,
}

impl IpcError {
    /// Build a categorized error from a raw errno.
    pub fn from_errno(kind: ResourceKind, op: Operation, errno: i32) -> Self {
        match classify(op, errno) {
            ErrorCategory::Permissions => IpcError::Permissions {
                message: permissions_message(kind, op),
            },
            ErrorCategory::Existential => IpcError::Existential {
                message: existential_message(kind, op, errno),
            },
            ErrorCategory::Busy => IpcError::Busy {
                message: busy_message(kind, op),
            },
            ErrorCategory::Signal => IpcError::Signal,
            ErrorCategory::Generic => IpcError::Generic {
                message: generic_message(kind, op, errno),
                source: io::Error::from_raw_os_error(errno),
            },
        }
    }

    /// Error returned by any operation on a handle that has been closed.
    pub fn closed(kind: ResourceKind) -> Self {
        IpcError::Existential {
            message: format!("the {kind} has been closed"),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        IpcError::InvalidArgument(message.into())
    }

    /// The taxonomy category, or `None` for validation errors, missing
    /// capabilities and cancellation.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            IpcError::Permissions { .. } => Some(ErrorCategory::Permissions),
            IpcError::Existential { .. } => Some(ErrorCategory::Existential),
            IpcError::Busy { .. } => Some(ErrorCategory::Busy),
            IpcError::Signal => Some(ErrorCategory::Signal),
            IpcError::Generic { .. } => Some(ErrorCategory::Generic),
            IpcError::InvalidArgument(_) | IpcError::Unsupported(_) | IpcError::Cancelled => None,
        }
    }

    /// Raw OS error code for `Generic` errors.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            IpcError::Generic { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn is_existential(&self) -> bool {
        self.category() == Some(ErrorCategory::Existential)
    }

    pub fn is_busy(&self) -> bool {
        self.category() == Some(ErrorCategory::Busy)
    }
}

fn permissions_message(kind: ResourceKind, op: Operation) -> String {
    match op {
        Operation::Unlink => format!("denied permission to unlink this {kind}"),
        Operation::Resize => "the memory is read-only".to_string(),
        _ => "permission denied".to_string(),
    }
}

fn existential_message(kind: ResourceKind, op: Operation, errno: i32) -> String {
    match (op, errno) {
        (_, libc::EEXIST) => format!("a {kind} with the specified name already exists"),
        (Operation::Open | Operation::Unlink, _) => {
            format!("no {kind} exists with the specified name")
        }
        (Operation::Send, _) => {
            "the message queue does not exist or is not open for writing".to_string()
        }
        (Operation::Receive, _) => {
            "the message queue does not exist or is not open for reading".to_string()
        }
        _ => format!("the {kind} does not exist"),
    }
}

fn busy_message(kind: ResourceKind, op: Operation) -> String {
    match op {
        Operation::Send => "the queue is full".to_string(),
        Operation::Receive => "the queue is empty".to_string(),
        Operation::Notify => {
            "the queue is already delivering notifications elsewhere".to_string()
        }
        _ => format!("the {kind} is busy"),
    }
}

fn generic_message(kind: ResourceKind, op: Operation, errno: i32) -> String {
    match errno {
        libc::EMFILE => "this process already has the maximum number of files open".to_string(),
        libc::ENFILE => {
            "the system limit on the total number of open files has been reached".to_string()
        }
        libc::ENAMETOOLONG => "the name is too long".to_string(),
        libc::ENOMEM => "not enough memory".to_string(),
        libc::ENOSPC => format!("insufficient space for a new {kind}"),
        libc::EFBIG => "the size is too large".to_string(),
        libc::EMSGSIZE => "the message is too long".to_string(),
        libc::EINVAL => "invalid parameter(s)".to_string(),
        _ => format!("{op:?} on {kind} failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_table() {
        assert_eq!(classify(Operation::Open, libc::EACCES), ErrorCategory::Permissions);
        assert_eq!(classify(Operation::Resize, libc::EROFS), ErrorCategory::Permissions);
        assert_eq!(classify(Operation::Open, libc::EEXIST), ErrorCategory::Existential);
        assert_eq!(classify(Operation::Unlink, libc::ENOENT), ErrorCategory::Existential);
        assert_eq!(classify(Operation::Post, libc::EBADF), ErrorCategory::Existential);
        assert_eq!(classify(Operation::Wait, libc::EAGAIN), ErrorCategory::Busy);
        assert_eq!(classify(Operation::Wait, libc::ETIMEDOUT), ErrorCategory::Busy);
        assert_eq!(classify(Operation::Notify, libc::EBUSY), ErrorCategory::Busy);
        assert_eq!(classify(Operation::Receive, libc::EINTR), ErrorCategory::Signal);
        assert_eq!(classify(Operation::Open, libc::EMFILE), ErrorCategory::Generic);
    }

    #[test]
    fn einval_depends_on_operation() {
        assert_eq!(classify(Operation::Wait, libc::EINVAL), ErrorCategory::Existential);
        assert_eq!(classify(Operation::Unlink, libc::EINVAL), ErrorCategory::Existential);
        assert_eq!(classify(Operation::Open, libc::EINVAL), ErrorCategory::Generic);
        assert_eq!(classify(Operation::Resize, libc::EINVAL), ErrorCategory::Generic);
    }

    #[test]
    fn generic_keeps_raw_code() {
        let err = IpcError::from_errno(ResourceKind::MessageQueue, Operation::Open, libc::ENOSPC);
        assert_eq!(err.category(), Some(ErrorCategory::Generic));
        assert_eq!(err.raw_os_error(), Some(libc::ENOSPC));
        assert!(err.to_string().starts_with("insufficient space for a new message queue"));
    }

    #[test]
    fn messages_name_the_primitive() {
        let err = IpcError::from_errno(ResourceKind::Semaphore, Operation::Open, libc::ENOENT);
        assert_eq!(err.to_string(), "no semaphore exists with the specified name");

        let err = IpcError::from_errno(ResourceKind::MessageQueue, Operation::Send, libc::EAGAIN);
        assert_eq!(err.to_string(), "the queue is full");

        let err = IpcError::closed(ResourceKind::Semaphore);
        assert!(err.is_existential());
        assert_eq!(err.to_string(), "the semaphore has been closed");
    }

    #[test]
    fn non_taxonomy_errors_have_no_category() {
        assert_eq!(IpcError::Cancelled.category(), None);
        assert_eq!(IpcError::invalid("x").category(), None);
        assert_eq!(IpcError::Unsupported("sem_getvalue").category(), None);
        assert_eq!(IpcError::Signal.category(), Some(ErrorCategory::Signal));
    }
}
