// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named POSIX message queue (`mq_open` family). Linux only.

use tracing::{debug, warn};

use crate::cancel::{Cancellation, NeverCancelled};
use crate::error::{IpcError, Operation, ResourceKind, Result};
use crate::handle::{HandleState, OpenFlags};
use crate::limits::{QUEUE_MESSAGES_MAX_DEFAULT, QUEUE_MESSAGE_SIZE_MAX_DEFAULT, QUEUE_PRIORITY_MAX};
use crate::name::{NameGenerator, ResourceName};
use crate::notify::{Notification, NotificationDispatcher};
use crate::platform::{self, MqAttr};
use crate::timeout::Timeout;

const KIND: ResourceKind = ResourceKind::MessageQueue;

/// Parameters for opening or creating a [`MessageQueue`].
///
/// `max_messages` and `max_message_size` are only used when the queue is
/// created; an existing queue keeps its own attributes.
#[derive(Debug, Clone, Copy)]
pub struct MessageQueueOptions {
    pub flags: OpenFlags,
    pub mode: u32,
    pub max_messages: usize,
    pub max_message_size: usize,
    pub read: bool,
    pub write: bool,
}

impl Default for MessageQueueOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::NONE,
            mode: 0o600,
            max_messages: QUEUE_MESSAGES_MAX_DEFAULT,
            max_message_size: QUEUE_MESSAGE_SIZE_MAX_DEFAULT,
            read: true,
            write: true,
        }
    }
}

impl MessageQueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_messages(mut self, n: usize) -> Self {
        self.max_messages = n;
        self
    }

    pub fn max_message_size(mut self, n: usize) -> Self {
        self.max_message_size = n;
        self
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Open the queue. `None` generates a random name and requires
    /// [`OpenFlags::CREX`].
    pub fn open(&self, name: Option<&str>) -> Result<MessageQueue> {
        self.open_with(name, NameGenerator::process())
    }

    pub fn open_with(&self, name: Option<&str>, names: &NameGenerator) -> Result<MessageQueue> {
        self.flags.validate()?;
        let request = NameGenerator::resolve(name, self.flags.is_exclusive())?;
        let access = match (self.read, self.write) {
            (true, true) => libc::O_RDWR,
            (true, false) => libc::O_RDONLY,
            (false, true) => libc::O_WRONLY,
            (false, false) => {
                return Err(IpcError::invalid("at least one of read or write must be set"))
            }
        };
        let flags = self.flags.bits() | access;

        let attr = if self.flags.creates() {
            Some(MqAttr {
                nonblocking: self.flags.contains(OpenFlags::NONBLOCK),
                max_messages: to_attr(self.max_messages, "max_messages")?,
                max_message_size: to_attr(self.max_message_size, "max_message_size")?,
                current_messages: 0,
            })
        } else {
            None
        };

        let (name, mqd) = names
            .open_unique(request, |name| {
                platform::mq_open(name.as_c_str(), flags, self.mode, attr)
            })
            .map_err(|(name, errno)| {
                debug!(name = %name, errno, "mq_open failed");
                IpcError::from_errno(KIND, Operation::Open, errno)
            })?;

        let actual = match platform::mq_getattr(mqd) {
            Ok(actual) => actual,
            Err(errno) => {
                if let Err(e) = platform::mq_close(mqd) {
                    warn!(name = %name, errno = e, "rollback close failed");
                }
                // Only an exclusive create proves this call made the name.
                if self.flags.is_exclusive() {
                    if let Err(e) = platform::mq_unlink(name.as_c_str()) {
                        warn!(name = %name, errno = e, "rollback unlink failed");
                    }
                }
                return Err(IpcError::from_errno(KIND, Operation::Query, errno));
            }
        };

        debug!(
            name = %name,
            mqd,
            max_messages = actual.max_messages,
            max_message_size = actual.max_message_size,
            "message queue opened"
        );
        Ok(MessageQueue {
            name,
            mode: self.mode,
            mqd: HandleState::Open(mqd),
            max_messages: actual.max_messages.max(0) as usize,
            max_message_size: actual.max_message_size.max(0) as usize,
            can_read: self.read,
            can_write: self.write,
            notifier: NotificationDispatcher::new(),
        })
    }
}

fn to_attr(n: usize, what: &str) -> Result<i64> {
    i64::try_from(n).map_err(|_| IpcError::invalid(format!("{what} is too large")))
}

/// A named POSIX message queue.
///
/// Dropping the handle releases any notification callback but does not
/// close the descriptor; use [`MessageQueue::close`].
#[derive(Debug)]
pub struct MessageQueue {
    name: ResourceName,
    mode: u32,
    mqd: HandleState<libc::mqd_t>,
    max_messages: usize,
    max_message_size: usize,
    can_read: bool,
    can_write: bool,
    notifier: NotificationDispatcher,
}

impl MessageQueue {
    /// Create a queue with default attributes, opening it if it exists.
    pub fn create(name: &str) -> Result<Self> {
        MessageQueueOptions::default()
            .flags(OpenFlags::CREAT)
            .open(Some(name))
    }

    /// Open an existing queue for reading and writing.
    pub fn open(name: &str) -> Result<Self> {
        MessageQueueOptions::default().open(Some(name))
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn can_read(&self) -> bool {
        self.can_read
    }

    pub fn can_write(&self) -> bool {
        self.can_write
    }

    pub fn is_open(&self) -> bool {
        self.mqd.is_open()
    }

    /// The raw descriptor, or `None` once closed.
    pub fn mqd(&self) -> Option<libc::mqd_t> {
        self.mqd.get(KIND).ok().copied()
    }

    /// Enqueue `msg` with `priority` (higher is delivered first).
    ///
    /// A signal during a blocking send yields [`IpcError::Signal`].
    pub fn send(&self, msg: &[u8], timeout: Timeout, priority: u32) -> Result<()> {
        self.send_cancellable(msg, timeout, priority, &NeverCancelled)
    }

    /// As [`send`](Self::send), but an interrupted wait for which `cancel`
    /// reports a cancellation yields [`IpcError::Cancelled`].
    pub fn send_cancellable(
        &self,
        msg: &[u8],
        timeout: Timeout,
        priority: u32,
        cancel: &dyn Cancellation,
    ) -> Result<()> {
        let mqd = *self.mqd.get(KIND)?;
        if !self.can_write {
            return Err(IpcError::Permissions {
                message: "the queue is not open for writing".to_string(),
            });
        }
        if msg.len() > self.max_message_size {
            return Err(IpcError::invalid(format!(
                "the message must be no longer than {} bytes",
                self.max_message_size
            )));
        }
        if priority > QUEUE_PRIORITY_MAX {
            return Err(IpcError::invalid(format!(
                "the priority must be no greater than {QUEUE_PRIORITY_MAX}"
            )));
        }

        let deadline = timeout.deadline_for_timed_call();
        match platform::mq_send(mqd, msg, priority, deadline.as_ref()) {
            Ok(()) => {}
            Err(libc::EINTR) if cancel.is_cancelled() => {
                debug!(name = %self.name, "send cancelled");
                return Err(IpcError::Cancelled);
            }
            Err(errno) => return Err(IpcError::from_errno(KIND, Operation::Send, errno)),
        }
        debug!(name = %self.name, len = msg.len(), priority, "message sent");
        Ok(())
    }

    /// Dequeue the oldest message of the highest priority.
    pub fn receive(&self, timeout: Timeout) -> Result<(Vec<u8>, u32)> {
        self.receive_cancellable(timeout, &NeverCancelled)
    }

    /// As [`receive`](Self::receive), with a cancellation hook for the wait.
    pub fn receive_cancellable(
        &self,
        timeout: Timeout,
        cancel: &dyn Cancellation,
    ) -> Result<(Vec<u8>, u32)> {
        let mqd = *self.mqd.get(KIND)?;
        if !self.can_read {
            return Err(IpcError::Permissions {
                message: "the queue is not open for reading".to_string(),
            });
        }

        let mut buf = vec![0u8; self.max_message_size];
        let deadline = timeout.deadline_for_timed_call();
        let (len, priority) = match platform::mq_receive(mqd, &mut buf, deadline.as_ref()) {
            Ok(received) => received,
            Err(libc::EINTR) if cancel.is_cancelled() => {
                debug!(name = %self.name, "receive cancelled");
                return Err(IpcError::Cancelled);
            }
            Err(errno) => return Err(IpcError::from_errno(KIND, Operation::Receive, errno)),
        };
        buf.truncate(len);
        debug!(name = %self.name, len, priority, "message received");
        Ok((buf, priority))
    }

    /// Arm (or cancel, with [`Notification::None`]) the one-shot
    /// notification for this queue. Cancelling on a closed queue succeeds;
    /// there is nothing left to cancel.
    pub fn request_notification(&self, notification: Notification) -> Result<()> {
        match (self.mqd.get(KIND), notification) {
            (Ok(&mqd), notification) => self.notifier.request(mqd, notification),
            (Err(_), Notification::None) => {
                self.notifier.release();
                Ok(())
            }
            (Err(err), _) => Err(err),
        }
    }

    /// Whether a notification registration is currently held.
    pub fn has_notification(&self) -> bool {
        self.notifier.is_armed()
    }

    pub fn current_messages(&self) -> Result<usize> {
        Ok(self.attr()?.current_messages.max(0) as usize)
    }

    pub fn is_blocking(&self) -> Result<bool> {
        Ok(!self.attr()?.nonblocking)
    }

    pub fn set_blocking(&self, blocking: bool) -> Result<()> {
        let mqd = *self.mqd.get(KIND)?;
        platform::mq_set_nonblocking(mqd, !blocking)
            .map_err(|errno| IpcError::from_errno(KIND, Operation::SetAttr, errno))
    }

    fn attr(&self) -> Result<MqAttr> {
        let mqd = *self.mqd.get(KIND)?;
        platform::mq_getattr(mqd).map_err(|errno| IpcError::from_errno(KIND, Operation::Query, errno))
    }

    /// `mq_close`, after cancelling and releasing any notification. A
    /// second call fails with an existential error.
    pub fn close(&mut self) -> Result<()> {
        let mqd = self.mqd.take(KIND)?;
        self.notifier.cancel(mqd);
        platform::mq_close(mqd).map_err(|errno| IpcError::from_errno(KIND, Operation::Close, errno))?;
        debug!(name = %self.name, "message queue closed");
        Ok(())
    }

    pub fn unlink(&self) -> Result<()> {
        unlink_message_queue(self.name.as_str())
    }
}

/// `mq_unlink` by name.
pub fn unlink_message_queue(name: &str) -> Result<()> {
    let name = ResourceName::new(name)?;
    platform::mq_unlink(name.as_c_str())
        .map_err(|errno| IpcError::from_errno(KIND, Operation::Unlink, errno))?;
    debug!(name = %name, "message queue unlinked");
    Ok(())
}
