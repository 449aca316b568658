// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// One-shot message queue notifications.
//
// The OS runs `SIGEV_THREAD` notifications on a thread of its own choosing.
// That thread only forwards an event into a bounded channel; a worker thread
// owned by the dispatcher takes the registered callback out of its slot and
// runs it. Callbacks run one at a time and may re-arm from inside.
//
// Every arm carries a generation number through the OS payload. An event
// whose generation no longer matches the stored registration was meant for
// an earlier arm and is dropped.

use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, trace, warn};

use crate::error::{IpcError, Operation, ResourceKind, Result};
use crate::limits::user_signal_range;
use crate::platform;

/// Capacity of the trampoline -> worker channel. Notifications are one-shot,
/// so more than a handful pending means a stale arm fired.
const EVENT_BACKLOG: usize = 8;

const WORKER_NAME: &str = "mq-notify";

/// A boxed one-shot callback together with its parameter.
pub struct ThreadCallback {
    call: Box<dyn FnOnce() + Send + 'static>,
}

impl ThreadCallback {
    fn invoke(self) {
        (self.call)()
    }
}

impl fmt::Debug for ThreadCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThreadCallback")
    }
}

/// What should happen when a message arrives on an empty queue.
#[derive(Debug)]
pub enum Notification {
    /// Cancel any pending notification.
    None,
    /// Send this signal to the process.
    Signal(i32),
    /// Run a callback on the dispatcher's worker thread.
    Thread(ThreadCallback),
}

impl Notification {
    /// Run `callback(param)` once when the queue becomes non-empty.
    pub fn thread<P, F>(callback: F, param: P) -> Self
    where
        P: Send + 'static,
        F: FnOnce(P) + Send + 'static,
    {
        Notification::Thread(ThreadCallback {
            call: Box::new(move || callback(param)),
        })
    }
}

/// The currently armed registration.
#[derive(Debug, Default)]
enum Registration {
    #[default]
    None,
    Signal(i32),
    Thread(ThreadCallback),
}

/// The registration together with the generation of the arm that made it.
#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    registration: Registration,
}

/// Target of the OS trampoline. Only ever reached through a `Weak`.
struct Endpoint {
    events: Sender<u64>,
}

/// What the OS hands back to the trampoline for one thread arm.
struct Ticket {
    endpoint: Weak<Endpoint>,
    generation: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    /// Serializes callback delivery against (re-)arming. Reentrant so a
    /// callback can re-arm from the worker thread.
    delivery: ReentrantMutex<()>,
}

struct Worker {
    handle: JoinHandle<()>,
    id: ThreadId,
}

/// Per-queue notification state and delivery worker.
pub(crate) struct NotificationDispatcher {
    shared: Arc<Shared>,
    endpoint: Option<Arc<Endpoint>>,
    events: Receiver<u64>,
    worker: Mutex<Option<Worker>>,
}

impl NotificationDispatcher {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(EVENT_BACKLOG);
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                delivery: ReentrantMutex::new(()),
            }),
            endpoint: Some(Arc::new(Endpoint { events: tx })),
            events: rx,
            worker: Mutex::new(None),
        }
    }

    /// Replace the current registration with `notification`.
    ///
    /// Whatever was registered before is cancelled with the OS and released
    /// before the new registration is armed.
    pub(crate) fn request(&self, mqd: libc::mqd_t, notification: Notification) -> Result<()> {
        if let Notification::Signal(signo) = notification {
            let max = *user_signal_range().end();
            if !(1..=max).contains(&signo) {
                return Err(IpcError::invalid(format!(
                    "the signal number must be between 1 and {max}"
                )));
            }
        }

        let _serial = self.shared.delivery.lock();
        self.cancel(mqd);

        match notification {
            Notification::None => {
                debug!(mqd, "notification cancelled");
                Ok(())
            }
            Notification::Signal(signo) => {
                platform::mq_notify_signal(mqd, signo).map_err(notify_error)?;
                let mut slot = self.shared.slot.lock();
                slot.generation += 1;
                slot.registration = Registration::Signal(signo);
                debug!(mqd, signo, "signal notification armed");
                Ok(())
            }
            Notification::Thread(callback) => self.arm_thread(mqd, callback),
        }
    }

    fn arm_thread(&self, mqd: libc::mqd_t, callback: ThreadCallback) -> Result<()> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| IpcError::closed(ResourceKind::MessageQueue))?;
        self.ensure_worker()?;

        let generation = {
            let mut slot = self.shared.slot.lock();
            slot.generation += 1;
            slot.registration = Registration::Thread(callback);
            slot.generation
        };

        let ticket = Box::new(Ticket {
            endpoint: Arc::downgrade(endpoint),
            generation,
        });
        let payload = Box::into_raw(ticket) as *mut c_void;
        if let Err(errno) = platform::mq_notify_thread(mqd, trampoline, payload) {
            // The OS never saw the payload; reclaim it.
            drop(unsafe { Box::from_raw(payload as *mut Ticket) });
            let stale = std::mem::take(&mut self.shared.slot.lock().registration);
            drop(stale);
            return Err(notify_error(errno));
        }
        debug!(mqd, generation, "thread notification armed");
        Ok(())
    }

    /// Cancel with the OS (errors ignored) and release the stored
    /// registration. The OS call is made even when nothing is stored, since
    /// a delivered event may have emptied the slot while an arm is live.
    pub(crate) fn cancel(&self, mqd: libc::mqd_t) {
        let _serial = self.shared.delivery.lock();
        if let Err(errno) = platform::mq_notify_cancel(mqd) {
            trace!(mqd, errno, "mq_notify(NULL) failed");
        }
        let previous = std::mem::take(&mut self.shared.slot.lock().registration);
        drop(previous);
    }

    /// Drop the stored registration without talking to the OS. Used once the
    /// descriptor is gone.
    pub(crate) fn release(&self) {
        let _serial = self.shared.delivery.lock();
        let previous = std::mem::take(&mut self.shared.slot.lock().registration);
        drop(previous);
    }

    /// Whether a signal or thread registration is currently stored.
    pub(crate) fn is_armed(&self) -> bool {
        !matches!(self.shared.slot.lock().registration, Registration::None)
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(&shared, &events))
            .map_err(|e| IpcError::Generic {
                message: "failed to start the notification worker".to_string(),
                source: e,
            })?;
        let id = handle.thread().id();
        *worker = Some(Worker { handle, id });
        Ok(())
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.release();
        // Dropping the only strong endpoint disconnects the channel, which
        // ends the worker loop. Pending OS arms now upgrade to nothing.
        self.endpoint = None;
        if let Some(worker) = self.worker.get_mut().take() {
            if worker.id == thread::current().id() {
                // Dropped from inside a callback; the loop exits on its own.
                return;
            }
            if worker.handle.join().is_err() {
                warn!("notification worker exited with a panic");
            }
        }
    }
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("slot", &*self.shared.slot.lock())
            .finish_non_exhaustive()
    }
}

fn notify_error(errno: i32) -> IpcError {
    IpcError::from_errno(ResourceKind::MessageQueue, Operation::Notify, errno)
}

fn run_worker(shared: &Shared, events: &Receiver<u64>) {
    while let Ok(generation) = events.recv() {
        deliver(shared, generation);
    }
    trace!("notification worker exiting");
}

fn deliver(shared: &Shared, generation: u64) {
    let _serial = shared.delivery.lock();
    let registration = {
        let mut slot = shared.slot.lock();
        if slot.generation != generation {
            trace!(generation, current = slot.generation, "stale notification event dropped");
            return;
        }
        std::mem::take(&mut slot.registration)
    };
    let Registration::Thread(callback) = registration else {
        trace!("notification event with no callback registered");
        return;
    };
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback.invoke())) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(panic = %message, "notification callback panicked");
    }
}

/// Runs on an OS-created thread. Forwards the event and returns.
extern "C" fn trampoline(value: libc::sigval) {
    let ticket = unsafe { Box::from_raw(value.sival_ptr as *mut Ticket) };
    let Some(endpoint) = ticket.endpoint.upgrade() else {
        return;
    };
    match endpoint.events.try_send(ticket.generation) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!("notification backlog full, event dropped"),
        Err(TrySendError::Disconnected(_)) => {}
    }
}
