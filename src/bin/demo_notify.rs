// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_notify [count]
//
// Creates a message queue with a generated name, arms a thread notification
// whose callback drains the queue and re-arms itself, then sends <count>
// messages (default 5) with a short pause between them.

#[cfg(target_os = "linux")]
fn main() {
    use std::sync::Arc;
    use std::time::Duration;

    use crossbeam_channel::unbounded;
    use posix_ipc::{MessageQueue, MessageQueueOptions, Notification, OpenFlags, Timeout};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let count: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let mq = Arc::new(
        MessageQueueOptions::new()
            .flags(OpenFlags::CREX)
            .open(None)
            .expect("create queue"),
    );
    println!("queue: {}", mq.name());

    let (tx, rx) = unbounded::<String>();

    fn arm(mq: &Arc<MessageQueue>, tx: crossbeam_channel::Sender<String>) {
        let weak = Arc::downgrade(mq);
        let notification = Notification::thread(
            move |tx: crossbeam_channel::Sender<String>| {
                let Some(mq) = weak.upgrade() else {
                    return;
                };
                // Re-arm before draining so nothing sent meanwhile is missed.
                arm(&mq, tx.clone());
                while let Ok((msg, priority)) = mq.receive(Timeout::Immediate) {
                    let text = String::from_utf8_lossy(&msg).into_owned();
                    let _ = tx.send(format!("{text} (priority {priority})"));
                }
            },
            tx,
        );
        if let Err(e) = mq.request_notification(notification) {
            eprintln!("request_notification failed: {e}");
        }
    }

    arm(&mq, tx);

    for i in 0..count {
        let msg = format!("message {i}");
        mq.send(msg.as_bytes(), Timeout::Unbounded, (i % 3) as u32)
            .expect("send");
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(line) => println!("notified: {line}"),
            Err(_) => println!("no notification for {msg}"),
        }
    }

    mq.request_notification(Notification::None)
        .expect("cancel notification");
    mq.unlink().expect("unlink");
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("POSIX message queues are not available on this platform");
    std::process::exit(1);
}
