// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_handshake premise    [--sem NAME] [--shm NAME] [--iterations N] [--timeout SECS] [--seed S]
//   demo_handshake conclusion [--sem NAME] [--shm NAME] [--iterations N] [--timeout SECS]
//
// Start the premise first. Both sides pass the hash back and forth through
// one shared memory segment, taking turns on one semaphore. Set RUST_LOG to
// see each step (e.g. RUST_LOG=posix_ipc=trace).
//
// On success prints `iterations=<n>` and `last_written=<value>` to stdout.

use std::process::ExitCode;

use posix_ipc::handshake::{self, HandshakeConfig, HandshakeError, Role};
use posix_ipc::timeout::duration_from_secs_f64;
use posix_ipc::CancelFlag;
use tracing_subscriber::EnvFilter;

const DEFAULT_SEM: &str = "/posix_ipc_handshake_sem";
const DEFAULT_SHM: &str = "/posix_ipc_handshake_shm";

static CANCEL: CancelFlag = CancelFlag::new();

fn usage() -> ExitCode {
    eprintln!("usage: demo_handshake premise|conclusion [--sem NAME] [--shm NAME] [--iterations N] [--timeout SECS] [--seed S]");
    ExitCode::from(1)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(role) = args.first() else {
        return usage();
    };
    let role = match role.as_str() {
        "premise" => Role::Premise,
        "conclusion" => Role::Conclusion,
        _ => return usage(),
    };

    let mut config = HandshakeConfig::new(DEFAULT_SEM, DEFAULT_SHM);
    let mut rest = args[1..].iter();
    while let Some(flag) = rest.next() {
        let Some(value) = rest.next() else {
            return usage();
        };
        match flag.as_str() {
            "--sem" => config.semaphore_name = value.clone(),
            "--shm" => config.shared_memory_name = value.clone(),
            "--seed" => config.seed = Some(value.clone()),
            "--iterations" => match value.parse() {
                Ok(n) => config.iterations = n,
                Err(_) => return usage(),
            },
            "--timeout" => match value.parse::<f64>().map(duration_from_secs_f64) {
                Ok(Ok(limit)) => config.timeout = Some(limit),
                _ => return usage(),
            },
            _ => return usage(),
        }
    }

    install_cancel_handler();

    match handshake::run(role, &config, &CANCEL) {
        Ok(outcome) => {
            println!("iterations={}", outcome.iterations);
            println!("last_written={}", outcome.last_written);
            ExitCode::SUCCESS
        }
        Err(HandshakeError::Ipc(posix_ipc::IpcError::Cancelled)) => {
            eprintln!("cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("handshake failed: {e}");
            ExitCode::from(2)
        }
    }
}

// SIGINT / SIGTERM set the cancel flag; the interrupted wait then reports
// a cancellation instead of a plain signal.
fn install_cancel_handler() {
    extern "C" fn handler(_: libc::c_int) {
        CANCEL.cancel();
    }
    unsafe {
        libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
    }
}
