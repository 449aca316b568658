// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Two-party hash handshake over a semaphore and a shared memory segment,
// first between two threads, then between two processes.

use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use posix_ipc::handshake::{self, digest, digest_n, HandshakeConfig, HandshakeError, Role};
use posix_ipc::{
    unlink_semaphore, unlink_shared_memory, NeverCancelled, OpenFlags, ScopedAccess,
    SemaphoreOptions, SharedMemoryOptions, Timeout,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_names(prefix: &str) -> (String, String) {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    (
        format!("/{prefix}_sem_{pid}_{n}"),
        format!("/{prefix}_shm_{pid}_{n}"),
    )
}

fn config(prefix: &str, iterations: usize) -> HandshakeConfig {
    let (sem, shm) = unique_names(prefix);
    let _ = unlink_semaphore(&sem);
    let _ = unlink_shared_memory(&shm);
    let mut config = HandshakeConfig::new(&sem, &shm);
    config.iterations = iterations;
    config.timeout = Some(Duration::from_secs(20));
    config.seed = Some(format!("seed-{prefix}"));
    config
}

#[test]
fn threads_complete_handshake() {
    let config = config("threads", 200);
    let seed = config.seed.clone().unwrap();

    let premise_config = config.clone();
    let premise =
        thread::spawn(move || handshake::run(Role::Premise, &premise_config, &NeverCancelled));
    let conclusion = handshake::run(Role::Conclusion, &config, &NeverCancelled).expect("conclusion");
    let premise = premise.join().unwrap().expect("premise");

    assert_eq!(premise.iterations, 200);
    assert_eq!(conclusion.iterations, 200);
    // Every write is the digest of the previous one, starting from the seed.
    assert_eq!(conclusion.last_written, digest_n(&seed, 2 * 200 - 1));
    assert_eq!(premise.last_written, digest_n(&seed, 2 * 200));
    assert_eq!(premise.last_written, digest(&conclusion.last_written));

    // The premise removed both names.
    assert!(unlink_semaphore(&config.semaphore_name).unwrap_err().is_existential());
    assert!(unlink_shared_memory(&config.shared_memory_name)
        .unwrap_err()
        .is_existential());
}

#[test]
fn unexpected_value_is_reported_as_corruption() {
    let config = config("corrupt", 5);

    // Stand in for a misbehaving premise: create the resources and write a
    // seed, then overwrite the conclusion's reply with garbage.
    let shm = SharedMemoryOptions::new()
        .flags(OpenFlags::CREX)
        .size(config.size)
        .open(Some(&config.shared_memory_name))
        .expect("shm");
    let sem = SemaphoreOptions::new()
        .flags(OpenFlags::CREX)
        .initial_value(1)
        .open(Some(&config.semaphore_name))
        .expect("sem");
    let region = shm.map().expect("map");
    ScopedAccess::new(&region, &sem, Timeout::Unbounded)
        .expect("access")
        .write_str("the seed")
        .expect("write seed");

    let conclusion_config = config.clone();
    let conclusion = thread::spawn(move || {
        handshake::run(Role::Conclusion, &conclusion_config, &NeverCancelled)
    });

    // Wait for the reply, then answer with something that is not its digest.
    let reply = digest("the seed");
    loop {
        let access = ScopedAccess::new(&region, &sem, Timeout::Unbounded).expect("access");
        if access.read_str().expect("read") == reply {
            access.write_str("not a digest").expect("write garbage");
            break;
        }
        drop(access);
        thread::sleep(Duration::from_millis(1));
    }

    match conclusion.join().unwrap() {
        Err(HandshakeError::Corruption {
            iterations,
            found,
            expected,
        }) => {
            assert_eq!(iterations, 1);
            assert_eq!(found, "not a digest");
            assert_eq!(expected, digest(&reply));
        }
        other => panic!("expected corruption, got {other:?}"),
    }

    shm.unlink().expect("unlink shm");
    sem.unlink().expect("unlink sem");
}

#[test]
fn leftovers_from_earlier_run_are_replaced() {
    let config = config("leftover", 50);
    let seed = config.seed.clone().unwrap();

    // A crashed run left the semaphore taken and a tiny segment with junk.
    let stale_sem = SemaphoreOptions::new()
        .flags(OpenFlags::CREX)
        .initial_value(0)
        .open(Some(&config.semaphore_name))
        .expect("stale sem");
    let stale_shm = SharedMemoryOptions::new()
        .flags(OpenFlags::CREX)
        .size(16)
        .open(Some(&config.shared_memory_name))
        .expect("stale shm");
    stale_shm
        .map()
        .expect("map")
        .write_at(0, b"junk\0")
        .expect("write junk");
    drop((stale_sem, stale_shm));

    let premise_config = config.clone();
    let premise =
        thread::spawn(move || handshake::run(Role::Premise, &premise_config, &NeverCancelled));
    // Let the premise replace the leftovers before the conclusion looks.
    thread::sleep(Duration::from_millis(200));
    let conclusion = handshake::run(Role::Conclusion, &config, &NeverCancelled).expect("conclusion");
    let premise = premise.join().unwrap().expect("premise");

    assert_eq!(conclusion.last_written, digest_n(&seed, 2 * 50 - 1));
    assert_eq!(premise.last_written, digest_n(&seed, 2 * 50));
}

#[test]
fn conclusion_without_premise_stalls() {
    let mut config = config("lonely", 1);
    config.timeout = Some(Duration::from_millis(100));
    let err = handshake::run(Role::Conclusion, &config, &NeverCancelled).unwrap_err();
    assert!(matches!(err, HandshakeError::Stalled(_)), "{err:?}");
}

fn parse_field(stdout: &str, key: &str) -> String {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{key}=")))
        .unwrap_or_else(|| panic!("no {key} in output:\n{stdout}"))
        .to_string()
}

#[test]
fn processes_complete_handshake() {
    let config = config("procs", 100);
    let exe = env!("CARGO_BIN_EXE_demo_handshake");
    let args = |role: &str| {
        vec![
            role.to_string(),
            "--sem".to_string(),
            config.semaphore_name.clone(),
            "--shm".to_string(),
            config.shared_memory_name.clone(),
            "--iterations".to_string(),
            config.iterations.to_string(),
            "--timeout".to_string(),
            "20".to_string(),
        ]
    };

    let mut premise_args = args("premise");
    premise_args.extend(["--seed".to_string(), "cross-process".to_string()]);
    let premise = Command::new(exe)
        .args(&premise_args)
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn premise");
    let conclusion = Command::new(exe)
        .args(args("conclusion"))
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn conclusion");

    let conclusion = conclusion.wait_with_output().expect("conclusion output");
    let premise = premise.wait_with_output().expect("premise output");
    assert!(premise.status.success(), "premise failed: {:?}", premise.status);
    assert!(conclusion.status.success(), "conclusion failed: {:?}", conclusion.status);

    let premise_out = String::from_utf8_lossy(&premise.stdout);
    let conclusion_out = String::from_utf8_lossy(&conclusion.stdout);
    assert_eq!(parse_field(&premise_out, "iterations"), "100");
    assert_eq!(parse_field(&conclusion_out, "iterations"), "100");
    assert_eq!(
        parse_field(&premise_out, "last_written"),
        digest_n("cross-process", 200)
    );
    assert_eq!(
        parse_field(&conclusion_out, "last_written"),
        digest_n("cross-process", 199)
    );
}
