// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Primitive operation benchmarks.
//
// Run with:
//   cargo bench --bench primitives
//
// Groups:
//   name_generate    - random name generation (seeded generator)
//   semaphore        - release + immediate acquire on one semaphore
//   message_queue    - send + immediate receive at three payload sizes (Linux)

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use posix_ipc::{NameGenerator, OpenFlags, SemaphoreOptions, Timeout};

// ---------------------------------------------------------------------------
// Name generation
// ---------------------------------------------------------------------------

fn bench_name_generate(c: &mut Criterion) {
    let names = NameGenerator::seeded(0x5eed);
    c.bench_function("name_generate", |b| {
        b.iter(|| black_box(names.generate()));
    });
}

// ---------------------------------------------------------------------------
// Semaphore round trip
// ---------------------------------------------------------------------------

fn bench_semaphore(c: &mut Criterion) {
    let sem = SemaphoreOptions::new()
        .flags(OpenFlags::CREX)
        .open(None)
        .expect("create semaphore");

    c.bench_function("semaphore_release_acquire", |b| {
        b.iter(|| {
            sem.release().expect("release");
            sem.acquire(Timeout::Immediate).expect("acquire");
        });
    });

    sem.unlink().expect("unlink");
}

// ---------------------------------------------------------------------------
// Message queue round trip
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
fn bench_message_queue(c: &mut Criterion) {
    use criterion::{BenchmarkId, Throughput};
    use posix_ipc::MessageQueueOptions;

    const SIZES: &[(&str, usize)] = &[("small_48", 48), ("medium_256", 256), ("large_4096", 4096)];

    let mq = MessageQueueOptions::new()
        .flags(OpenFlags::CREX)
        .open(None)
        .expect("create queue");

    let mut group = c.benchmark_group("message_queue");
    for &(label, size) in SIZES {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, msg| {
            b.iter(|| {
                mq.send(msg, Timeout::Immediate, 0).expect("send");
                black_box(mq.receive(Timeout::Immediate).expect("receive"))
            });
        });
    }
    group.finish();

    mq.unlink().expect("unlink");
}

#[cfg(not(target_os = "linux"))]
fn bench_message_queue(_: &mut Criterion) {}

criterion_group!(benches, bench_name_generate, bench_semaphore, bench_message_queue);
criterion_main!(benches);
