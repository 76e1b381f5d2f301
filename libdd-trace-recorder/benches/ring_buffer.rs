// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use criterion::*;
use libdd_trace_recorder::entries::EntryType;
use libdd_trace_recorder::{Buffer, LockFreeRingBuffer, TraceLogger};
use std::sync::Arc;

fn ring_buffer_write(c: &mut Criterion) {
    let ring = LockFreeRingBuffer::<u64>::new(4096).unwrap();
    let mut value = 0u64;
    c.bench_function("ring buffer write u64", |b| {
        b.iter(|| {
            value += 1;
            black_box(ring.write_and_get_cursor(black_box(value)));
        })
    });
}

fn ring_buffer_read(c: &mut Criterion) {
    let ring = LockFreeRingBuffer::<u64>::new(4096).unwrap();
    for v in 0..4096 {
        ring.write(v);
    }
    c.bench_function("ring buffer read tail", |b| {
        b.iter(|| {
            let cursor = ring.current_tail(0.5);
            black_box(ring.try_read(&cursor));
        })
    });
}

fn logger_write(c: &mut Criterion) {
    let logger = TraceLogger::new(Arc::new(Buffer::anonymous(8192).unwrap())).unwrap();
    let frames: Vec<i64> = (0..32).collect();
    let mut group = c.benchmark_group("trace logger");
    group.bench_function("standard entry", |b| {
        b.iter(|| black_box(logger.write_standard(EntryType::MarkPush, 1, 2, 3)))
    });
    group.bench_function("32 frames", |b| {
        b.iter(|| black_box(logger.write_frames(EntryType::StackFrame, 1, &frames)))
    });
    group.finish();
}

criterion_group!(benches, ring_buffer_write, ring_buffer_read, logger_write);
criterion_main!(benches);
