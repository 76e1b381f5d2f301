// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use libdd_trace_recorder::lfrb::SlotValue;
use libdd_trace_recorder::{Cursor, LockFreeRingBuffer, WaitPolicy};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WRITERS: u64 = 8;
const WRITES_PER_WRITER: u64 = 10_000;

fn policy() -> WaitPolicy {
    WaitPolicy {
        spin_cutoff: 100,
        timeout: Some(Duration::from_millis(10)),
    }
}

#[test]
fn concurrent_writers_get_distinct_cursors() {
    let ring = Arc::new(LockFreeRingBuffer::<u64>::with_policy(1024, policy()).unwrap());
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                (0..WRITES_PER_WRITER)
                    .map(|i| ring.write_and_get_cursor(writer * WRITES_PER_WRITER + i))
                    .collect::<Vec<Cursor>>()
            })
        })
        .collect();

    let mut cursors = HashSet::new();
    for handle in handles {
        for cursor in handle.join().unwrap() {
            assert!(cursors.insert(cursor), "cursor handed out twice");
        }
    }
    assert_eq!(cursors.len() as u64, WRITERS * WRITES_PER_WRITER);

    // The last `capacity` writes are all readable and distinct.
    let mut cursor = ring.current_tail(0.0);
    let head = ring.current_head();
    assert_eq!(cursor.distance_to(&head), 1024);
    let mut values = HashSet::new();
    while cursor < head {
        assert!(values.insert(ring.try_read(&cursor).unwrap()));
        cursor.move_forward(1);
    }
    assert_eq!(values.len(), 1024);

    // Anything older is gone.
    let mut old = ring.current_tail(0.0);
    old.move_backward(1);
    assert!(ring.is_overwritten(&old));
    assert_eq!(ring.try_read(&old), None);
    assert_eq!(ring.wait_and_try_read(&old), None);
}

#[test]
fn reader_follows_writer() {
    let ring = Arc::new(LockFreeRingBuffer::<u64>::with_policy(64, policy()).unwrap());
    let start = ring.current_head();
    let reader = {
        let ring = Arc::clone(&ring);
        std::thread::spawn(move || {
            let mut cursor = start;
            let mut seen = Vec::new();
            while seen.len() < 32 {
                if let Some(value) = ring.wait_and_try_read(&cursor) {
                    seen.push(value);
                    cursor.move_forward(1);
                }
            }
            seen
        })
    };
    for v in 0..32 {
        ring.write(v);
        if v % 8 == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    assert_eq!(reader.join().unwrap(), (0..32).collect::<Vec<_>>());
}

#[test]
fn cursor_moves_saturate_at_the_first_write() {
    let ring = LockFreeRingBuffer::<u64>::new(10).unwrap();
    let mut cursor = ring.current_head();
    for v in 0..3 {
        ring.write(v);
    }
    cursor.move_forward(3);
    assert!(cursor.move_backward(10));
    assert_eq!(ring.try_read(&cursor), Some(0));
    assert!(!cursor.move_backward(1));
}

/// Every word holds the same value, so a copy mixing two writes shows.
#[repr(C)]
#[derive(Clone, Copy)]
struct Stamp([u64; 16]);

// SAFETY: plain integers, all-zero is a valid stamp.
unsafe impl SlotValue for Stamp {}

impl Stamp {
    fn is_whole(&self) -> bool {
        self.0.iter().all(|word| *word == self.0[0])
    }
}

#[test]
fn reads_racing_wrap_around_are_whole_or_fail() {
    let ring = Arc::new(LockFreeRingBuffer::<Stamp>::with_policy(4, policy()).unwrap());
    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = (0..4u64)
        .map(|writer| {
            let ring = Arc::clone(&ring);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut value = writer << 48;
                while !stop.load(Ordering::Relaxed) {
                    value += 1;
                    ring.write(Stamp([value; 16]));
                }
            })
        })
        .collect();

    let mut whole = 0u64;
    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        let mut cursor = ring.current_head();
        cursor.move_backward(1);
        for stamp in [ring.try_read(&cursor), ring.wait_and_try_read(&cursor)]
            .into_iter()
            .flatten()
        {
            assert!(stamp.is_whole(), "torn read: {:?}", stamp.0);
            whole += 1;
        }
    }
    stop.store(true, Ordering::Relaxed);
    for writer in writers {
        writer.join().unwrap();
    }
    assert!(whole > 0);
}
