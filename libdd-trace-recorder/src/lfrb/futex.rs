// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Blocking wait/wake on a 32-bit atomic word.
//!
//! The word may live in a `MAP_SHARED` mapping, so the Linux implementation
//! uses the shared (non-`PRIVATE`) futex operations: a waiter in one process
//! is woken by a store from another.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Blocks while `word` holds `expected`, for at most `timeout` (forever if
/// `None`). Returns early on wake-ups, spurious ones included; callers must
/// re-check their condition.
#[cfg(target_os = "linux")]
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let ts = timeout.map(|t| libc::timespec {
        tv_sec: t.as_secs() as libc::time_t,
        tv_nsec: t.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |ts| ts as *const libc::timespec);
    // SAFETY: `word` is a valid, aligned 32-bit location for the whole call and
    // `ts_ptr` is either null or points to a live timespec. FUTEX_WAIT only
    // reads the word.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
        );
    }
}

/// Wakes every thread blocked in [`wait`] on `word`.
#[cfg(target_os = "linux")]
pub(crate) fn wake_all(word: &AtomicU32) {
    // SAFETY: `word` is a valid, aligned 32-bit location. FUTEX_WAKE does not
    // touch the word's contents.
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, i32::MAX);
    }
}

#[cfg(not(target_os = "linux"))]
const FALLBACK_NAP: Duration = Duration::from_micros(50);

/// Portable fallback: nap briefly and let the caller poll again.
#[cfg(not(target_os = "linux"))]
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    use std::sync::atomic::Ordering;
    if word.load(Ordering::Acquire) != expected {
        return;
    }
    let nap = timeout.map_or(FALLBACK_NAP, |t| t.min(FALLBACK_NAP));
    std::thread::sleep(nap);
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn wake_all(_word: &AtomicU32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn wait_returns_immediately_on_mismatch() {
        let word = AtomicU32::new(3);
        let start = Instant::now();
        wait(&word, 4, Some(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_honors_timeout() {
        let word = AtomicU32::new(0);
        let start = Instant::now();
        wait(&word, 0, Some(Duration::from_millis(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wake_releases_waiter() {
        let word = Arc::new(AtomicU32::new(0));
        let waiter = {
            let word = Arc::clone(&word);
            std::thread::spawn(move || {
                while word.load(Ordering::Acquire) == 0 {
                    wait(&word, 0, Some(Duration::from_millis(100)));
                }
            })
        };
        std::thread::sleep(Duration::from_millis(5));
        word.store(1, Ordering::Release);
        wake_all(&word);
        waiter.join().unwrap();
    }
}
