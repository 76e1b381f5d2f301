// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Returns a numeric identifier for the current OS thread.
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> i32 {
    // SAFETY: syscall(SYS_gettid) has no preconditions for current thread.
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

/// Returns a numeric identifier for the current OS thread.
#[cfg(target_os = "macos")]
pub fn current_thread_id() -> i32 {
    let mut tid: u64 = 0;
    // SAFETY: `pthread_threadid_np` has no preconditions for current thread
    // when pthread_t is 0 and output pointer is valid.
    let rc = unsafe { libc::pthread_threadid_np(0, &mut tid) };
    debug_assert_eq!(rc, 0, "pthread_threadid_np failed: {rc}");
    tid as i32
}

/// Returns a numeric identifier for the current OS thread.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn current_thread_id() -> i32 {
    // SAFETY: pthread_self has no preconditions.
    unsafe { libc::pthread_self() as usize as i32 }
}

/// Returns the process id that gets stamped into buffer headers.
pub fn current_process_id() -> i32 {
    // SAFETY: getpid has no preconditions and cannot fail.
    unsafe { libc::getpid() }
}

/// Monotonic clock reading in nanoseconds, the timebase of entry timestamps.
pub fn monotonic_time_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec. CLOCK_MONOTONIC is always
    // available so the call cannot fail.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    (ts.tv_sec as i64) * 1_000_000_000 + ts.tv_nsec as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_ids_differ_across_threads() {
        let main = current_thread_id();
        let other = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(main, other);
    }

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let a = monotonic_time_ns();
        let b = monotonic_time_ns();
        assert!(b >= a);
        assert!(a > 0);
    }

    #[test]
    fn pid_matches_std() {
        assert_eq!(current_process_id() as u32, std::process::id());
    }
}
