// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Temporarily changes the niceness of the calling thread.

use errno::Errno;
#[cfg(target_os = "linux")]
use errno::{errno, set_errno};
use tracing::{debug, warn};

/// Sets the calling thread's niceness on creation and restores the previous
/// value on drop. Failures are logged and leave the priority untouched.
///
/// Must be dropped on the thread that created it.
pub struct ScopedThreadPriority {
    tid: i32,
    previous: Option<i32>,
}

impl ScopedThreadPriority {
    pub fn new(niceness: i32) -> Self {
        let tid = crate::platform::current_thread_id();
        let previous = match get_priority(tid) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(tid, "Could not read thread priority: {e}");
                return Self {
                    tid,
                    previous: None,
                };
            }
        };
        if let Err(e) = set_priority(tid, niceness) {
            warn!(tid, niceness, "Could not change thread priority: {e}");
            return Self {
                tid,
                previous: None,
            };
        }
        debug!(tid, previous, niceness, "Changed thread priority");
        Self {
            tid,
            previous: Some(previous),
        }
    }

    /// True if the priority was changed and will be restored on drop.
    pub fn is_applied(&self) -> bool {
        self.previous.is_some()
    }
}

impl Drop for ScopedThreadPriority {
    fn drop(&mut self) {
        if let Some(previous) = self.previous {
            if let Err(e) = set_priority(self.tid, previous) {
                warn!(tid = self.tid, previous, "Could not restore thread priority: {e}");
            }
        }
    }
}

// On Linux, PRIO_PROCESS with a thread id targets that single thread.
#[cfg(target_os = "linux")]
fn get_priority(tid: i32) -> Result<i32, Errno> {
    // -1 is a valid niceness: errno is the only way to tell failure apart.
    set_errno(Errno(0));
    // SAFETY: getpriority has no memory-safety preconditions.
    let value = unsafe { libc::getpriority(libc::PRIO_PROCESS, tid as libc::id_t) };
    if value == -1 && errno().0 != 0 {
        return Err(errno());
    }
    Ok(value)
}

#[cfg(target_os = "linux")]
fn set_priority(tid: i32, niceness: i32) -> Result<(), Errno> {
    // SAFETY: setpriority has no memory-safety preconditions.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid as libc::id_t, niceness) };
    if rc != 0 {
        return Err(errno());
    }
    Ok(())
}

// Elsewhere priorities are per process, which is not ours to change.
#[cfg(not(target_os = "linux"))]
fn get_priority(_tid: i32) -> Result<i32, Errno> {
    Err(Errno(libc::ENOSYS))
}

#[cfg(not(target_os = "linux"))]
fn set_priority(_tid: i32, _niceness: i32) -> Result<(), Errno> {
    Err(Errno(libc::ENOSYS))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn priority_is_restored() {
        // Runs on its own thread so other tests keep their priority.
        std::thread::spawn(|| {
            let tid = crate::platform::current_thread_id();
            let before = get_priority(tid).unwrap();
            // Raising niceness never needs privileges.
            let target = (before + 1).min(19);
            {
                let guard = ScopedThreadPriority::new(target);
                assert!(guard.is_applied());
                assert_eq!(get_priority(tid).unwrap(), target);
            }
            // Lowering it back may need CAP_SYS_NICE; only check when we had it.
            let after = get_priority(tid).unwrap();
            assert!(after == before || after == target);
        })
        .join()
        .unwrap();
    }
}
