// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A lock-free way for threads to wait for, and advertise, a monotonically
//! increasing turn number.
//!
//! Each ring buffer slot owns one sequencer. For the slot's `T`-th occupant:
//!
//! - turn `2 * T` means the slot is idle and ready for write `T`;
//! - turn `2 * T + 1` means write `T` is in progress;
//! - turn `2 * (T + 1)` means write `T` is committed and readable.
//!
//! A reader that copies the slot while the turn reads `2 * (T + 1)` and still
//! reads `2 * (T + 1)` afterwards knows its copy was not torn by a writer from
//! the next lap.
//!
//! Turns are compared with wrapping arithmetic, so a sequencer keeps working
//! after the 32-bit counter wraps around.
//!
//! Waiting starts with a bounded spin and then blocks on a futex. The spin
//! budget is either fixed by the caller or adapted to how long turns
//! actually take to arrive (`spin_cutoff == 0`).

use super::futex;
use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tracing::error;

/// Spin budget floor for the adaptive mode.
pub const MIN_SPINS: u32 = 20;
/// Spin budget ceiling, and the budget used before any adaptation happened.
pub const MAX_SPINS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryWaitResult {
    /// The sequencer reached the requested turn.
    Success,
    /// The sequencer already moved beyond the requested turn.
    Past,
    /// The deadline expired first.
    TimedOut,
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct TurnSequencer {
    state: AtomicU32,
    waiters: AtomicU32,
}

impl TurnSequencer {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
        }
    }

    /// Returns true iff the current turn is `turn`.
    #[inline]
    pub fn is_turn(&self, turn: u32) -> bool {
        self.state.load(Ordering::Acquire) == turn
    }

    #[inline]
    pub fn current_turn(&self) -> u32 {
        self.state.load(Ordering::Acquire)
    }

    /// Waits until the current turn is `turn`. Never gives up.
    ///
    /// Observing a turn beyond `turn` means another thread completed a turn
    /// that was ours to take: the protocol is broken and the process aborts.
    pub fn wait_for_turn(&self, turn: u32, spin_cutoff: &AtomicU32, update_spin_cutoff: bool) {
        loop {
            match self.try_wait_for_turn(turn, spin_cutoff, update_spin_cutoff, None) {
                TryWaitResult::Success => return,
                TryWaitResult::Past => {
                    error!(
                        turn,
                        current = self.current_turn(),
                        "Turn sequencer moved past a turn nobody completed"
                    );
                    std::process::abort();
                }
                TryWaitResult::TimedOut => continue,
            }
        }
    }

    /// Waits until the current turn is `turn`, the turn has already passed,
    /// or `deadline` expires.
    pub fn try_wait_for_turn(
        &self,
        turn: u32,
        spin_cutoff: &AtomicU32,
        update_spin_cutoff: bool,
        deadline: Option<Instant>,
    ) -> TryWaitResult {
        let prev_thresh = spin_cutoff.load(Ordering::Relaxed);
        let adaptive = update_spin_cutoff || prev_thresh == 0;
        let effective_spin_cutoff = if adaptive { MAX_SPINS } else { prev_thresh };

        let mut tries: u32 = 0;
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current == turn {
                break;
            }
            if is_after(current, turn) {
                return TryWaitResult::Past;
            }

            if tries < effective_spin_cutoff {
                hint::spin_loop();
                tries += 1;
                continue;
            }

            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return TryWaitResult::TimedOut;
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            // Register before re-checking so a concurrent `complete_turn`
            // either sees us or we see its store.
            self.waiters.fetch_add(1, Ordering::SeqCst);
            if self.state.load(Ordering::SeqCst) == current {
                futex::wait(&self.state, current, timeout);
            }
            self.waiters.fetch_sub(1, Ordering::SeqCst);
            tries = tries.saturating_add(1);
        }

        if adaptive {
            update_cutoff(spin_cutoff, prev_thresh, tries);
        }
        TryWaitResult::Success
    }

    /// Moves the sequencer from `turn` to `turn + 1` and wakes any waiter.
    ///
    /// Only the thread that owns `turn` may call this.
    pub fn complete_turn(&self, turn: u32) {
        debug_assert_eq!(self.state.load(Ordering::Relaxed), turn);
        self.state.store(turn.wrapping_add(1), Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) != 0 {
            futex::wake_all(&self.state);
        }
    }
}

/// `a` is strictly later than `b` in wrapping turn order.
#[inline]
fn is_after(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// Moves the shared spin cutoff 1/8th of the way toward what this wait
/// suggests: twice the spins it actually needed, or the floor if spinning
/// never paid off.
fn update_cutoff(spin_cutoff: &AtomicU32, prev_thresh: u32, tries: u32) {
    let target = if tries >= MAX_SPINS {
        MIN_SPINS
    } else {
        tries.saturating_mul(2).clamp(MIN_SPINS, MAX_SPINS)
    };
    let next = if prev_thresh == 0 {
        target
    } else {
        let delta = (target as i64 - prev_thresh as i64) / 8;
        (prev_thresh as i64 + delta).clamp(MIN_SPINS as i64, MAX_SPINS as i64) as u32
    };
    spin_cutoff.store(next, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn starts_at_turn_zero() {
        let seq = TurnSequencer::new();
        assert!(seq.is_turn(0));
        assert!(!seq.is_turn(1));
    }

    #[test]
    fn complete_turn_advances_by_one() {
        let seq = TurnSequencer::new();
        seq.complete_turn(0);
        assert!(seq.is_turn(1));
        seq.complete_turn(1);
        assert!(seq.is_turn(2));
    }

    #[test]
    fn try_wait_reports_past_turns() {
        let seq = TurnSequencer::new();
        let cutoff = AtomicU32::new(10);
        seq.complete_turn(0);
        seq.complete_turn(1);
        assert_eq!(
            seq.try_wait_for_turn(1, &cutoff, false, None),
            TryWaitResult::Past
        );
        assert_eq!(
            seq.try_wait_for_turn(2, &cutoff, false, None),
            TryWaitResult::Success
        );
    }

    #[test]
    fn try_wait_times_out_on_future_turn() {
        let seq = TurnSequencer::new();
        let cutoff = AtomicU32::new(10);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(
            seq.try_wait_for_turn(4, &cutoff, false, Some(deadline)),
            TryWaitResult::TimedOut
        );
    }

    #[test]
    fn waiter_is_woken_by_complete_turn() {
        let seq = Arc::new(TurnSequencer::new());
        let waiter = {
            let seq = Arc::clone(&seq);
            std::thread::spawn(move || {
                let cutoff = AtomicU32::new(MIN_SPINS);
                seq.wait_for_turn(3, &cutoff, false);
                seq.current_turn()
            })
        };
        std::thread::sleep(Duration::from_millis(10));
        for turn in 0..3 {
            seq.complete_turn(turn);
        }
        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn wrapping_comparison() {
        assert!(is_after(1, 0));
        assert!(!is_after(0, 1));
        assert!(is_after(0, u32::MAX));
        assert!(!is_after(5, 5));
    }

    #[test]
    fn adaptive_cutoff_stays_in_bounds() {
        let cutoff = AtomicU32::new(0);
        update_cutoff(&cutoff, 0, 3);
        assert_eq!(cutoff.load(Ordering::Relaxed), MIN_SPINS);
        update_cutoff(&cutoff, MIN_SPINS, 900);
        let after = cutoff.load(Ordering::Relaxed);
        assert!(after > MIN_SPINS && after <= MAX_SPINS);
        update_cutoff(&cutoff, after, MAX_SPINS + 5);
        assert!(cutoff.load(Ordering::Relaxed) <= after);
    }

    #[test]
    fn adaptive_wait_records_a_cutoff() {
        let seq = TurnSequencer::new();
        let cutoff = AtomicU32::new(0);
        assert_eq!(
            seq.try_wait_for_turn(0, &cutoff, false, None),
            TryWaitResult::Success
        );
        assert_eq!(cutoff.load(Ordering::Relaxed), MIN_SPINS);
    }
}
