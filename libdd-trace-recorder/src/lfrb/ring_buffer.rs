// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity, multi-writer ring buffer over an unbounded stream of writes.
//!
//! 1. Writers cannot block on other writers UNLESS they are `capacity` writes apart from each
//!    other (writing to the same slot after a wrap-around).
//! 2. Writers cannot block on readers.
//! 3. Readers can wait for writes that haven't occurred yet.
//! 4. Readers can detect if they are lagging behind.
//!
//! Reads are best-effort, writes are guaranteed. The buffer holds the last
//! `capacity` writes, but a [`Cursor`] may point anywhere in the stream: reads
//! from the "future" can optionally block, reads from the "past" always fail.
//!
//! # Layout
//!
//! ```text
//! +------------------+--------+--------+-----+------------------+
//! | RingBufferControl| slot 0 | slot 1 | ... | slot capacity-1  |
//! +------------------+--------+--------+-----+------------------+
//! ```
//!
//! The control block and slots live in a [`MappedRegion`] at a fixed offset.
//! All-zero memory is a valid empty buffer, so a fresh mapping only needs its
//! capacity stamped in.

use super::turn_sequencer::{TryWaitResult, TurnSequencer};
use crate::mmapbuf::region::MappedRegion;
use crate::BufferError;
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::slice;
use std::sync::atomic::{self, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Values that can be stored in a ring buffer slot.
///
/// # Safety
///
/// The all-zero bit pattern must be a valid value of the type, and the type
/// must not own heap memory or other resources: slots are zero-filled by the
/// mapping and copied out bytewise, possibly by another process.
pub unsafe trait SlotValue: Copy + Send + Sync + 'static {}

macro_rules! impl_slot_value {
    ($($t:ty),*) => {
        $(
            // SAFETY: integers are plain data and zero is a valid value.
            unsafe impl SlotValue for $t {}
        )*
    };
}

impl_slot_value!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Tunes how readers wait for a slot that is not readable yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Spins before blocking. 0 selects the adaptive spin budget.
    pub spin_cutoff: u32,
    /// Upper bound on a single blocking read. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            spin_cutoff: super::turn_sequencer::MAX_SPINS,
            timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// Opaque pointer to a past or future write.
///
/// Can be moved relative to its current location but not in absolute terms,
/// and is only meaningful for the buffer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    ticket: u64,
}

impl Cursor {
    #[inline]
    pub(crate) const fn new(ticket: u64) -> Self {
        Self { ticket }
    }

    #[cfg(test)]
    #[inline]
    pub(crate) const fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Returns true if this cursor now points to a different write.
    pub fn move_forward(&mut self, steps: u64) -> bool {
        let prev = self.ticket;
        self.ticket = self.ticket.saturating_add(steps);
        prev != self.ticket
    }

    /// Returns true if this cursor now points to a previous write. Saturates
    /// at the first write ever made.
    pub fn move_backward(&mut self, steps: u64) -> bool {
        let prev = self.ticket;
        self.ticket = self.ticket.saturating_sub(steps);
        prev != self.ticket
    }

    /// Number of writes from `self` to `other`; negative when `other` is
    /// older.
    pub fn distance_to(&self, other: &Cursor) -> i64 {
        other.ticket.wrapping_sub(self.ticket) as i64
    }
}

#[repr(C)]
struct RingBufferControl {
    capacity: u32,
    _reserved: u32,
    /// Next ticket to hand out.
    ticket: AtomicU64,
}

#[repr(C)]
pub(crate) struct RingBufferSlot<T> {
    sequencer: TurnSequencer,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only written by the single writer owning the slot's
// current even turn, and readers validate their copies against the sequencer.
unsafe impl<T: SlotValue> Sync for RingBufferSlot<T> {}

impl<T: SlotValue> RingBufferSlot<T> {
    fn write(&self, turn: u32, value: T) {
        let start = turn.wrapping_mul(2);
        let cutoff = AtomicU32::new(0);
        self.sequencer.wait_for_turn(start, &cutoff, false);

        // Odd turn: write in progress.
        self.sequencer.complete_turn(start);
        atomic::fence(Ordering::Release);

        // SAFETY: we own the odd turn, no other writer can touch `data` until
        // we complete it. Readers may race this store but will observe the
        // odd turn and discard what they copied.
        unsafe { ptr::write_volatile(self.data.get(), value) };

        self.sequencer.complete_turn(start.wrapping_add(1));
        // At (turn + 1) * 2
    }

    fn try_read(&self, turn: u32) -> Option<T> {
        // The write that started at turn 0 ended at turn 2
        let desired = turn.wrapping_add(1).wrapping_mul(2);
        if !self.sequencer.is_turn(desired) {
            return None;
        }
        self.copy_if_still(desired)
    }

    fn wait_and_try_read(
        &self,
        turn: u32,
        spin_cutoff: &AtomicU32,
        update_spin_cutoff: bool,
        deadline: Option<Instant>,
    ) -> Option<T> {
        let desired = turn.wrapping_add(1).wrapping_mul(2);
        match self
            .sequencer
            .try_wait_for_turn(desired, spin_cutoff, update_spin_cutoff, deadline)
        {
            TryWaitResult::Success => self.copy_if_still(desired),
            TryWaitResult::Past | TryWaitResult::TimedOut => None,
        }
    }

    #[inline]
    fn copy_if_still(&self, desired: u32) -> Option<T> {
        // SAFETY: `T: SlotValue` is plain data, so any bit pattern we copy is
        // a valid `T`. The copy may be torn by a writer from the next lap;
        // the re-check below rejects it in that case.
        let value = unsafe { ptr::read_volatile(self.data.get()) };
        atomic::fence(Ordering::Acquire);
        // if it's still the same turn, we read the value successfully
        self.sequencer.is_turn(desired).then_some(value)
    }
}

pub struct LockFreeRingBuffer<T: SlotValue> {
    region: MappedRegion,
    offset: usize,
    capacity: u32,
    policy: WaitPolicy,
    /// Spin budget shared by this process' blocking readers.
    reader_spin_cutoff: AtomicU32,
    _marker: PhantomData<T>,
}

impl<T: SlotValue> LockFreeRingBuffer<T> {
    const SLOTS_OFFSET: usize = round_up(
        mem::size_of::<RingBufferControl>(),
        mem::align_of::<RingBufferSlot<T>>(),
    );

    /// Alignment the region offset passed to [`Self::create_in`] must honor.
    pub(crate) const ALIGN: usize = {
        let control = mem::align_of::<RingBufferControl>();
        let slot = mem::align_of::<RingBufferSlot<T>>();
        if control > slot {
            control
        } else {
            slot
        }
    };

    /// Bytes needed for a buffer of `capacity` slots, control block included.
    pub fn allocation_size(capacity: u32) -> Option<usize> {
        (capacity as usize)
            .checked_mul(mem::size_of::<RingBufferSlot<T>>())?
            .checked_add(Self::SLOTS_OFFSET)
    }

    /// Creates a standalone buffer in its own anonymous mapping.
    pub fn new(capacity: u32) -> Result<Self, BufferError> {
        Self::with_policy(capacity, WaitPolicy::default())
    }

    pub fn with_policy(capacity: u32, policy: WaitPolicy) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        let size =
            Self::allocation_size(capacity).ok_or(BufferError::TooLarge { slots: capacity })?;
        let region = MappedRegion::anonymous(size)?;
        Self::create_in(region, 0, capacity, policy)
    }

    /// Constructs an empty buffer of `capacity` slots at `offset` inside a
    /// zero-filled `region`, taking ownership of the region.
    pub(crate) fn create_in(
        region: MappedRegion,
        offset: usize,
        capacity: u32,
        policy: WaitPolicy,
    ) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        let required = Self::allocation_size(capacity)
            .and_then(|size| size.checked_add(offset))
            .ok_or(BufferError::TooLarge { slots: capacity })?;
        Self::check_fits(&region, offset, required)?;

        // SAFETY: the region is large enough and suitably aligned (checked
        // above), and nobody else has seen it yet.
        unsafe {
            let control = region.as_ptr().add(offset) as *mut RingBufferControl;
            ptr::addr_of_mut!((*control).capacity).write(capacity);
        }
        Ok(Self::from_parts(region, offset, capacity, policy))
    }

    /// Attaches to a buffer previously constructed at `offset` in `region`,
    /// e.g. by another process through a file-backed mapping.
    pub(crate) fn attach(
        region: MappedRegion,
        offset: usize,
        policy: WaitPolicy,
    ) -> Result<Self, BufferError> {
        Self::check_fits(&region, offset, offset + mem::size_of::<RingBufferControl>())?;
        // SAFETY: the control block is within bounds and aligned.
        let capacity = unsafe {
            let control = region.as_ptr().add(offset) as *const RingBufferControl;
            ptr::addr_of!((*control).capacity).read()
        };
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        let required = Self::allocation_size(capacity)
            .and_then(|size| size.checked_add(offset))
            .ok_or(BufferError::TooLarge { slots: capacity })?;
        Self::check_fits(&region, offset, required)?;
        Ok(Self::from_parts(region, offset, capacity, policy))
    }

    fn check_fits(region: &MappedRegion, offset: usize, required: usize) -> Result<(), BufferError> {
        if region.len() < required {
            return Err(BufferError::RegionTooSmall {
                required,
                actual: region.len(),
            });
        }
        // Mappings are page aligned; only the offset can break alignment.
        debug_assert_eq!(offset % Self::ALIGN, 0, "misaligned ring buffer offset");
        Ok(())
    }

    fn from_parts(region: MappedRegion, offset: usize, capacity: u32, policy: WaitPolicy) -> Self {
        Self {
            region,
            offset,
            capacity,
            reader_spin_cutoff: AtomicU32::new(policy.spin_cutoff),
            policy,
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.policy
    }

    pub(crate) fn region(&self) -> &MappedRegion {
        &self.region
    }

    /// Perform a single write.
    /// Writes can block iff a previous writer has not yet completed a write
    /// for the same slot (before the most recent wrap-around).
    pub fn write(&self, value: T) {
        self.write_and_get_cursor(value);
    }

    /// Same as [`Self::write`], returning a Cursor pointing to the
    /// just-written value.
    pub fn write_and_get_cursor(&self, value: T) -> Cursor {
        let ticket = self.control().ticket.fetch_add(1, Ordering::SeqCst);
        self.slot(ticket).write(self.turn(ticket), value);
        Cursor::new(ticket)
    }

    /// Reads the value at the cursor without waiting.
    ///
    /// `None` means the value is unusable: not written yet, overwritten, or
    /// overwritten while being copied. It never means end of stream.
    pub fn try_read(&self, cursor: &Cursor) -> Option<T> {
        self.slot(cursor.ticket)
            .try_read(self.turn(cursor.ticket))
    }

    /// Reads the value at the cursor, blocking up to the configured timeout
    /// if the write has not occurred yet.
    pub fn wait_and_try_read(&self, cursor: &Cursor) -> Option<T> {
        let deadline = self.policy.timeout.map(|timeout| Instant::now() + timeout);
        self.slot(cursor.ticket).wait_and_try_read(
            self.turn(cursor.ticket),
            &self.reader_spin_cutoff,
            self.adaptive_spins(),
            deadline,
        )
    }

    /// Reads the value at the cursor, blocking until `deadline` (forever if
    /// `None`) if the write has not occurred yet.
    pub fn wait_and_try_read_until(&self, cursor: &Cursor, deadline: Option<Instant>) -> Option<T> {
        self.slot(cursor.ticket).wait_and_try_read(
            self.turn(cursor.ticket),
            &self.reader_spin_cutoff,
            self.adaptive_spins(),
            deadline,
        )
    }

    /// A zero spin cutoff in the policy keeps tuning the reader budget on
    /// every wait.
    #[inline]
    fn adaptive_spins(&self) -> bool {
        self.policy.spin_cutoff == 0
    }

    /// Returns a Cursor pointing to the first write that has not occurred yet.
    pub fn current_head(&self) -> Cursor {
        Cursor::new(self.control().ticket.load(Ordering::SeqCst))
    }

    /// Returns a Cursor pointing to a currently readable write.
    ///
    /// `skip_fraction` in `[0, 1]` places the cursor inside the readable
    /// window: 0 is the oldest readable write, 1 the latest one (if any).
    pub fn current_tail(&self, skip_fraction: f64) -> Cursor {
        debug_assert!((0.0..=1.0).contains(&skip_fraction));
        let skip_fraction = skip_fraction.clamp(0.0, 1.0);
        let ticket = self.control().ticket.load(Ordering::SeqCst);

        let back_step = ((1.0 - skip_fraction) * self.capacity as f64).round() as u64;
        // always try to move at least one step backward to something readable
        let back_step = back_step.max(1);
        // can't go back more steps than we've taken
        let back_step = back_step.min(ticket);

        Cursor::new(ticket - back_step)
    }

    /// True if the write at `cursor` has been (or is being) overwritten, so
    /// every read of it will fail.
    pub fn is_overwritten(&self, cursor: &Cursor) -> bool {
        let head = self.control().ticket.load(Ordering::SeqCst);
        head.saturating_sub(cursor.ticket) > self.capacity as u64
    }

    #[inline]
    fn control(&self) -> &RingBufferControl {
        // SAFETY: `create_in`/`attach` checked that the control block is in
        // bounds; the region lives as long as `self`.
        unsafe { &*(self.region.as_ptr().add(self.offset) as *const RingBufferControl) }
    }

    #[inline]
    fn slots(&self) -> &[RingBufferSlot<T>] {
        // SAFETY: the slot array is in bounds and aligned (checked at
        // construction) and zero-filled memory is a valid slot.
        unsafe {
            let base = self.region.as_ptr().add(self.offset + Self::SLOTS_OFFSET);
            slice::from_raw_parts(base as *const RingBufferSlot<T>, self.capacity as usize)
        }
    }

    #[inline]
    fn slot(&self, ticket: u64) -> &RingBufferSlot<T> {
        &self.slots()[self.idx(ticket)]
    }

    #[inline]
    fn idx(&self, ticket: u64) -> usize {
        (ticket % self.capacity as u64) as usize
    }

    #[inline]
    fn turn(&self, ticket: u64) -> u32 {
        (ticket / self.capacity as u64) as u32
    }
}

const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}
