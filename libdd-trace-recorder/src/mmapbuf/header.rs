// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-layout header persisted at the front of every buffer region.
//!
//! ```text
//! offset  size  field
//!      0     8  magic
//!      8     4  version
//!     12     4  size (slot count)
//!     16     4  pid of the creating process
//!     20     4  entry_id_start (reserved)
//!     24     8  trace_id of the active trace, 0 if none
//!     32     4  next packet stream id
//!     36    28  padding
//! ```
//!
//! The ring buffer follows at [`HEADER_SIZE`].

use crate::BufferError;
use std::mem;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

pub const BUFFER_MAGIC: u64 = u64::from_le_bytes(*b"DDTRCBUF");
pub const BUFFER_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 64;

#[repr(C)]
pub struct MmapBufferHeader {
    magic: u64,
    version: u32,
    size: u32,
    pid: i32,
    _entry_id_start: u32,
    trace_id: AtomicI64,
    next_stream: AtomicU32,
    _padding: [u8; 28],
}

const _: () = assert!(mem::size_of::<MmapBufferHeader>() == HEADER_SIZE);

/// Snapshot of the immutable header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub version: u32,
    pub size: u32,
    pub pid: i32,
}

impl MmapBufferHeader {
    /// Stamps a fresh header into zero-filled memory.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `HEADER_SIZE` bytes, 8-byte aligned,
    /// and not yet shared with anyone.
    pub(crate) unsafe fn init(ptr: *mut Self, size: u32, pid: i32) {
        std::ptr::addr_of_mut!((*ptr).version).write(BUFFER_VERSION);
        std::ptr::addr_of_mut!((*ptr).size).write(size);
        std::ptr::addr_of_mut!((*ptr).pid).write(pid);
        // Written last: a reader finding the magic can trust the rest.
        std::ptr::addr_of_mut!((*ptr).magic).write(BUFFER_MAGIC);
    }

    /// Checks that a header left by someone else can be trusted.
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.magic != BUFFER_MAGIC {
            return Err(BufferError::BadMagic(self.magic));
        }
        if self.version != BUFFER_VERSION {
            return Err(BufferError::IncompatibleVersion {
                found: self.version,
                expected: BUFFER_VERSION,
            });
        }
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn info(&self) -> BufferInfo {
        BufferInfo {
            version: self.version,
            size: self.size,
            pid: self.pid,
        }
    }

    pub fn trace_id(&self) -> i64 {
        self.trace_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_trace_id(&self, trace_id: i64) {
        self.trace_id.store(trace_id, Ordering::Release);
    }

    pub(crate) fn next_stream(&self) -> &AtomicU32 {
        &self.next_stream
    }
}
