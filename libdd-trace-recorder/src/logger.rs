// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::entries::{codec, BytesEntry, Entry, EntryType, FramesEntry, StandardEntry};
use crate::lfrb::Cursor;
use crate::mmapbuf::Buffer;
use crate::platform;
use crate::BufferError;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Producer side of a trace buffer: stamps entries with ids, timestamps and
/// thread ids, then encodes and packetizes them into the buffer.
///
/// Every write returns the cursor of its first packet, which is where a
/// reader must start to see the entry.
pub struct TraceLogger {
    buffer: Arc<Buffer>,
    next_id: AtomicI32,
}

impl TraceLogger {
    /// Fails with [`BufferError::ReadOnly`] for a buffer reopened from a
    /// previous process.
    pub fn new(buffer: Arc<Buffer>) -> Result<Self, BufferError> {
        if !buffer.is_writable() {
            return Err(BufferError::ReadOnly);
        }
        Ok(Self {
            buffer,
            next_id: AtomicI32::new(1),
        })
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Reserves the next entry id.
    pub fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Writes an already stamped entry as is.
    pub fn write_entry(&self, entry: &Entry<'_>) -> Cursor {
        let mut bytes = Vec::with_capacity(codec::packed_size(entry));
        codec::pack(entry, &mut bytes);
        self.buffer.packet_logger_unchecked().write(&bytes)
    }

    pub fn write_standard(
        &self,
        entry_type: EntryType,
        callid: i32,
        matchid: i32,
        extra: i64,
    ) -> Cursor {
        self.write_entry(&Entry::Standard(StandardEntry {
            id: self.next_id(),
            entry_type,
            timestamp: platform::monotonic_time_ns(),
            tid: platform::current_thread_id(),
            callid,
            matchid,
            extra,
        }))
    }

    /// Writes a stack sample of the calling thread, frames leaf first.
    pub fn write_frames(&self, entry_type: EntryType, matchid: i32, frames: &[i64]) -> Cursor {
        self.write_frames_for(platform::current_thread_id(), entry_type, matchid, frames)
    }

    /// Writes a stack sample taken from another thread.
    pub fn write_frames_for(
        &self,
        tid: i32,
        entry_type: EntryType,
        matchid: i32,
        frames: &[i64],
    ) -> Cursor {
        self.write_entry(&Entry::Frames(FramesEntry {
            id: self.next_id(),
            entry_type,
            timestamp: platform::monotonic_time_ns(),
            tid,
            matchid,
            frames,
        }))
    }

    pub fn write_bytes(&self, entry_type: EntryType, matchid: i32, bytes: &[u8]) -> Cursor {
        self.write_entry(&Entry::Bytes(BytesEntry {
            id: self.next_id(),
            entry_type,
            timestamp: platform::monotonic_time_ns(),
            tid: platform::current_thread_id(),
            matchid,
            bytes,
        }))
    }

    /// Opens trace `trace_id` and records it as the buffer's active trace.
    pub fn write_trace_start(&self, trace_id: i64, flags: i32) -> Cursor {
        self.buffer.set_trace_id(trace_id);
        self.write_standard(EntryType::TraceStart, 0, flags, trace_id)
    }

    /// Like [`Self::write_trace_start`], but the trace also picks up what the
    /// buffer still holds from before the start.
    pub fn write_trace_backwards(&self, trace_id: i64, flags: i32) -> Cursor {
        self.buffer.set_trace_id(trace_id);
        self.write_standard(EntryType::TraceBackwards, 0, flags, trace_id)
    }

    pub fn write_trace_end(&self, trace_id: i64) -> Cursor {
        let cursor = self.write_standard(EntryType::TraceEnd, 0, 0, trace_id);
        self.buffer.set_trace_id(0);
        cursor
    }

    pub fn write_trace_abort(&self, trace_id: i64) -> Cursor {
        let cursor = self.write_standard(EntryType::TraceAbort, 0, 0, trace_id);
        self.buffer.set_trace_id(0);
        cursor
    }

    pub fn write_trace_timeout(&self, trace_id: i64) -> Cursor {
        let cursor = self.write_standard(EntryType::TraceTimeout, 0, 0, trace_id);
        self.buffer.set_trace_id(0);
        cursor
    }
}
