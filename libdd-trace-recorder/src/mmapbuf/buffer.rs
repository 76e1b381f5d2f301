// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::header::{BufferInfo, MmapBufferHeader, HEADER_SIZE};
use super::region::MappedRegion;
use crate::lfrb::{LockFreeRingBuffer, WaitPolicy};
use crate::packet::{Packet, PacketLogger};
use crate::platform;
use crate::BufferError;
use std::path::{Path, PathBuf};

/// A ring buffer of [`Packet`]s sharing one mapped region with its header.
///
/// File-backed buffers survive the process: another process (or a later run)
/// can map the same file with [`Buffer::open_existing`] and read what was
/// left behind. Such a buffer is read-only: a writer that died mid-write
/// leaves its slot in a turn no later writer can get past.
pub struct Buffer {
    ring: LockFreeRingBuffer<Packet>,
    path: Option<PathBuf>,
    writable: bool,
}

impl Buffer {
    /// Bytes of region needed for a buffer of `slots` packets.
    pub fn allocation_size(slots: u32) -> Option<usize> {
        LockFreeRingBuffer::<Packet>::allocation_size(slots)?.checked_add(HEADER_SIZE)
    }

    pub fn anonymous(slots: u32) -> Result<Self, BufferError> {
        let region = MappedRegion::anonymous(Self::region_size(slots)?)?;
        Self::create(region, slots, None)
    }

    /// Creates (or truncates) `path` and places a fresh buffer in it.
    pub fn file_backed(path: &Path, slots: u32) -> Result<Self, BufferError> {
        let region = MappedRegion::file_backed(path, Self::region_size(slots)?)?;
        Self::create(region, slots, Some(path.to_path_buf()))
    }

    /// Maps a buffer file written by a previous process, after checking that
    /// its header is one we understand.
    pub fn open_existing(path: &Path) -> Result<Self, BufferError> {
        let region = MappedRegion::open_file(path)?;
        if region.len() < HEADER_SIZE {
            return Err(BufferError::RegionTooSmall {
                required: HEADER_SIZE,
                actual: region.len(),
            });
        }
        // SAFETY: page-aligned region of at least HEADER_SIZE bytes.
        let header = unsafe { &*(region.as_ptr() as *const MmapBufferHeader) };
        header.validate()?;
        let slots = header.size();

        let ring = LockFreeRingBuffer::attach(region, HEADER_SIZE, WaitPolicy::default())?;
        if ring.capacity() != slots {
            return Err(BufferError::SizeMismatch {
                header: slots,
                ring: ring.capacity(),
            });
        }
        Ok(Self {
            ring,
            path: Some(path.to_path_buf()),
            writable: false,
        })
    }

    fn region_size(slots: u32) -> Result<usize, BufferError> {
        if slots == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Self::allocation_size(slots).ok_or(BufferError::TooLarge { slots })
    }

    fn create(
        region: MappedRegion,
        slots: u32,
        path: Option<PathBuf>,
    ) -> Result<Self, BufferError> {
        // SAFETY: the region is fresh, zero-filled, page aligned and larger
        // than the header.
        unsafe {
            MmapBufferHeader::init(
                region.as_ptr().cast(),
                slots,
                platform::current_process_id(),
            )
        };
        let ring = LockFreeRingBuffer::create_in(region, HEADER_SIZE, slots, WaitPolicy::default())?;
        Ok(Self {
            ring,
            path,
            writable: true,
        })
    }

    pub fn header(&self) -> &MmapBufferHeader {
        // SAFETY: the header was initialized or validated at construction
        // and lives at the start of the region we own.
        unsafe { &*(self.ring.region().as_ptr() as *const MmapBufferHeader) }
    }

    pub fn info(&self) -> BufferInfo {
        self.header().info()
    }

    pub fn ring_buffer(&self) -> &LockFreeRingBuffer<Packet> {
        &self.ring
    }

    /// Backing file, `None` for anonymous buffers.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records the active trace id, 0 when no trace is running.
    pub fn set_trace_id(&self, trace_id: i64) {
        self.header().set_trace_id(trace_id);
    }

    pub fn trace_id(&self) -> i64 {
        self.header().trace_id()
    }

    /// False for buffers mapped with [`Buffer::open_existing`].
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn packet_logger(&self) -> Result<PacketLogger<'_>, BufferError> {
        if !self.writable {
            return Err(BufferError::ReadOnly);
        }
        Ok(self.packet_logger_unchecked())
    }

    /// For holders that already checked [`Self::is_writable`].
    pub(crate) fn packet_logger_unchecked(&self) -> PacketLogger<'_> {
        PacketLogger::new(&self.ring, self.header().next_stream())
    }

    /// Asks the kernel to write a file-backed buffer out.
    pub fn sync(&self) -> std::io::Result<()> {
        self.ring.region().flush()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("info", &self.info())
            .field("path", &self.path)
            .field("writable", &self.writable)
            .finish()
    }
}
