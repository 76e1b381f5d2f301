// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Owned `MAP_SHARED` memory mappings.
//!
//! Shared mappings are what let a buffer outlive a crash (file-backed) or be
//! inherited across `fork` (anonymous), and what makes the futex words inside
//! slots work across processes.

use crate::BufferError;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};

pub struct MappedRegion {
    ptr: NonNull<u8>,
    /// Usable length as requested by the caller.
    len: usize,
    /// Length actually mapped, rounded up to whole pages.
    mapped_len: usize,
    file: Option<File>,
}

// SAFETY: the region is plain shared memory; synchronization of its contents
// is the business of the structures placed in it.
unsafe impl Send for MappedRegion {}
// SAFETY: see above.
unsafe impl Sync for MappedRegion {}

fn page_aligned_size(size: usize) -> Option<usize> {
    let page_size = page_size::get();
    // round up to nearest page
    size.checked_add(page_size - 1)
        .map(|s| s / page_size * page_size)
}

impl MappedRegion {
    /// Maps `len` zero-filled bytes not backed by any file.
    pub fn anonymous(len: usize) -> Result<Self, BufferError> {
        Self::map(len, libc::MAP_SHARED | libc::MAP_ANONYMOUS, None)
    }

    /// Creates (or truncates) the file at `path`, sizes it to `len` bytes and
    /// maps it. The mapping starts out zero-filled.
    pub fn file_backed(path: &Path, len: usize) -> Result<Self, BufferError> {
        let file_error = |source| BufferError::File {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(file_error)?;
        file.set_len(len as u64).map_err(file_error)?;
        Self::map(len, libc::MAP_SHARED, Some(file))
    }

    /// Maps an existing file in its entirety.
    pub fn open_file(path: &Path) -> Result<Self, BufferError> {
        let file_error = |source| BufferError::File {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(file_error)?;
        let len = file.metadata().map_err(file_error)?.len();
        Self::map(len as usize, libc::MAP_SHARED, Some(file))
    }

    fn map(len: usize, flags: libc::c_int, file: Option<File>) -> Result<Self, BufferError> {
        let map_error = |source| BufferError::Map { len, source };
        if len == 0 {
            return Err(map_error(io::Error::from(io::ErrorKind::InvalidInput)));
        }
        let mapped_len = page_aligned_size(len)
            .ok_or_else(|| map_error(io::Error::from(io::ErrorKind::InvalidInput)))?;
        let fd = file.as_ref().map_or(-1, |f| f.as_raw_fd());

        // SAFETY: a fresh mapping at a kernel-chosen address; `fd` is either
        // -1 with MAP_ANONYMOUS or an open file we keep alive.
        let result = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                fd,
                0,
            )
        };
        if result == libc::MAP_FAILED {
            return Err(map_error(io::Error::last_os_error()));
        }
        let ptr = NonNull::new(result.cast::<u8>())
            .ok_or_else(|| map_error(io::Error::from(io::ErrorKind::AddrNotAvailable)))?;

        Ok(Self {
            ptr,
            len,
            mapped_len,
            file,
        })
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_file_backed(&self) -> bool {
        self.file.is_some()
    }

    /// Schedules dirty pages to be written back to the backing file. No-op
    /// for anonymous regions.
    pub fn flush(&self) -> io::Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        // SAFETY: the range is exactly our live mapping.
        let rc = unsafe { libc::msync(self.ptr.as_ptr().cast(), self.mapped_len, libc::MS_ASYNC) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly what `map` mapped; nothing borrows the
        // region past our lifetime.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.mapped_len) };
        if rc != 0 {
            tracing::warn!(
                len = self.mapped_len,
                "munmap failed: {}",
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_region_is_zeroed_and_writable() {
        let region = MappedRegion::anonymous(100).unwrap();
        assert_eq!(region.len(), 100);
        assert!(!region.is_file_backed());
        // SAFETY: within the mapping.
        unsafe {
            let bytes = std::slice::from_raw_parts_mut(region.as_ptr(), region.len());
            assert!(bytes.iter().all(|b| *b == 0));
            bytes[99] = 7;
            assert_eq!(*region.as_ptr().add(99), 7);
        }
        region.flush().unwrap();
    }

    #[test]
    fn zero_length_is_rejected() {
        assert!(matches!(
            MappedRegion::anonymous(0),
            Err(BufferError::Map { len: 0, .. })
        ));
    }

    #[test]
    fn file_mappings_share_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");
        let first = MappedRegion::file_backed(&path, 5000).unwrap();
        assert!(first.is_file_backed());
        // SAFETY: within the mapping.
        unsafe { *first.as_ptr().add(4999) = 42 };
        first.flush().unwrap();

        let second = MappedRegion::open_file(&path).unwrap();
        assert_eq!(second.len(), 5000);
        // SAFETY: within the mapping.
        assert_eq!(unsafe { *second.as_ptr().add(4999) }, 42);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        assert!(matches!(
            MappedRegion::open_file(&path),
            Err(BufferError::File { .. })
        ));
    }

    #[test]
    fn page_rounding() {
        let page = page_size::get();
        assert_eq!(page_aligned_size(1), Some(page));
        assert_eq!(page_aligned_size(page), Some(page));
        assert_eq!(page_aligned_size(page + 1), Some(2 * page));
        assert_eq!(page_aligned_size(usize::MAX), None);
    }
}
