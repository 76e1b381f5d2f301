// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::buffer::Buffer;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Registry of the live buffers of this process.
///
/// The registry holds one reference to each buffer; callers hold their own.
/// A buffer stays mapped until both the registry has forgotten it and every
/// external holder has dropped theirs.
#[derive(Default)]
pub struct MmapBufferManager {
    buffers: RwLock<Vec<Arc<Buffer>>>,
}

impl MmapBufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static MmapBufferManager {
        static MANAGER: OnceLock<MmapBufferManager> = OnceLock::new();
        MANAGER.get_or_init(MmapBufferManager::new)
    }

    /// Allocates an anonymous buffer of `slots` packets. Failure is logged
    /// and reported as `None`; the caller may retry with other parameters.
    pub fn allocate_buffer_anonymous(&self, slots: u32) -> Option<Arc<Buffer>> {
        match Buffer::anonymous(slots) {
            Ok(buffer) => Some(self.register(buffer)),
            Err(e) => {
                warn!(slots, "Failed to allocate anonymous buffer: {e}");
                None
            }
        }
    }

    /// Allocates a buffer of `slots` packets backed by the file at `path`.
    pub fn allocate_buffer_file(&self, slots: u32, path: &Path) -> Option<Arc<Buffer>> {
        match Buffer::file_backed(path, slots) {
            Ok(buffer) => Some(self.register(buffer)),
            Err(e) => {
                warn!(slots, ?path, "Failed to allocate file-backed buffer: {e}");
                None
            }
        }
    }

    fn register(&self, buffer: Buffer) -> Arc<Buffer> {
        let buffer = Arc::new(buffer);
        debug!(info = ?buffer.info(), "Registered buffer");
        self.buffers.write().push(Arc::clone(&buffer));
        buffer
    }

    /// Removes `buffer` from the registry. Returns false if it wasn't
    /// registered (already deallocated, or from another manager).
    pub fn deallocate_buffer(&self, buffer: &Arc<Buffer>) -> bool {
        let mut buffers = self.buffers.write();
        match buffers.iter().position(|b| Arc::ptr_eq(b, buffer)) {
            Some(pos) => {
                buffers.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Visits every registered buffer under the read lock. `f` must not call
    /// back into this manager's allocation functions.
    pub fn for_each_buffer(&self, mut f: impl FnMut(&Arc<Buffer>)) {
        for buffer in self.buffers.read().iter() {
            f(buffer);
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_deallocate() {
        let manager = MmapBufferManager::new();
        assert!(manager.is_empty());
        let a = manager.allocate_buffer_anonymous(8).unwrap();
        let b = manager.allocate_buffer_anonymous(16).unwrap();
        assert_eq!(manager.len(), 2);

        let mut sizes = Vec::new();
        manager.for_each_buffer(|buffer| sizes.push(buffer.info().size));
        sizes.sort_unstable();
        assert_eq!(sizes, vec![8, 16]);

        assert!(manager.deallocate_buffer(&a));
        assert!(!manager.deallocate_buffer(&a));
        assert_eq!(manager.len(), 1);
        // Still usable by its holder after leaving the registry.
        a.packet_logger().unwrap().write(b"still mapped");
        assert!(manager.deallocate_buffer(&b));
        assert!(manager.is_empty());
    }

    #[test]
    fn failures_return_none() {
        let manager = MmapBufferManager::new();
        assert!(manager.allocate_buffer_anonymous(0).is_none());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("buffer");
        assert!(manager.allocate_buffer_file(8, &path).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn file_backed_allocation() {
        let manager = MmapBufferManager::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer");
        let buffer = manager.allocate_buffer_file(32, &path).unwrap();
        assert_eq!(buffer.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn global_is_shared() {
        assert!(std::ptr::eq(
            MmapBufferManager::global(),
            MmapBufferManager::global()
        ));
    }
}
