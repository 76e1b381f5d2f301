// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffers with a stable, externally shareable memory layout: a versioned
//! header followed by a packet ring buffer, in anonymous or file-backed
//! shared memory.

pub mod buffer;
pub mod header;
pub mod manager;
pub mod region;

pub use buffer::Buffer;
pub use header::{BufferInfo, MmapBufferHeader, BUFFER_VERSION};
pub use manager::MmapBufferManager;
