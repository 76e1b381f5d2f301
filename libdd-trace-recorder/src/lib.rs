// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Always-on, in-process event recording.
//!
//! Producers on any thread append timestamped entries (stack samples, marks,
//! counters, ...) to a fixed-capacity [`lfrb::LockFreeRingBuffer`] that lives
//! inside a [`mmapbuf::Buffer`]: a mapped region, anonymous or file-backed,
//! prefixed by a versioned header so other processes (or the next run of this
//! one) can find and validate it.
//!
//! A consumer drains the buffer with [`lfrb::Cursor`]s. Entries are
//! reassembled from fixed-size [`packet::Packet`]s, decoded by
//! [`entries::codec`] and fed through a chain of [`entries::EntryVisitor`]s.
//! The head of that chain, [`writer::TraceLifecycleVisitor`], recognizes trace
//! start/end/abort markers and streams the matching entries to a compressed
//! trace file.
//!
//! Writers never wait on readers. Reads are best-effort: a reader that falls
//! more than one lap behind gets a definite failure, never stale data.

#[cfg(not(unix))]
compile_error!("libdd-trace-recorder only supports Unix-like operating systems.");

pub mod config;
pub mod entries;
mod error;
pub mod lfrb;
pub mod logger;
pub mod mmapbuf;
pub mod packet;
pub mod platform;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod writer;

pub use config::TraceWriterConfig;
pub use error::{BufferError, CodecError};
pub use lfrb::{Cursor, LockFreeRingBuffer, WaitPolicy};
pub use logger::TraceLogger;
pub use mmapbuf::{Buffer, MmapBufferManager};
pub use writer::{AbortReason, TraceCallbacks, TraceLifecycleVisitor, TraceWriter};
