// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while creating, mapping or attaching to a buffer.
///
/// None of these are fatal for the host: allocation entry points log them and
/// report an empty result so the caller can retry with other parameters.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Buffer capacity must be at least one slot")]
    ZeroCapacity,
    #[error("A buffer of {slots} slots does not fit in the address space")]
    TooLarge { slots: u32 },
    #[error("Failed to map {len} bytes: {source}")]
    Map {
        len: usize,
        #[source]
        source: io::Error,
    },
    #[error("Failed to prepare backing file {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Region of {actual} bytes is too small, {required} bytes required")]
    RegionTooSmall { required: usize, actual: usize },
    #[error("Unrecognized buffer magic {0:#x}")]
    BadMagic(u64),
    #[error("Unsupported buffer version {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
    #[error("Header announces {header} slots but the ring buffer holds {ring}")]
    SizeMismatch { header: u32, ring: u32 },
    #[error("Buffer was left behind by another process and is read-only")]
    ReadOnly,
}

/// Failures while decoding a packed entry.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("Entry truncated: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },
    #[error("Unknown serialization tag {0}")]
    UnknownTag(u8),
    #[error("Unknown entry type {0}")]
    UnknownEntryType(u8),
    #[error("{0} unexpected bytes after entry")]
    TrailingBytes(usize),
}
