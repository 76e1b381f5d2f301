// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Binary form of entries as they travel through the buffer.
//!
//! Little-endian. One tag byte selects the shape, then:
//!
//! ```text
//! Standard: id:i32 type:u8 timestamp:i64 tid:i32 callid:i32 matchid:i32 extra:i64
//! Frames:   id:i32 type:u8 timestamp:i64 tid:i32 matchid:i32 count:u32 frames:[i64; count]
//! Bytes:    id:i32 type:u8 timestamp:i64 tid:i32 matchid:i32 len:u32 bytes:[u8; len]
//! ```

use super::{BytesEntry, Entry, EntryType, FramesEntry, StandardEntry};
use crate::CodecError;

const TAG_STANDARD: u8 = 1;
const TAG_FRAMES: u8 = 2;
const TAG_BYTES: u8 = 3;

const STANDARD_SIZE: usize = 1 + 4 + 1 + 8 + 4 + 4 + 4 + 8;
const FRAMES_HEADER_SIZE: usize = 1 + 4 + 1 + 8 + 4 + 4 + 4;
const BYTES_HEADER_SIZE: usize = 1 + 4 + 1 + 8 + 4 + 4 + 4;

/// Exact number of bytes [`pack`] appends for `entry`.
pub fn packed_size(entry: &Entry<'_>) -> usize {
    match entry {
        Entry::Standard(_) => STANDARD_SIZE,
        Entry::Frames(e) => FRAMES_HEADER_SIZE + e.frames.len() * 8,
        Entry::Bytes(e) => BYTES_HEADER_SIZE + e.bytes.len(),
    }
}

/// Appends the encoding of `entry` to `out`.
pub fn pack(entry: &Entry<'_>, out: &mut Vec<u8>) {
    out.reserve(packed_size(entry));
    match entry {
        Entry::Standard(e) => {
            out.push(TAG_STANDARD);
            out.extend_from_slice(&e.id.to_le_bytes());
            out.push(e.entry_type as u8);
            out.extend_from_slice(&e.timestamp.to_le_bytes());
            out.extend_from_slice(&e.tid.to_le_bytes());
            out.extend_from_slice(&e.callid.to_le_bytes());
            out.extend_from_slice(&e.matchid.to_le_bytes());
            out.extend_from_slice(&e.extra.to_le_bytes());
        }
        Entry::Frames(e) => {
            out.push(TAG_FRAMES);
            out.extend_from_slice(&e.id.to_le_bytes());
            out.push(e.entry_type as u8);
            out.extend_from_slice(&e.timestamp.to_le_bytes());
            out.extend_from_slice(&e.tid.to_le_bytes());
            out.extend_from_slice(&e.matchid.to_le_bytes());
            out.extend_from_slice(&(e.frames.len() as u32).to_le_bytes());
            for frame in e.frames {
                out.extend_from_slice(&frame.to_le_bytes());
            }
        }
        Entry::Bytes(e) => {
            out.push(TAG_BYTES);
            out.extend_from_slice(&e.id.to_le_bytes());
            out.push(e.entry_type as u8);
            out.extend_from_slice(&e.timestamp.to_le_bytes());
            out.extend_from_slice(&e.tid.to_le_bytes());
            out.extend_from_slice(&e.matchid.to_le_bytes());
            out.extend_from_slice(&(e.bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(e.bytes);
        }
    }
}

/// Decodes one entry spanning all of `bytes`.
///
/// Frames are copied into `scratch`, which the returned entry borrows; byte
/// payloads borrow `bytes` directly.
pub fn unpack<'a>(bytes: &'a [u8], scratch: &'a mut Vec<i64>) -> Result<Entry<'a>, CodecError> {
    let mut reader = ByteReader::new(bytes);
    let entry = match reader.u8()? {
        TAG_STANDARD => Entry::Standard(StandardEntry {
            id: reader.i32()?,
            entry_type: EntryType::try_from(reader.u8()?)?,
            timestamp: reader.i64()?,
            tid: reader.i32()?,
            callid: reader.i32()?,
            matchid: reader.i32()?,
            extra: reader.i64()?,
        }),
        TAG_FRAMES => {
            let id = reader.i32()?;
            let entry_type = EntryType::try_from(reader.u8()?)?;
            let timestamp = reader.i64()?;
            let tid = reader.i32()?;
            let matchid = reader.i32()?;
            let count = reader.u32()? as usize;
            let raw = reader.take(count.saturating_mul(8))?;
            scratch.clear();
            scratch.extend(raw.chunks_exact(8).map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                i64::from_le_bytes(word)
            }));
            Entry::Frames(FramesEntry {
                id,
                entry_type,
                timestamp,
                tid,
                matchid,
                frames: scratch.as_slice(),
            })
        }
        TAG_BYTES => {
            let id = reader.i32()?;
            let entry_type = EntryType::try_from(reader.u8()?)?;
            let timestamp = reader.i64()?;
            let tid = reader.i32()?;
            let matchid = reader.i32()?;
            let len = reader.u32()? as usize;
            Entry::Bytes(BytesEntry {
                id,
                entry_type,
                timestamp,
                tid,
                matchid,
                bytes: reader.take(len)?,
            })
        }
        tag => return Err(CodecError::UnknownTag(tag)),
    };
    match reader.remaining() {
        0 => Ok(entry),
        extra => Err(CodecError::TrailingBytes(extra)),
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.bytes.len() < n {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.bytes.len(),
            });
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.array().map(i32::from_le_bytes)
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        self.array().map(i64::from_le_bytes)
    }
}
