// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoded trace entries and the visitor interface consuming them.

pub mod codec;

use crate::CodecError;
use std::fmt;
use std::io;

/// Kind of event an entry records. Codes are stable: they are persisted in
/// buffers that may be read by a different build.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    UnknownType = 0,
    TraceStart = 1,
    TraceEnd = 2,
    TraceAbort = 3,
    TraceTimeout = 4,
    TraceBackwards = 5,
    StackFrame = 6,
    MarkPush = 7,
    MarkPop = 8,
    Counter = 9,
    StringKey = 10,
    StringValue = 11,
    TraceAnnotation = 12,
}

impl EntryType {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntryType::UnknownType => "UNKNOWN_TYPE",
            EntryType::TraceStart => "TRACE_START",
            EntryType::TraceEnd => "TRACE_END",
            EntryType::TraceAbort => "TRACE_ABORT",
            EntryType::TraceTimeout => "TRACE_TIMEOUT",
            EntryType::TraceBackwards => "TRACE_BACKWARDS",
            EntryType::StackFrame => "STACK_FRAME",
            EntryType::MarkPush => "MARK_PUSH",
            EntryType::MarkPop => "MARK_POP",
            EntryType::Counter => "COUNTER",
            EntryType::StringKey => "STRING_KEY",
            EntryType::StringValue => "STRING_VALUE",
            EntryType::TraceAnnotation => "TRACE_ANNOTATION",
        }
    }

    /// Marks the beginning of a trace, the backward flavor included.
    pub const fn is_trace_start(self) -> bool {
        matches!(self, EntryType::TraceStart | EntryType::TraceBackwards)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for EntryType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => EntryType::UnknownType,
            1 => EntryType::TraceStart,
            2 => EntryType::TraceEnd,
            3 => EntryType::TraceAbort,
            4 => EntryType::TraceTimeout,
            5 => EntryType::TraceBackwards,
            6 => EntryType::StackFrame,
            7 => EntryType::MarkPush,
            8 => EntryType::MarkPop,
            9 => EntryType::Counter,
            10 => EntryType::StringKey,
            11 => EntryType::StringValue,
            12 => EntryType::TraceAnnotation,
            other => return Err(CodecError::UnknownEntryType(other)),
        })
    }
}

/// Fixed-shape entry. Trace boundary markers are standard entries carrying
/// the trace id in `extra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardEntry {
    pub id: i32,
    pub entry_type: EntryType,
    pub timestamp: i64,
    pub tid: i32,
    pub callid: i32,
    pub matchid: i32,
    pub extra: i64,
}

/// A stack sample, frames ordered leaf first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramesEntry<'a> {
    pub id: i32,
    pub entry_type: EntryType,
    pub timestamp: i64,
    pub tid: i32,
    pub matchid: i32,
    pub frames: &'a [i64],
}

/// Arbitrary payload, usually a UTF-8 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesEntry<'a> {
    pub id: i32,
    pub entry_type: EntryType,
    pub timestamp: i64,
    pub tid: i32,
    pub matchid: i32,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
    Standard(StandardEntry),
    Frames(FramesEntry<'a>),
    Bytes(BytesEntry<'a>),
}

impl Entry<'_> {
    pub fn id(&self) -> i32 {
        match self {
            Entry::Standard(e) => e.id,
            Entry::Frames(e) => e.id,
            Entry::Bytes(e) => e.id,
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            Entry::Standard(e) => e.entry_type,
            Entry::Frames(e) => e.entry_type,
            Entry::Bytes(e) => e.entry_type,
        }
    }

    /// Dispatches to the visitor method matching the entry's shape.
    pub fn accept<V: EntryVisitor + ?Sized>(&self, visitor: &mut V) -> io::Result<()> {
        match self {
            Entry::Standard(e) => visitor.visit_standard(e),
            Entry::Frames(e) => visitor.visit_frames(e),
            Entry::Bytes(e) => visitor.visit_bytes(e),
        }
    }
}

/// Consumer of a stream of entries. Visitors chain: a visitor may transform
/// what it sees and hand the result to a downstream visitor.
pub trait EntryVisitor {
    fn visit_standard(&mut self, entry: &StandardEntry) -> io::Result<()>;
    fn visit_frames(&mut self, entry: &FramesEntry<'_>) -> io::Result<()>;
    fn visit_bytes(&mut self, entry: &BytesEntry<'_>) -> io::Result<()>;
}

impl<V: EntryVisitor + ?Sized> EntryVisitor for &mut V {
    fn visit_standard(&mut self, entry: &StandardEntry) -> io::Result<()> {
        (**self).visit_standard(entry)
    }

    fn visit_frames(&mut self, entry: &FramesEntry<'_>) -> io::Result<()> {
        (**self).visit_frames(entry)
    }

    fn visit_bytes(&mut self, entry: &BytesEntry<'_>) -> io::Result<()> {
        (**self).visit_bytes(entry)
    }
}
