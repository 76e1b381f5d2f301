// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::entries::{BytesEntry, EntryVisitor, FramesEntry, StandardEntry};
use std::io::{self, Write};

/// Serializes entries as pipe-separated text, one line per record:
///
/// ```text
/// id|TYPE|timestamp|tid|callid|matchid|extra
/// ```
///
/// A frames entry yields one line per frame with `0` as callid and the frame
/// value as extra. A bytes entry has `0` as callid and renders its payload as
/// (lossy) UTF-8 with backslash escapes (`\\`, `\x7c`, `\n`, `\r`) for the
/// characters that would break a record, so each one keeps a single line of
/// seven fields.
pub struct PrintEntryVisitor<W: Write> {
    stream: W,
}

impl<W: Write> PrintEntryVisitor<W> {
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &W {
        &self.stream
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}

impl<W: Write> EntryVisitor for PrintEntryVisitor<W> {
    fn visit_standard(&mut self, entry: &StandardEntry) -> io::Result<()> {
        writeln!(
            self.stream,
            "{}|{}|{}|{}|{}|{}|{}",
            entry.id,
            entry.entry_type,
            entry.timestamp,
            entry.tid,
            entry.callid,
            entry.matchid,
            entry.extra
        )
    }

    fn visit_frames(&mut self, entry: &FramesEntry<'_>) -> io::Result<()> {
        for frame in entry.frames {
            writeln!(
                self.stream,
                "{}|{}|{}|{}|0|{}|{}",
                entry.id, entry.entry_type, entry.timestamp, entry.tid, entry.matchid, frame
            )?;
        }
        Ok(())
    }

    fn visit_bytes(&mut self, entry: &BytesEntry<'_>) -> io::Result<()> {
        write!(
            self.stream,
            "{}|{}|{}|{}|0|{}|",
            entry.id, entry.entry_type, entry.timestamp, entry.tid, entry.matchid
        )?;
        write_escaped(&mut self.stream, &String::from_utf8_lossy(entry.bytes))?;
        writeln!(self.stream)
    }
}

fn write_escaped<W: Write>(stream: &mut W, text: &str) -> io::Result<()> {
    let mut rest = text;
    while let Some(pos) = rest.find(['\\', '|', '\n', '\r']) {
        stream.write_all(rest[..pos].as_bytes())?;
        let escaped: &[u8] = match rest.as_bytes()[pos] {
            b'\\' => b"\\\\",
            b'|' => b"\\x7c",
            b'\n' => b"\\n",
            _ => b"\\r",
        };
        stream.write_all(escaped)?;
        rest = &rest[pos + 1..];
    }
    stream.write_all(rest.as_bytes())
}
