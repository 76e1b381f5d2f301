// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::entries::{BytesEntry, EntryVisitor, FramesEntry, StandardEntry};
use std::io;

/// Turns leaf-first stack samples into root-first ones, one frame per
/// emitted entry. Everything else passes through untouched.
pub struct StackTraceInvertingVisitor<V> {
    delegate: V,
}

impl<V: EntryVisitor> StackTraceInvertingVisitor<V> {
    pub fn new(delegate: V) -> Self {
        Self { delegate }
    }

    pub fn delegate(&self) -> &V {
        &self.delegate
    }

    pub fn into_inner(self) -> V {
        self.delegate
    }
}

impl<V: EntryVisitor> EntryVisitor for StackTraceInvertingVisitor<V> {
    fn visit_standard(&mut self, entry: &StandardEntry) -> io::Result<()> {
        self.delegate.visit_standard(entry)
    }

    fn visit_frames(&mut self, entry: &FramesEntry<'_>) -> io::Result<()> {
        for frame in entry.frames.iter().rev() {
            self.delegate.visit_frames(&FramesEntry {
                frames: std::slice::from_ref(frame),
                ..*entry
            })?;
        }
        Ok(())
    }

    fn visit_bytes(&mut self, entry: &BytesEntry<'_>) -> io::Result<()> {
        self.delegate.visit_bytes(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntryType;
    use crate::writer::PrintEntryVisitor;

    #[test]
    fn stacks_are_inverted() {
        let mut stack = StackTraceInvertingVisitor::new(PrintEntryVisitor::new(Vec::new()));
        stack
            .visit_frames(&FramesEntry {
                id: 1,
                entry_type: EntryType::StackFrame,
                timestamp: 1,
                tid: 1,
                matchid: 10,
                frames: &[300, 200, 100],
            })
            .unwrap();
        stack
            .visit_frames(&FramesEntry {
                id: 2,
                entry_type: EntryType::StackFrame,
                timestamp: 2,
                tid: 2,
                matchid: 10,
                frames: &[3000, 2000, 1000],
            })
            .unwrap();

        let text = String::from_utf8(stack.into_inner().into_inner()).unwrap();
        assert_eq!(
            text,
            "1|STACK_FRAME|1|1|0|10|100\n\
             1|STACK_FRAME|1|1|0|10|200\n\
             1|STACK_FRAME|1|1|0|10|300\n\
             2|STACK_FRAME|2|2|0|10|1000\n\
             2|STACK_FRAME|2|2|0|10|2000\n\
             2|STACK_FRAME|2|2|0|10|3000\n"
        );
    }

    #[test]
    fn other_entries_pass_through() {
        let mut stack = StackTraceInvertingVisitor::new(PrintEntryVisitor::new(Vec::new()));
        stack
            .visit_bytes(&BytesEntry {
                id: 9,
                entry_type: EntryType::StringKey,
                timestamp: 40,
                tid: 2,
                matchid: 0,
                bytes: b"k",
            })
            .unwrap();
        assert_eq!(
            stack.delegate().get_ref().as_slice(),
            b"9|STRING_KEY|40|2|0|0|k\n"
        );
    }
}
