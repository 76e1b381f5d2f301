// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by unit and integration tests.

use crate::entries::{EntryType, FramesEntry, StandardEntry};
use crate::writer::{AbortReason, TraceCallbacks};
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackEvent {
    Start(i64, i32),
    End(i64),
    Abort(i64, AbortReason),
}

/// Records every callback, in order.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingCallbacks {
    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }
}

impl TraceCallbacks for RecordingCallbacks {
    fn on_trace_start(&self, trace_id: i64, flags: i32) {
        self.events.lock().push(CallbackEvent::Start(trace_id, flags));
    }

    fn on_trace_end(&self, trace_id: i64) {
        self.events.lock().push(CallbackEvent::End(trace_id));
    }

    fn on_trace_abort(&self, trace_id: i64, reason: AbortReason) {
        self.events
            .lock()
            .push(CallbackEvent::Abort(trace_id, reason));
    }
}

/// Standard entry with `timestamp = id` and `tid = 1`.
pub fn standard_entry(id: i32, entry_type: EntryType, extra: i64) -> StandardEntry {
    StandardEntry {
        id,
        entry_type,
        timestamp: id as i64,
        tid: 1,
        callid: 0,
        matchid: 0,
        extra,
    }
}

/// Stack sample with `timestamp = id` and `tid = 1`.
pub fn frames_entry(id: i32, matchid: i32, frames: &[i64]) -> FramesEntry<'_> {
    FramesEntry {
        id,
        entry_type: EntryType::StackFrame,
        timestamp: id as i64,
        tid: 1,
        matchid,
        frames,
    }
}

/// Decompresses a whole trace file.
#[allow(clippy::unwrap_used)]
pub fn read_trace_file(path: &Path) -> String {
    let mut text = String::new();
    GzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

/// Entry lines of a trace, i.e. everything after the header block.
pub fn trace_body(text: &str) -> Vec<String> {
    text.split_once("\n\n")
        .map(|(_, body)| body.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
