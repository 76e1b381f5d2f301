// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::print::PrintEntryVisitor;
use super::stack_inverting::StackTraceInvertingVisitor;
use super::thread_priority::ScopedThreadPriority;
use super::trace_file::{self, TraceOutput};
use super::{AbortReason, TraceCallbacks};
use crate::entries::{BytesEntry, EntryType, EntryVisitor, FramesEntry, StandardEntry};
use crate::platform;
use crate::TraceWriterConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

type OutputChain = StackTraceInvertingVisitor<PrintEntryVisitor<TraceOutput>>;

/// Invoked once, right after a backward trace started, to feed the visitor
/// the entries the buffer still holds from before the start marker.
pub type TraceBackwardCallback = Box<dyn FnOnce(&mut TraceLifecycleVisitor) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    Idle,
    Started,
    Ended,
    Aborted,
}

/// Head of the writing pipeline for a single trace.
///
/// Picks the entries of one trace out of a shared stream: waits for the start
/// marker of `trace_id`, writes everything seen until the matching end marker
/// to a compressed trace file, then reports the outcome through
/// [`TraceCallbacks`]. Single use: once [`Self::done`] is true every visit is
/// ignored.
pub struct TraceLifecycleVisitor {
    trace_folder: PathBuf,
    trace_prefix: String,
    headers: Vec<(String, String)>,
    compression_level: u32,
    thread_niceness: Option<i32>,
    expected_trace: i64,
    callbacks: Arc<dyn TraceCallbacks>,
    state: TraceState,
    output: Option<OutputChain>,
    in_progress_path: Option<PathBuf>,
    final_path: Option<PathBuf>,
    thread_priority: Option<ScopedThreadPriority>,
    trace_backward_callback: Option<TraceBackwardCallback>,
}

impl TraceLifecycleVisitor {
    pub fn new(
        config: &TraceWriterConfig,
        callbacks: Arc<dyn TraceCallbacks>,
        trace_id: i64,
    ) -> Self {
        Self {
            trace_folder: config.trace_folder().to_path_buf(),
            trace_prefix: config.trace_prefix().to_string(),
            headers: config.headers().to_vec(),
            compression_level: config.compression_level(),
            thread_niceness: config.thread_niceness(),
            expected_trace: trace_id,
            callbacks,
            state: TraceState::Idle,
            output: None,
            in_progress_path: None,
            final_path: None,
            thread_priority: None,
            trace_backward_callback: None,
        }
    }

    pub fn with_trace_backward_callback(mut self, callback: TraceBackwardCallback) -> Self {
        self.trace_backward_callback = Some(callback);
        self
    }

    pub fn trace_id(&self) -> i64 {
        self.expected_trace
    }

    pub fn state(&self) -> TraceState {
        self.state
    }

    pub fn started(&self) -> bool {
        self.state == TraceState::Started
    }

    pub fn done(&self) -> bool {
        matches!(self.state, TraceState::Ended | TraceState::Aborted)
    }

    /// The trace file: its in-progress path while started, its final path
    /// once ended.
    pub fn output_path(&self) -> Option<&Path> {
        match self.state {
            TraceState::Started => self.in_progress_path.as_deref(),
            TraceState::Ended => self.final_path.as_deref(),
            TraceState::Idle | TraceState::Aborted => None,
        }
    }

    /// Ends the trace without an end marker. Reports the abort if the trace
    /// had started; no-op once done.
    pub fn abort(&mut self, reason: AbortReason) {
        match self.state {
            TraceState::Ended | TraceState::Aborted => {}
            TraceState::Idle => {
                debug!(trace_id = self.expected_trace, %reason, "Trace aborted before it started");
                self.state = TraceState::Aborted;
                self.trace_backward_callback = None;
            }
            TraceState::Started => {
                warn!(trace_id = self.expected_trace, %reason, "Trace aborted");
                self.discard_output();
                self.state = TraceState::Aborted;
                self.callbacks.on_trace_abort(self.expected_trace, reason);
            }
        }
    }

    fn on_trace_start(&mut self, entry: &StandardEntry) {
        let final_path = trace_file::trace_file_path(
            &self.trace_folder,
            &self.trace_prefix,
            platform::current_process_id(),
            self.expected_trace,
        );
        let in_progress = trace_file::in_progress_path(&final_path);

        let output = trace_file::open_trace_file(&in_progress, self.compression_level)
            .and_then(|mut output| {
                trace_file::write_headers(&mut output, self.expected_trace, &self.headers)?;
                Ok(output)
            });
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(
                    trace_id = self.expected_trace,
                    path = ?in_progress,
                    "Could not open trace output: {e}"
                );
                let _ = fs::remove_file(&in_progress);
                self.state = TraceState::Aborted;
                self.trace_backward_callback = None;
                self.callbacks
                    .on_trace_abort(self.expected_trace, AbortReason::IoFailure);
                return;
            }
        };

        self.output = Some(StackTraceInvertingVisitor::new(PrintEntryVisitor::new(
            output,
        )));
        self.in_progress_path = Some(in_progress);
        self.final_path = Some(final_path);
        self.thread_priority = self.thread_niceness.map(ScopedThreadPriority::new);
        self.state = TraceState::Started;
        debug!(trace_id = self.expected_trace, "Trace started");
        self.callbacks
            .on_trace_start(self.expected_trace, entry.matchid);
    }

    fn on_trace_end(&mut self) {
        let (Some(output), Some(in_progress), Some(final_path)) = (
            self.output.take(),
            self.in_progress_path.clone(),
            self.final_path.clone(),
        ) else {
            self.abort(AbortReason::IoFailure);
            return;
        };
        let output = output.into_inner().into_inner();
        if let Err(e) = trace_file::complete_trace_file(output, &in_progress, &final_path) {
            warn!(trace_id = self.expected_trace, "Could not complete trace output: {e}");
            self.abort(AbortReason::IoFailure);
            return;
        }
        self.thread_priority = None;
        self.state = TraceState::Ended;
        debug!(trace_id = self.expected_trace, path = ?final_path, "Trace ended");
        self.callbacks.on_trace_end(self.expected_trace);
    }

    fn discard_output(&mut self) {
        self.output = None;
        if let Some(path) = self.in_progress_path.take() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(?path, "Could not delete partial trace output: {e}");
                }
            }
        }
        self.final_path = None;
        self.thread_priority = None;
    }

    /// Runs `write` against the output chain when started; a write failure
    /// aborts the trace.
    fn write(&mut self, write: impl FnOnce(&mut OutputChain) -> io::Result<()>) {
        let Some(output) = self.output.as_mut() else {
            return;
        };
        if let Err(e) = write(output) {
            warn!(trace_id = self.expected_trace, "Could not write trace output: {e}");
            self.abort(AbortReason::IoFailure);
        }
    }

    fn is_ours(&self, entry: &StandardEntry) -> bool {
        entry.extra == self.expected_trace
    }
}

impl EntryVisitor for TraceLifecycleVisitor {
    fn visit_standard(&mut self, entry: &StandardEntry) -> io::Result<()> {
        if self.done() {
            return Ok(());
        }
        match entry.entry_type {
            EntryType::TraceStart | EntryType::TraceBackwards => {
                if !self.is_ours(entry) {
                    return Ok(());
                }
                if self.started() {
                    // The same trace started again: what we have is incomplete.
                    self.abort(AbortReason::NewStart);
                    return Ok(());
                }
                self.on_trace_start(entry);
                self.write(|output| output.visit_standard(entry));
                if entry.entry_type == EntryType::TraceBackwards && self.started() {
                    if let Some(callback) = self.trace_backward_callback.take() {
                        callback(self);
                    }
                }
            }
            EntryType::TraceEnd => {
                if self.is_ours(entry) && self.started() {
                    self.write(|output| output.visit_standard(entry));
                    if self.started() {
                        self.on_trace_end();
                    }
                }
            }
            EntryType::TraceAbort | EntryType::TraceTimeout => {
                if self.is_ours(entry) {
                    let reason = if entry.entry_type == EntryType::TraceAbort {
                        AbortReason::ControllerInitiated
                    } else {
                        AbortReason::Timeout
                    };
                    self.abort(reason);
                }
            }
            _ => self.write(|output| output.visit_standard(entry)),
        }
        Ok(())
    }

    fn visit_frames(&mut self, entry: &FramesEntry<'_>) -> io::Result<()> {
        self.write(|output| output.visit_frames(entry));
        Ok(())
    }

    fn visit_bytes(&mut self, entry: &BytesEntry<'_>) -> io::Result<()> {
        self.write(|output| output.visit_bytes(entry));
        Ok(())
    }
}

impl Drop for TraceLifecycleVisitor {
    fn drop(&mut self) {
        // Every start is paired with an end or an abort.
        if self.started() {
            self.abort(AbortReason::Unknown);
        }
    }
}
