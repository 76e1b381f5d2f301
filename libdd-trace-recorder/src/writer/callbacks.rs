// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::AbortReason;

/// Host notifications about trace progress. Called from the writer thread;
/// implementations should return quickly.
pub trait TraceCallbacks: Send + Sync {
    /// The trace output was opened and its headers written.
    fn on_trace_start(&self, trace_id: i64, flags: i32);
    /// The trace output was completed and moved to its final path.
    fn on_trace_end(&self, trace_id: i64);
    fn on_trace_abort(&self, trace_id: i64, reason: AbortReason);
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl TraceCallbacks for NoopCallbacks {
    fn on_trace_start(&self, _trace_id: i64, _flags: i32) {}
    fn on_trace_end(&self, _trace_id: i64) {}
    fn on_trace_abort(&self, _trace_id: i64, _reason: AbortReason) {}
}
