// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a trace ended without a valid end marker. Codes are stable and
/// reported to the host as is.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    Unknown = 1,
    /// Abort requested by the tracing controller, or the writer shut down.
    ControllerInitiated = 2,
    /// The reader fell behind and entries of the trace were overwritten.
    MissedEvent = 3,
    Timeout = 4,
    /// A new trace started before this one ended.
    NewStart = 5,
    /// The trace output could not be written.
    IoFailure = 6,
}

impl AbortReason {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AbortReason::Unknown => "unknown",
            AbortReason::ControllerInitiated => "controller_initiated",
            AbortReason::MissedEvent => "missed_event",
            AbortReason::Timeout => "timeout",
            AbortReason::NewStart => "new_start",
            AbortReason::IoFailure => "io_failure",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AbortReason::Unknown.code(), 1);
        assert_eq!(AbortReason::ControllerInitiated.code(), 2);
        assert_eq!(AbortReason::MissedEvent.code(), 3);
        assert_eq!(AbortReason::Timeout.code(), 4);
        assert_eq!(AbortReason::NewStart.code(), 5);
        assert_eq!(AbortReason::IoFailure.code(), 6);
        assert_eq!(AbortReason::IoFailure.to_string(), "io_failure");
    }
}
