// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::lfrb::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_THREAD_NICENESS: i32 = 5;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Where and how traces are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceWriterConfig {
    trace_folder: PathBuf,
    // File names are `<prefix>-<pid>-<trace id>.trace.gz`
    trace_prefix: String,
    // Written as `key|value` lines at the top of every trace
    headers: Vec<(String, String)>,
    // Applied to the writer thread while a trace is being written
    thread_niceness: Option<i32>,
    compression_level: u32,
    wait_policy: WaitPolicy,
    // Abort a started trace when no entry arrives for this long
    idle_timeout: Option<Duration>,
}

impl TraceWriterConfig {
    pub fn new(
        trace_folder: impl Into<PathBuf>,
        trace_prefix: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> anyhow::Result<Self> {
        let trace_folder = trace_folder.into();
        let trace_prefix = trace_prefix.into();
        anyhow::ensure!(
            !trace_folder.as_os_str().is_empty(),
            "Trace folder must not be empty"
        );
        validate_prefix(&trace_prefix)?;
        validate_headers(&headers)?;
        Ok(Self {
            trace_folder,
            trace_prefix,
            headers,
            thread_niceness: Some(DEFAULT_THREAD_NICENESS),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            wait_policy: WaitPolicy::default(),
            idle_timeout: None,
        })
    }

    pub fn trace_folder(&self) -> &Path {
        &self.trace_folder
    }

    pub fn trace_prefix(&self) -> &str {
        &self.trace_prefix
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn thread_niceness(&self) -> Option<i32> {
        self.thread_niceness
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait_policy
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn set_headers(&mut self, headers: Vec<(String, String)>) -> anyhow::Result<()> {
        validate_headers(&headers)?;
        self.headers = headers;
        Ok(())
    }

    /// `None` leaves the writer thread's priority alone.
    pub fn set_thread_niceness(&mut self, niceness: Option<i32>) -> anyhow::Result<()> {
        if let Some(niceness) = niceness {
            anyhow::ensure!(
                (-20..=19).contains(&niceness),
                "Thread niceness {niceness} is outside of -20..=19"
            );
        }
        self.thread_niceness = niceness;
        Ok(())
    }

    pub fn set_compression_level(&mut self, level: u32) -> anyhow::Result<()> {
        anyhow::ensure!(level <= 9, "Compression level {level} is outside of 0..=9");
        self.compression_level = level;
        Ok(())
    }

    pub fn set_wait_policy(&mut self, wait_policy: WaitPolicy) -> anyhow::Result<()> {
        if let Some(timeout) = wait_policy.timeout {
            anyhow::ensure!(!timeout.is_zero(), "Read timeout must not be zero");
        }
        self.wait_policy = wait_policy;
        Ok(())
    }

    pub fn set_idle_timeout(&mut self, idle_timeout: Option<Duration>) -> anyhow::Result<()> {
        if let Some(timeout) = idle_timeout {
            anyhow::ensure!(!timeout.is_zero(), "Idle timeout must not be zero");
        }
        self.idle_timeout = idle_timeout;
        Ok(())
    }
}

fn validate_prefix(prefix: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!prefix.is_empty(), "Trace prefix must not be empty");
    anyhow::ensure!(
        !prefix.contains(std::path::MAIN_SEPARATOR),
        "Trace prefix {prefix:?} must not contain a path separator"
    );
    Ok(())
}

// Header lines are `key|value\n`, so neither part may break that framing.
fn validate_headers(headers: &[(String, String)]) -> anyhow::Result<()> {
    for (key, value) in headers {
        anyhow::ensure!(!key.is_empty(), "Header keys must not be empty");
        anyhow::ensure!(
            !key.contains(['|', '\n']),
            "Header key {key:?} contains '|' or a newline"
        );
        anyhow::ensure!(
            !value.contains('\n'),
            "Header value for {key:?} contains a newline"
        );
    }
    Ok(())
}
