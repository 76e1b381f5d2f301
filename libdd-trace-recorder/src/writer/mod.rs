// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Consumer side: turns the entry stream of a buffer into trace files.

mod abort_reason;
mod callbacks;
pub mod lifecycle;
mod print;
mod stack_inverting;
pub mod thread_priority;
pub mod trace_file;
pub mod trace_writer;

pub use abort_reason::AbortReason;
pub use callbacks::{NoopCallbacks, TraceCallbacks};
pub use lifecycle::{TraceBackwardCallback, TraceLifecycleVisitor, TraceState};
pub use print::PrintEntryVisitor;
pub use stack_inverting::StackTraceInvertingVisitor;
pub use thread_priority::ScopedThreadPriority;
pub use trace_writer::{EntryReader, TraceWriter, TraceWriterHandle};
