// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lock-free ring buffer shared between writer threads and a reader, possibly
//! across processes.

mod futex;
pub mod ring_buffer;
pub mod turn_sequencer;

pub use ring_buffer::{Cursor, LockFreeRingBuffer, SlotValue, WaitPolicy};
pub use turn_sequencer::{TryWaitResult, TurnSequencer};
