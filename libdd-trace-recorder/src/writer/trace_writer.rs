// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::lifecycle::{TraceLifecycleVisitor, TraceState};
use super::{AbortReason, TraceCallbacks};
use crate::entries::{codec, EntryVisitor};
use crate::lfrb::Cursor;
use crate::mmapbuf::Buffer;
use crate::packet::{Packet, PacketReassembler};
use crate::TraceWriterConfig;
use anyhow::Context;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest a single read blocks when the wait policy has no timeout, so a
/// shutdown request is noticed.
const MAX_BLOCKING_READ: Duration = Duration::from_secs(1);

/// Turns packets read in buffer order back into entries for a visitor.
#[derive(Default)]
pub struct EntryReader {
    reassembler: PacketReassembler,
    scratch: Vec<i64>,
    undecodable: u64,
}

impl EntryReader {
    pub fn feed<V: EntryVisitor + ?Sized>(
        &mut self,
        packet: &Packet,
        visitor: &mut V,
    ) -> io::Result<()> {
        let scratch = &mut self.scratch;
        let undecodable = &mut self.undecodable;
        self.reassembler
            .process(packet, |bytes| match codec::unpack(bytes, scratch) {
                Ok(entry) => entry.accept(visitor),
                Err(e) => {
                    debug!("Dropping undecodable entry: {e}");
                    *undecodable += 1;
                    Ok(())
                }
            })
    }

    /// Drops partial entries, for when the next packet won't follow the
    /// last one.
    pub fn reset(&mut self) {
        self.reassembler.reset();
    }

    pub fn lost_packets(&self) -> u64 {
        self.reassembler.lost_packets()
    }

    pub fn undecodable_entries(&self) -> u64 {
        self.undecodable
    }
}

/// Drains a buffer into trace files, one trace at a time.
pub struct TraceWriter {
    buffer: Arc<Buffer>,
    config: TraceWriterConfig,
    callbacks: Arc<dyn TraceCallbacks>,
    shutdown: Arc<AtomicBool>,
}

impl TraceWriter {
    pub fn new(
        buffer: Arc<Buffer>,
        config: TraceWriterConfig,
        callbacks: Arc<dyn TraceCallbacks>,
    ) -> Self {
        Self {
            buffer,
            config,
            callbacks,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes any in-progress and future [`Self::process_trace`] abort with
    /// [`AbortReason::ControllerInitiated`].
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Reads entries from `start` onwards until trace `trace_id` ends or
    /// aborts, and returns how it finished.
    pub fn process_trace(&self, start: Cursor, trace_id: i64) -> anyhow::Result<TraceState> {
        let buffer = Arc::clone(&self.buffer);
        let mut visitor =
            TraceLifecycleVisitor::new(&self.config, Arc::clone(&self.callbacks), trace_id)
                .with_trace_backward_callback(Box::new(move |visitor: &mut TraceLifecycleVisitor| {
                    replay_backwards(&buffer, start, visitor)
                }));

        let ring = self.buffer.ring_buffer();
        let policy = self.config.wait_policy();
        let idle_timeout = self.config.idle_timeout();
        let mut reader = EntryReader::default();
        let mut cursor = start;
        let mut last_entry = Instant::now();

        while !visitor.done() {
            if self.shutdown_requested() {
                visitor.abort(AbortReason::ControllerInitiated);
                break;
            }

            let mut wait = policy
                .timeout
                .unwrap_or(MAX_BLOCKING_READ)
                .min(MAX_BLOCKING_READ);
            if let Some(idle) = idle_timeout {
                wait = wait.min(idle.saturating_sub(last_entry.elapsed()));
            }

            match ring.wait_and_try_read_until(&cursor, Some(Instant::now() + wait)) {
                Some(packet) => {
                    reader
                        .feed(&packet, &mut visitor)
                        .with_context(|| format!("Failed to process trace {trace_id}"))?;
                    cursor.move_forward(1);
                    last_entry = Instant::now();
                }
                None if ring.is_overwritten(&cursor) => {
                    debug!(
                        trace_id,
                        lag = cursor.distance_to(&ring.current_head()),
                        "Trace reader fell behind the buffer"
                    );
                    visitor.abort(AbortReason::MissedEvent);
                }
                None => {
                    // Nothing written there yet.
                    if idle_timeout.is_some_and(|idle| last_entry.elapsed() >= idle) {
                        visitor.abort(AbortReason::Timeout);
                    }
                }
            }
        }

        if reader.lost_packets() != 0 || reader.undecodable_entries() != 0 {
            debug!(
                trace_id,
                lost_packets = reader.lost_packets(),
                undecodable = reader.undecodable_entries(),
                "Trace finished with missing entries"
            );
        }
        Ok(visitor.state())
    }

    /// Moves the writer to a background thread serving trace requests.
    pub fn spawn(self) -> anyhow::Result<TraceWriterHandle> {
        let (sender, receiver) = mpsc::channel::<TraceRequest>();
        let shutdown = Arc::clone(&self.shutdown);
        let thread = thread::Builder::new()
            .name("dd-trace-writer".to_string())
            .spawn(move || {
                for request in receiver {
                    if self.shutdown_requested() {
                        break;
                    }
                    match self.process_trace(request.start, request.trace_id) {
                        Ok(state) => debug!(trace_id = request.trace_id, ?state, "Trace done"),
                        Err(e) => warn!(trace_id = request.trace_id, "Trace failed: {e:#}"),
                    }
                }
            })
            .context("Failed to spawn the trace writer thread")?;
        Ok(TraceWriterHandle {
            sender: Some(sender),
            shutdown,
            thread: Some(thread),
        })
    }
}

struct TraceRequest {
    start: Cursor,
    trace_id: i64,
}

/// Owner of a background [`TraceWriter`]. Dropping it stops the writer,
/// aborting the trace in progress.
pub struct TraceWriterHandle {
    sender: Option<mpsc::Sender<TraceRequest>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TraceWriterHandle {
    /// Queues trace `trace_id`, read from `start` (usually the cursor
    /// returned when its start marker was written).
    pub fn submit(&self, start: Cursor, trace_id: i64) -> anyhow::Result<()> {
        let sender = self
            .sender
            .as_ref()
            .context("Trace writer is shut down")?;
        sender
            .send(TraceRequest { start, trace_id })
            .map_err(|_| anyhow::anyhow!("Trace writer thread is gone"))
    }

    /// Lets queued traces finish, then stops the thread.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.sender = None;
        self.join_thread()
    }

    fn join_thread(&mut self) -> anyhow::Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("Trace writer thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for TraceWriterHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.sender = None;
        if let Err(e) = self.join_thread() {
            warn!("{e}");
        }
    }
}

/// Feeds `visitor` every entry still readable from before `start`, oldest
/// first. Unreadable packets are skipped.
fn replay_backwards(buffer: &Buffer, start: Cursor, visitor: &mut TraceLifecycleVisitor) {
    let ring = buffer.ring_buffer();
    let mut cursor = ring.current_tail(0.0);
    let mut reader = EntryReader::default();
    while cursor < start && !visitor.done() {
        match ring.try_read(&cursor) {
            Some(packet) => {
                if let Err(e) = reader.feed(&packet, visitor) {
                    warn!("Failed to replay entries before the trace start: {e}");
                    return;
                }
            }
            None => reader.reset(),
        }
        cursor.move_forward(1);
    }
    debug!(
        trace_id = visitor.trace_id(),
        lost_packets = reader.lost_packets(),
        "Replayed entries from before the trace start"
    );
}
