// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size packets carrying variable-size encoded entries through the
//! ring buffer.
//!
//! An entry of `n` bytes becomes `ceil(n / PACKET_PAYLOAD)` consecutive
//! packets of one stream. Packets of concurrent writers interleave freely in
//! the buffer; the reader stitches streams back together by id.

use crate::lfrb::{Cursor, LockFreeRingBuffer, SlotValue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

pub const PACKET_SIZE: usize = 64;
pub const PACKET_PAYLOAD: usize = PACKET_SIZE - 8;

/// Streams kept open while waiting for their continuation packets.
pub const DEFAULT_MAX_PENDING_STREAMS: usize = 64;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Packet {
    pub stream: u32,
    pub flags: u8,
    _pad: u8,
    pub size: u16,
    pub data: [u8; PACKET_PAYLOAD],
}

const _: () = assert!(std::mem::size_of::<Packet>() == PACKET_SIZE);

// SAFETY: `Packet` is plain data and all-zero is a valid (empty) packet.
unsafe impl SlotValue for Packet {}

impl Packet {
    /// First packet of a stream.
    pub const START: u8 = 1;
    /// More packets of this stream follow.
    pub const NEXT: u8 = 2;

    fn new(stream: u32, flags: u8, chunk: &[u8]) -> Self {
        let mut data = [0u8; PACKET_PAYLOAD];
        data[..chunk.len()].copy_from_slice(chunk);
        Self {
            stream,
            flags,
            _pad: 0,
            size: chunk.len() as u16,
            data,
        }
    }

    pub fn is_start(&self) -> bool {
        self.flags & Self::START != 0
    }

    pub fn has_next(&self) -> bool {
        self.flags & Self::NEXT != 0
    }

    /// Payload bytes, clamped so a corrupt size can't run past the packet.
    pub fn payload(&self) -> &[u8] {
        let len = (self.size as usize).min(PACKET_PAYLOAD);
        &self.data[..len]
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream", &self.stream)
            .field("flags", &self.flags)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Splits byte strings into packets and writes them to a ring buffer.
pub struct PacketLogger<'a> {
    ring: &'a LockFreeRingBuffer<Packet>,
    next_stream: &'a AtomicU32,
}

impl<'a> PacketLogger<'a> {
    pub fn new(ring: &'a LockFreeRingBuffer<Packet>, next_stream: &'a AtomicU32) -> Self {
        Self { ring, next_stream }
    }

    /// Writes `bytes` as one stream, returning the cursor of its first packet.
    pub fn write(&self, bytes: &[u8]) -> Cursor {
        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let mut chunks = bytes.chunks(PACKET_PAYLOAD).peekable();

        let Some(first) = chunks.next() else {
            return self
                .ring
                .write_and_get_cursor(Packet::new(stream, Packet::START, &[]));
        };
        let mut flags = Packet::START;
        if chunks.peek().is_some() {
            flags |= Packet::NEXT;
        }
        let cursor = self
            .ring
            .write_and_get_cursor(Packet::new(stream, flags, first));

        while let Some(chunk) = chunks.next() {
            let flags = if chunks.peek().is_some() {
                Packet::NEXT
            } else {
                0
            };
            self.ring.write(Packet::new(stream, flags, chunk));
        }
        cursor
    }
}

struct PendingStream {
    stream: u32,
    bytes: Vec<u8>,
}

/// Rebuilds byte strings from packets read in buffer order.
pub struct PacketReassembler {
    pending: VecDeque<PendingStream>,
    max_pending: usize,
    lost_packets: u64,
}

impl Default for PacketReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_STREAMS)
    }
}

impl PacketReassembler {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            lost_packets: 0,
        }
    }

    /// Packets dropped because their stream could not be completed.
    pub fn lost_packets(&self) -> u64 {
        self.lost_packets
    }

    pub fn pending_streams(&self) -> usize {
        self.pending.len()
    }

    /// Forgets partially assembled streams, e.g. after the read position
    /// jumped.
    pub fn reset(&mut self) {
        let dropped: usize = self.pending.drain(..).map(|p| Self::packets_in(&p)).sum();
        self.lost_packets += dropped as u64;
    }

    /// Feeds one packet; calls `on_complete` with the full byte string when
    /// this packet closes its stream.
    pub fn process<E>(
        &mut self,
        packet: &Packet,
        mut on_complete: impl FnMut(&[u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        if packet.is_start() {
            if let Some(stale) = self.take(packet.stream) {
                // Same id reused before the old stream ended: the rest of it
                // was lost.
                self.lost_packets += Self::packets_in(&stale) as u64;
            }
            if !packet.has_next() {
                return on_complete(packet.payload());
            }
            if self.pending.len() >= self.max_pending {
                if let Some(evicted) = self.pending.pop_front() {
                    debug!(stream = evicted.stream, "Evicting incomplete packet stream");
                    self.lost_packets += Self::packets_in(&evicted) as u64;
                }
            }
            self.pending.push_back(PendingStream {
                stream: packet.stream,
                bytes: packet.payload().to_vec(),
            });
            return Ok(());
        }

        let Some(pos) = self.pending.iter().position(|p| p.stream == packet.stream) else {
            // Continuation of a stream whose start we never saw.
            self.lost_packets += 1;
            return Ok(());
        };
        self.pending[pos].bytes.extend_from_slice(packet.payload());
        if packet.has_next() {
            return Ok(());
        }
        match self.pending.remove(pos) {
            Some(done) => on_complete(&done.bytes),
            None => Ok(()),
        }
    }

    fn take(&mut self, stream: u32) -> Option<PendingStream> {
        let pos = self.pending.iter().position(|p| p.stream == stream)?;
        self.pending.remove(pos)
    }

    fn packets_in(pending: &PendingStream) -> usize {
        pending.bytes.len().div_ceil(PACKET_PAYLOAD).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn ring() -> LockFreeRingBuffer<Packet> {
        LockFreeRingBuffer::new(64).unwrap()
    }

    fn drain(ring: &LockFreeRingBuffer<Packet>, from: Cursor) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut reassembler = PacketReassembler::default();
        let mut cursor = from;
        while cursor < ring.current_head() {
            let packet = ring.try_read(&cursor).unwrap();
            reassembler
                .process::<Infallible>(&packet, |bytes| {
                    out.push(bytes.to_vec());
                    Ok(())
                })
                .unwrap();
            cursor.move_forward(1);
        }
        out
    }

    #[test]
    fn small_and_large_payloads_survive() {
        let ring = ring();
        let streams = AtomicU32::new(0);
        let logger = PacketLogger::new(&ring, &streams);
        let large: Vec<u8> = (0..200u8).collect();

        let first = logger.write(b"hello");
        logger.write(&large);
        logger.write(&[]);

        assert_eq!(ring.current_head().ticket(), 1 + 4 + 1);
        assert_eq!(
            drain(&ring, first),
            vec![b"hello".to_vec(), large, Vec::new()]
        );
    }

    #[test]
    fn interleaved_streams_are_separated() {
        let a = [b'a'; PACKET_PAYLOAD];
        let b = [b'b'; PACKET_PAYLOAD];
        let packets = [
            Packet::new(1, Packet::START | Packet::NEXT, &a),
            Packet::new(2, Packet::START | Packet::NEXT, &b),
            Packet::new(2, 0, b"bb"),
            Packet::new(1, 0, b"aa"),
        ];
        let mut out = Vec::new();
        let mut reassembler = PacketReassembler::default();
        for packet in &packets {
            reassembler
                .process::<Infallible>(packet, |bytes| {
                    out.push(bytes.to_vec());
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), PACKET_PAYLOAD + 2);
        assert!(out[0].iter().all(|c| *c == b'b'));
        assert!(out[1].iter().all(|c| *c == b'a'));
        assert_eq!(reassembler.lost_packets(), 0);
    }

    #[test]
    fn orphan_continuations_are_dropped() {
        let mut reassembler = PacketReassembler::default();
        let mut completed = 0;
        reassembler
            .process::<Infallible>(&Packet::new(5, 0, b"tail"), |_| {
                completed += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(completed, 0);
        assert_eq!(reassembler.lost_packets(), 1);
    }

    #[test]
    fn oldest_pending_stream_is_evicted() {
        let mut reassembler = PacketReassembler::new(2);
        for stream in 0..3 {
            reassembler
                .process::<Infallible>(
                    &Packet::new(stream, Packet::START | Packet::NEXT, b"x"),
                    |_| Ok(()),
                )
                .unwrap();
        }
        assert_eq!(reassembler.pending_streams(), 2);
        assert_eq!(reassembler.lost_packets(), 1);

        // Stream 0 is gone, its continuation is an orphan now.
        reassembler
            .process::<Infallible>(&Packet::new(0, 0, b"y"), |_| Ok(()))
            .unwrap();
        assert_eq!(reassembler.lost_packets(), 2);

        reassembler.reset();
        assert_eq!(reassembler.pending_streams(), 0);
        assert_eq!(reassembler.lost_packets(), 4);
    }

    #[test]
    fn corrupt_size_is_clamped() {
        let mut packet = Packet::new(0, Packet::START, b"abc");
        packet.size = u16::MAX;
        assert_eq!(packet.payload().len(), PACKET_PAYLOAD);
    }

    #[test]
    fn split_and_join_any_payload() {
        bolero::check!().with_type::<Vec<u8>>().for_each(|bytes| {
            let ring = LockFreeRingBuffer::<Packet>::new(512).unwrap();
            let streams = AtomicU32::new(7);
            let bytes = &bytes[..bytes.len().min(4096)];
            let cursor = PacketLogger::new(&ring, &streams).write(bytes);
            assert_eq!(drain(&ring, cursor), vec![bytes.to_vec()]);
        });
    }
}
