//! In-memory collaborators for engine tests.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::port::Transport;
use crate::protocol::packet::{
    IntegrityMode, MAX_PACKET_LEN, PACKET_HEADER_LEN, PacketKind, SOH_BLOCK_SIZE,
    encode_header_record, encode_packet,
};
use std::cell::Cell;
use std::collections::VecDeque;

/// Transport fed from a script of incoming bytes; records everything sent.
///
/// Reads return whatever is queued (up to the buffer size) or 0 once the
/// script is exhausted, which the engine sees as a timeout.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    rx: VecDeque<u8>,
    pub(crate) tx: Vec<u8>,
    fail_reads: bool,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_incoming(bytes: &[u8]) -> Self {
        let mut transport = Self::new();
        transport.push(bytes);
        transport
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.rx
            .extend(bytes.iter().copied());
    }

    /// Make every further read fail as if the link went away.
    pub(crate) fn fail_reads(&mut self) {
        self.fail_reads = true;
    }

    /// Scripted bytes the engine never consumed.
    pub(crate) fn unread(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn count_sent(&self, byte: u8) -> usize {
        self.tx
            .iter()
            .filter(|&&b| b == byte)
            .count()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
        if self.fail_reads {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "link down",
            )));
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf
            .iter_mut()
            .zip(self.rx.drain(..n))
        {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<()> {
        self.tx
            .extend_from_slice(buf);
        Ok(())
    }
}

/// Clock that only moves when slept on or advanced by hand.
#[derive(Debug, Default)]
pub(crate) struct FakeClock {
    now: Cell<u32>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn starting_at(now: u32) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub(crate) fn advance(&self, ms: u32) {
        self.now
            .set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(ms);
    }
}

/// Complete data packet carrying `payload`, padded with zeros.
pub(crate) fn data_packet(kind: PacketKind, seq: u8, payload: &[u8], mode: IntegrityMode) -> Vec<u8> {
    let mut frame = [0u8; MAX_PACKET_LEN];
    let len = encode_packet(&mut frame, kind, seq, payload, 0, mode);
    frame[..len].to_vec()
}

/// Packet 0 announcing `name` of `size` bytes.
pub(crate) fn header_packet(name: &str, size: u32, mode: IntegrityMode) -> Vec<u8> {
    let mut record = [0u8; SOH_BLOCK_SIZE];
    encode_header_record(name, size, &mut record).expect("header record fits");
    data_packet(PacketKind::Data128, 0, &record, mode)
}

/// Flip one payload bit so the trailer no longer matches.
pub(crate) fn corrupt_payload(mut packet: Vec<u8>) -> Vec<u8> {
    packet[PACKET_HEADER_LEN] ^= 0x01;
    packet
}
