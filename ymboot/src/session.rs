//! Transfer-scoped state and tuning.
//!
//! A [`Session`] is created fresh for every receive call, mutated only by the
//! state machine driving that call and dropped when the call returns. Nothing
//! carries over between transfers.

use crate::clock::{Clock, Deadline};
use crate::protocol::packet::{FILE_NAME_MAX, IntegrityMode};
use std::fmt;

/// Consecutive packet-level failures after which a session gives up.
pub const MAX_ERRORS: u32 = 5;

/// Default bound on a single packet read.
pub const PACKET_TIMEOUT_MS: u32 = 5000;

/// Default bound on waiting for an ACK or a second EOT.
pub const RESPONSE_TIMEOUT_MS: u32 = 1000;

/// Default window between the two bytes of a CANCEL pair.
pub const CONTROL_TIMEOUT_MS: u32 = 100;

/// Session watchdog as a multiple of the packet timeout.
pub const SESSION_TIMEOUT_FACTOR: u32 = 10;

/// Timeouts, retry bound and trailer mode for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SessionConfig {
    /// Bound on one packet read.
    pub packet_timeout_ms: u32,
    /// Bound on the whole transfer.
    pub session_timeout_ms: u32,
    /// Window for the second byte of a CANCEL pair.
    pub control_timeout_ms: u32,
    /// Bound on waiting for an ACK or the second EOT.
    pub response_timeout_ms: u32,
    /// Consecutive failures tolerated before giving up.
    pub max_errors: u32,
    /// Trailer the receiver asks for.
    pub integrity: IntegrityMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            packet_timeout_ms: PACKET_TIMEOUT_MS,
            session_timeout_ms: PACKET_TIMEOUT_MS * SESSION_TIMEOUT_FACTOR,
            control_timeout_ms: CONTROL_TIMEOUT_MS,
            response_timeout_ms: RESPONSE_TIMEOUT_MS,
            max_errors: MAX_ERRORS,
            integrity: IntegrityMode::Crc16,
        }
    }
}

impl SessionConfig {
    /// Set the packet timeout; the watchdog follows at the default factor.
    #[must_use]
    pub fn with_packet_timeout(mut self, ms: u32) -> Self {
        self.packet_timeout_ms = ms;
        self.session_timeout_ms = ms.saturating_mul(SESSION_TIMEOUT_FACTOR);
        self
    }

    /// Set the session watchdog.
    #[must_use]
    pub fn with_session_timeout(mut self, ms: u32) -> Self {
        self.session_timeout_ms = ms;
        self
    }

    /// Set the ACK / second-EOT timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, ms: u32) -> Self {
        self.response_timeout_ms = ms;
        self
    }

    /// Set the CANCEL pair window.
    #[must_use]
    pub fn with_control_timeout(mut self, ms: u32) -> Self {
        self.control_timeout_ms = ms;
        self
    }

    /// Set the retry bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }

    /// Set the trailer mode.
    #[must_use]
    pub fn with_integrity(mut self, integrity: IntegrityMode) -> Self {
        self.integrity = integrity;
        self
    }
}

/// Receive-side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for packet 0.
    AwaitingHeader,
    /// Header accepted, taking data packets.
    Receiving,
    /// Transfer finished.
    Complete,
    /// Transfer gave up.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingHeader => "awaiting header",
            Self::Receiving => "receiving",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Mutable context of one receive transfer.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    file_name: [u8; FILE_NAME_MAX],
    file_name_len: usize,
    file_size: u32,
    bytes_transferred: u32,
    write_cursor: u32,
    expected_sequence: u8,
    error_count: u32,
    watchdog: Deadline,
}

impl Session {
    /// Fresh session writing from `base`, guarded by `watchdog`.
    pub fn new(base: u32, watchdog: Deadline) -> Self {
        Self {
            state: SessionState::AwaitingHeader,
            file_name: [0; FILE_NAME_MAX],
            file_name_len: 0,
            file_size: 0,
            bytes_transferred: 0,
            write_cursor: base,
            expected_sequence: 0,
            error_count: 0,
            watchdog,
        }
    }

    /// Fresh session whose watchdog starts now on `clock`.
    pub fn start<C: Clock + ?Sized>(base: u32, clock: &C, config: &SessionConfig) -> Self {
        Self::new(base, Deadline::after(clock, config.session_timeout_ms))
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// File name from the header record (empty before it arrives).
    pub fn file_name(&self) -> &str {
        // Only ever filled from a validated &str, cut at a char boundary.
        std::str::from_utf8(&self.file_name[..self.file_name_len]).unwrap_or_default()
    }

    /// Declared file size.
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Bytes stored so far.
    pub fn bytes_transferred(&self) -> u32 {
        self.bytes_transferred
    }

    /// Address the next accepted payload will be written to.
    pub fn write_cursor(&self) -> u32 {
        self.write_cursor
    }

    /// Sequence number of the next data packet.
    pub fn expected_sequence(&self) -> u8 {
        self.expected_sequence
    }

    /// Consecutive failures since the last success.
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Overall deadline of the transfer.
    pub fn watchdog(&self) -> Deadline {
        self.watchdog
    }

    /// Bytes still expected before the declared size is reached.
    pub fn remaining(&self) -> u32 {
        self.file_size
            .saturating_sub(self.bytes_transferred)
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Record the header and move on to data packet 1.
    pub(crate) fn accept_header(&mut self, name: &str, size: u32) {
        let mut len = name.len().min(FILE_NAME_MAX);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        self.file_name[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.file_name_len = len;
        self.file_size = size;
        self.expected_sequence = 1;
        self.error_count = 0;
        self.state = SessionState::Receiving;
    }

    /// Account for a stored data packet carrying `stored` file bytes.
    pub(crate) fn advance(&mut self, stored: u32) {
        self.write_cursor += stored;
        self.bytes_transferred += stored;
        self.expected_sequence = self
            .expected_sequence
            .wrapping_add(1);
        self.error_count = 0;
    }

    /// Count a packet-level failure; returns the new consecutive count.
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.error_count += 1;
        self.error_count
    }
}
