//! Error types for ymboot.

use std::io;
use thiserror::Error;

/// Result type for adapter-level operations (transport, storage, clock).
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the collaborators the transfer engine talks to.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Storage access outside the reserved region.
    #[error("Storage range error: {len} bytes at {address:#010x} outside {base:#010x}..{end:#010x}")]
    OutOfRange {
        /// Requested start address.
        address: u32,
        /// Requested length in bytes.
        len: usize,
        /// First address of the region.
        base: u32,
        /// One past the last address of the region.
        end: u32,
    },

    /// Programmed data did not read back as written.
    #[error("Storage verify failed at {address:#010x}: wrote {expected:#04x}, read {actual:#04x}")]
    VerifyFailed {
        /// Address of the first mismatching byte.
        address: u32,
        /// Byte that was programmed.
        expected: u8,
        /// Byte that was read back.
        actual: u8,
    },

    /// Operation interrupted by the embedding application.
    #[error("Interrupted")]
    Interrupted,
}

/// Terminal failure of a transfer session.
///
/// Packet-level failures are retried inside the engine; one of these is only
/// returned once a session has given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Cancelled by the peer (double CANCEL or abort byte) or by the link.
    #[error("transfer aborted")]
    Aborted,

    /// Per-packet timeout exhausted the retry budget, or the session watchdog fired.
    #[error("transfer timed out")]
    TimedOut,

    /// Declared file size does not fit the reserved region.
    #[error("file size {size} exceeds capacity {capacity}")]
    SizeLimitExceeded {
        /// Declared (or transmitted) size in bytes.
        size: u32,
        /// Capacity of the region in bytes.
        capacity: u32,
    },

    /// Packet trailer did not match its payload.
    #[error("packet integrity check failed")]
    IntegrityError,

    /// Sequence byte and complement byte disagree.
    #[error("packet sequence/complement mismatch")]
    SequenceError,

    /// Storage rejected an erase or write.
    #[error("storage failure at {address:#010x}")]
    StorageError {
        /// Address of the failed operation.
        address: u32,
    },

    /// Malformed control byte or header record.
    #[error("protocol error")]
    ProtocolError,
}

/// Outcome of one `receive` or `transmit` call.
///
/// `Ok(size)` is a successful transfer of `size` bytes.
pub type TransferOutcome = std::result::Result<u32, TransferError>;
