//! # ymboot
//!
//! YMODEM file transfer for serial bootloaders.
//!
//! This crate provides the transfer engine a bootloader uses to accept an
//! application image over a serial line, and the matching sender:
//!
//! - Packet codec with CRC-16/XMODEM or 8-bit checksum trailers
//! - Receive state machine writing into an erasable [`Storage`] region
//! - Transmit sequence with per-block retry
//! - Per-packet, control-byte and whole-session timeouts on an injected
//!   [`Clock`]
//!
//! The engine is generic over three small capabilities ([`Transport`],
//! [`Storage`], [`Clock`]), so it runs the same against a real serial port
//! and against in-memory fakes.
//!
//! ## Features
//!
//! - `native` (default): [`NativePort`] serial transport via the `serialport` crate
//! - `serde`: Serialization support for [`SessionConfig`] and [`IntegrityMode`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use ymboot::{MemoryStorage, Receiver, SystemClock};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut port = ymboot::NativePort::open_simple("/dev/ttyUSB0", 115_200)?;
//!         let mut flash = MemoryStorage::new(0x0801_0000, 64 * 1024);
//!         let clock = SystemClock::new();
//!
//!         let size = Receiver::new(&mut port, &mut flash, &clock).receive(64 * 1024)?;
//!         println!("received {size} bytes");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod clock;
pub mod error;
pub mod port;
pub mod protocol;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker consulted by transports.
///
/// The checker should return `true` when the current transfer should stop
/// (for example after receiving Ctrl-C in CLI applications). The native
/// transport then fails its next read or write, which ends the session as
/// [`TransferError::Aborted`].
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    clock::{Clock, Deadline, SystemClock},
    error::{Error, Result, TransferError, TransferOutcome},
    port::{PortEnumerator, PortInfo, SerialConfig, Transport},
    protocol::{IntegrityMode, Receiver, Transmitter},
    session::{Session, SessionConfig, SessionState},
    storage::{MemoryStorage, Storage},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
