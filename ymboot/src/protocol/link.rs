//! Timed byte I/O shared by the receive and transmit engines.
//!
//! Every wait is bounded by its own budget and, when one is set, by the
//! session watchdog. A transport error of any kind ends the transfer as
//! [`TransferError::Aborted`].

use crate::clock::{Clock, Deadline};
use crate::error::{Error, TransferError};
use crate::port::Transport;
use crate::protocol::packet::control;
use log::{trace, warn};

/// Back-off between empty reads while a window is still open.
pub const POLL_INTERVAL_MS: u32 = 1;

pub(crate) struct Link<T, C> {
    transport: T,
    clock: C,
    watchdog: Option<Deadline>,
    pending: Option<u8>,
    write_timeout_ms: u32,
}

impl<T: Transport, C: Clock> Link<T, C> {
    pub(crate) fn new(transport: T, clock: C, write_timeout_ms: u32) -> Self {
        Self {
            transport,
            clock,
            watchdog: None,
            pending: None,
            write_timeout_ms,
        }
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn set_watchdog(&mut self, watchdog: Deadline) {
        self.watchdog = Some(watchdog);
    }

    pub(crate) fn watchdog_expired(&self) -> bool {
        self.watchdog
            .is_some_and(|w| w.expired(&self.clock))
    }

    /// Fill `buf` completely within `timeout_ms`.
    pub(crate) fn read_exact(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), TransferError> {
        let deadline = Deadline::after(&self.clock, timeout_ms);
        let mut filled = 0;

        if let (Some(byte), Some(first)) = (self.pending, buf.first_mut()) {
            *first = byte;
            self.pending = None;
            filled = 1;
        }

        while filled < buf.len() {
            let now = self.clock.now_ms();
            let mut remaining = deadline.remaining_at(now);
            if let Some(watchdog) = self.watchdog {
                remaining = remaining.min(watchdog.remaining_at(now));
            }
            if remaining == 0 {
                trace!("read timed out with {filled}/{} bytes", buf.len());
                return Err(TransferError::TimedOut);
            }

            let n = self
                .transport
                .read(&mut buf[filled..], remaining)
                .map_err(link_failure)?;
            if n == 0 {
                self.clock
                    .sleep_ms(POLL_INTERVAL_MS);
            } else {
                filled += n;
            }
        }
        Ok(())
    }

    pub(crate) fn read_byte(&mut self, timeout_ms: u32) -> Result<u8, TransferError> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte, timeout_ms)?;
        Ok(byte[0])
    }

    /// Push a byte back so the next read sees it first.
    pub(crate) fn unread(&mut self, byte: u8) {
        debug_assert!(self.pending.is_none(), "only one byte of pushback");
        self.pending = Some(byte);
    }

    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        self.transport
            .write(bytes, self.write_timeout_ms)
            .map_err(link_failure)
    }

    pub(crate) fn send_byte(&mut self, byte: u8) -> Result<(), TransferError> {
        self.send(&[byte])
    }

    /// Tell the peer the transfer is over. Best effort: the session is
    /// already failing.
    pub(crate) fn send_cancel(&mut self) {
        if let Err(e) = self
            .transport
            .write(&[control::CAN, control::CAN], self.write_timeout_ms)
        {
            warn!("could not notify peer of cancellation: {e}");
        }
    }

    /// After a first CAN, check whether a second one follows within
    /// `window_ms`.
    pub(crate) fn confirm_cancel(&mut self, window_ms: u32) -> Result<bool, TransferError> {
        match self.read_byte(window_ms) {
            Ok(control::CAN) => Ok(true),
            Ok(other) => {
                trace!("lone CAN followed by 0x{other:02X}");
                Ok(false)
            },
            Err(TransferError::TimedOut) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn link_failure(err: Error) -> TransferError {
    warn!("link failure: {err}");
    TransferError::Aborted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, MockTransport};

    #[test]
    fn test_read_exact_collects_split_input() {
        let mut transport = MockTransport::with_incoming(&[1, 2, 3, 4]);
        let clock = FakeClock::new();
        let mut link = Link::new(&mut transport, &clock, 100);

        let mut buf = [0u8; 4];
        link.read_exact(&mut buf, 50)
            .unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn test_read_times_out_on_silence() {
        let mut transport = MockTransport::new();
        let clock = FakeClock::new();
        let mut link = Link::new(&mut transport, &clock, 100);

        assert_eq!(link.read_byte(50), Err(TransferError::TimedOut));
        assert_eq!(clock.now_ms(), 50);
    }

    #[test]
    fn test_watchdog_bounds_reads() {
        let mut transport = MockTransport::new();
        let clock = FakeClock::new();
        let mut link = Link::new(&mut transport, &clock, 100);
        link.set_watchdog(Deadline::starting_at(0, 20));

        assert_eq!(link.read_byte(5000), Err(TransferError::TimedOut));
        assert_eq!(clock.now_ms(), 20);
        assert!(link.watchdog_expired());
    }

    #[test]
    fn test_transport_error_is_abort() {
        let mut transport = MockTransport::with_incoming(&[0x06]);
        transport.fail_reads();
        let clock = FakeClock::new();
        let mut link = Link::new(&mut transport, &clock, 100);

        assert_eq!(link.read_byte(50), Err(TransferError::Aborted));
    }

    #[test]
    fn test_unread_byte_is_read_first() {
        let mut transport = MockTransport::with_incoming(&[0x02]);
        let clock = FakeClock::new();
        let mut link = Link::new(&mut transport, &clock, 100);

        link.unread(0x01);
        let mut buf = [0u8; 2];
        link.read_exact(&mut buf, 10)
            .unwrap();
        assert_eq!(buf, [0x01, 0x02]);
    }

    #[test]
    fn test_confirm_cancel() {
        let mut transport = MockTransport::with_incoming(&[control::CAN, b'x']);
        let clock = FakeClock::new();
        let mut link = Link::new(&mut transport, &clock, 100);

        assert_eq!(link.confirm_cancel(100), Ok(true));
        assert_eq!(link.confirm_cancel(100), Ok(false));
        assert_eq!(link.confirm_cancel(100), Ok(false));
    }

    #[test]
    fn test_send_cancel_writes_two_can() {
        let mut transport = MockTransport::new();
        let clock = FakeClock::new();
        Link::new(&mut transport, &clock, 100).send_cancel();
        assert_eq!(transport.tx, [control::CAN, control::CAN]);
    }
}
