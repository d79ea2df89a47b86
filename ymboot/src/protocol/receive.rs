//! Receive side of a YMODEM transfer.
//!
//! Drives a [`Session`] from `AwaitingHeader` to `Complete` or `Failed`:
//!
//! ```text
//!  AwaitingHeader --header--> Receiving --EOT, EOT--> Complete
//!        |  \--empty name / EOT----------------------> Complete
//!        |                       |
//!        +--- retry budget, watchdog, CAN CAN, storage ---> Failed
//! ```
//!
//! Data packets are checked in a fixed order: complement, trailer, expected
//! sequence, then storage. A valid packet carrying the wrong sequence number
//! is answered with NAK and costs nothing from the retry budget; every other
//! packet-level failure does.

use crate::clock::{Clock, Deadline};
use crate::error::{Error, TransferError, TransferOutcome};
use crate::port::Transport;
use crate::protocol::link::Link;
use crate::protocol::packet::{
    MAX_PACKET_LEN, PACKET_HEADER_LEN, PacketKind, body_len, control, decode_header_byte,
    parse_header_record, validate_body,
};
use crate::session::{Session, SessionConfig, SessionState};
use crate::storage::Storage;
use log::{debug, info, trace, warn};

/// What one read from the link produced.
enum Incoming {
    /// Validated data packet; payload is in the frame buffer.
    Data { kind: PacketKind, seq: u8 },
    /// End of transmission.
    End,
}

/// YMODEM receiver writing into a [`Storage`] region.
pub struct Receiver<T, S, C> {
    link: Link<T, C>,
    storage: S,
    config: SessionConfig,
}

impl<T: Transport, S: Storage, C: Clock> Receiver<T, S, C> {
    /// Create a receiver with the default [`SessionConfig`].
    pub fn new(transport: T, storage: S, clock: C) -> Self {
        Self::with_config(transport, storage, clock, SessionConfig::default())
    }

    /// Create a receiver with custom timeouts and retry bound.
    pub fn with_config(transport: T, storage: S, clock: C, config: SessionConfig) -> Self {
        let link = Link::new(transport, clock, config.packet_timeout_ms);
        Self {
            link,
            storage,
            config,
        }
    }

    /// Session tuning in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Receive one file into storage, accepting at most `capacity` bytes.
    ///
    /// Returns the number of bytes stored.
    pub fn receive(&mut self, capacity: u32) -> TransferOutcome {
        self.receive_with_progress(capacity, |_, _| {})
            .1
    }

    /// Receive one file, reporting `(stored, total)` after every stored
    /// packet, and hand back the finished session alongside the outcome.
    pub fn receive_with_progress<F>(&mut self, capacity: u32, progress: F) -> (Session, TransferOutcome)
    where
        F: FnMut(u32, u32),
    {
        let mut session = Session::start(self.storage.base(), self.link.clock(), &self.config);
        let outcome = self.receive_session(&mut session, capacity, progress);
        (session, outcome)
    }

    /// Run `session` to completion.
    ///
    /// The session must be fresh; its watchdog bounds the whole call.
    pub fn receive_session<F>(
        &mut self,
        session: &mut Session,
        capacity: u32,
        mut progress: F,
    ) -> TransferOutcome
    where
        F: FnMut(u32, u32),
    {
        info!(
            "Waiting for sender (base {:#010x}, capacity {capacity} bytes, {:?})",
            session.write_cursor(),
            self.config.integrity
        );
        self.link
            .set_watchdog(session.watchdog());
        let mut frame = [0u8; MAX_PACKET_LEN];

        let result = loop {
            let step = match session.state() {
                SessionState::AwaitingHeader => self.await_header(session, capacity, &mut frame),
                SessionState::Receiving => self.receive_data(session, &mut frame, &mut progress),
                SessionState::Complete => break Ok(session.bytes_transferred()),
                SessionState::Failed => break Err(TransferError::ProtocolError),
            };
            if let Err(err) = step {
                break Err(err);
            }
            if session.state() != SessionState::Complete && self.link.watchdog_expired() {
                warn!("Session watchdog expired in state {}", session.state());
                break Err(TransferError::TimedOut);
            }
        };

        match result {
            Ok(size) => {
                info!("Received '{}' ({size} bytes)", session.file_name());
            },
            Err(err) => {
                session.set_state(SessionState::Failed);
                if err != TransferError::Aborted {
                    self.link.send_cancel();
                }
                warn!("Receive failed: {err}");
            },
        }
        result
    }

    fn await_header(
        &mut self,
        session: &mut Session,
        capacity: u32,
        frame: &mut [u8; MAX_PACKET_LEN],
    ) -> Result<(), TransferError> {
        self.link
            .send_byte(self.config.integrity.start_byte())?;

        let (kind, seq) = match self.read_packet(frame) {
            Ok(Incoming::Data { kind, seq }) => (kind, seq),
            Ok(Incoming::End) => {
                debug!("EOT before any header, nothing to receive");
                self.link.send_byte(control::ACK)?;
                session.set_state(SessionState::Complete);
                return Ok(());
            },
            Err(TransferError::Aborted) => return Err(TransferError::Aborted),
            Err(err) => return self.penalize(session, err, false),
        };
        if seq != 0 {
            debug!("Data packet {seq} while waiting for the header");
            return self.penalize(session, TransferError::ProtocolError, false);
        }

        let payload = &frame[PACKET_HEADER_LEN..PACKET_HEADER_LEN + kind.payload_len()];
        let record = match parse_header_record(payload) {
            Ok(record) => record,
            Err(err) => return self.penalize(session, err, false),
        };

        if record.is_end_of_batch() {
            debug!("Empty header, batch closed");
            self.link.send_byte(control::ACK)?;
            session.set_state(SessionState::Complete);
            return Ok(());
        }

        // The caller's limit never exceeds what the region can hold.
        let limit = capacity.min(self.storage.capacity());
        let size = record.size;
        if size > limit {
            warn!("'{}' is {size} bytes, only {limit} available", record.name);
            return Err(TransferError::SizeLimitExceeded { size, capacity: limit });
        }
        let start = session.write_cursor();
        let end = start
            .checked_add(size)
            .ok_or(TransferError::SizeLimitExceeded { size, capacity: limit })?;

        debug!("Header: '{}' {size} bytes, erasing {start:#010x}..{end:#010x}", record.name);
        self.storage
            .erase(start, end)
            .map_err(|e| storage_failure(start, &e))?;
        session.accept_header(record.name, size);

        self.link.send_byte(control::ACK)?;
        self.link
            .send_byte(self.config.integrity.start_byte())?;
        Ok(())
    }

    fn receive_data<F>(
        &mut self,
        session: &mut Session,
        frame: &mut [u8; MAX_PACKET_LEN],
        progress: &mut F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(u32, u32),
    {
        let (kind, seq) = match self.read_packet(frame) {
            Ok(Incoming::Data { kind, seq }) => (kind, seq),
            Ok(Incoming::End) => return self.finish(session),
            Err(TransferError::Aborted) => return Err(TransferError::Aborted),
            Err(err) => return self.penalize(session, err, true),
        };

        if seq != session.expected_sequence() {
            debug!(
                "Packet {seq} while expecting {}, asking for resend",
                session.expected_sequence()
            );
            return self.link.send_byte(control::NAK);
        }

        let take = session
            .remaining()
            .min(kind.payload_len() as u32);
        if take > 0 {
            let address = session.write_cursor();
            let data = &frame[PACKET_HEADER_LEN..PACKET_HEADER_LEN + take as usize];
            self.storage
                .write(address, data)
                .map_err(|e| storage_failure(address, &e))?;
        }
        session.advance(take);
        trace!(
            "Packet {seq} stored, {}/{} bytes",
            session.bytes_transferred(),
            session.file_size()
        );

        self.link.send_byte(control::ACK)?;
        progress(session.bytes_transferred(), session.file_size());
        Ok(())
    }

    /// First EOT seen: ACK it, wait for the second, then close the session.
    fn finish(&mut self, session: &mut Session) -> Result<(), TransferError> {
        self.link.send_byte(control::ACK)?;
        self.await_second_eot()?;
        self.link.send_byte(control::ACK)?;

        if session.bytes_transferred() != session.file_size() {
            warn!(
                "Sender ended after {} of {} bytes",
                session.bytes_transferred(),
                session.file_size()
            );
            return Err(TransferError::ProtocolError);
        }
        session.set_state(SessionState::Complete);
        Ok(())
    }

    fn await_second_eot(&mut self) -> Result<(), TransferError> {
        let deadline = Deadline::after(self.link.clock(), self.config.response_timeout_ms);
        loop {
            let remaining = deadline.remaining(self.link.clock());
            match self.link.read_byte(remaining) {
                Ok(control::EOT) => return Ok(()),
                Ok(control::CAN) => {
                    if self
                        .link
                        .confirm_cancel(self.config.control_timeout_ms)?
                    {
                        debug!("Sender cancelled after EOT");
                        return Err(TransferError::Aborted);
                    }
                },
                Ok(other) => trace!("Ignoring 0x{other:02X} while waiting for EOT"),
                Err(TransferError::TimedOut) if self.link.watchdog_expired() => {
                    return Err(TransferError::TimedOut);
                },
                Err(TransferError::TimedOut) => {
                    debug!("Second EOT never arrived");
                    return Err(TransferError::ProtocolError);
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Read and validate one packet into `frame`.
    fn read_packet(&mut self, frame: &mut [u8; MAX_PACKET_LEN]) -> Result<Incoming, TransferError> {
        let header = self
            .link
            .read_byte(self.config.packet_timeout_ms)?;
        frame[0] = header;

        match decode_header_byte(header)? {
            PacketKind::EndOfTransmission => Ok(Incoming::End),
            PacketKind::AbortRequest => {
                debug!("Abort requested by user (0x{header:02X})");
                Err(TransferError::Aborted)
            },
            PacketKind::Cancel => {
                if self
                    .link
                    .confirm_cancel(self.config.control_timeout_ms)?
                {
                    debug!("Sender cancelled the transfer");
                    Err(TransferError::Aborted)
                } else {
                    Err(TransferError::ProtocolError)
                }
            },
            kind @ (PacketKind::Data128 | PacketKind::Data1K) => {
                let body = &mut frame[1..1 + body_len(kind, self.config.integrity)];
                self.link
                    .read_exact(body, self.config.packet_timeout_ms)?;
                let seq = validate_body(body, kind, self.config.integrity)?;
                Ok(Incoming::Data { kind, seq })
            },
        }
    }

    /// Count a packet-level failure and either give up or ask again.
    fn penalize(
        &mut self,
        session: &mut Session,
        err: TransferError,
        request_again: bool,
    ) -> Result<(), TransferError> {
        let count = session.record_failure();
        warn!(
            "{err} while {} ({count}/{})",
            session.state(),
            self.config.max_errors
        );
        if count >= self.config.max_errors {
            return Err(err);
        }
        if request_again {
            self.link
                .send_byte(self.config.integrity.start_byte())?;
        }
        Ok(())
    }
}

fn storage_failure(address: u32, err: &Error) -> TransferError {
    warn!("Storage failure at {address:#010x}: {err}");
    TransferError::StorageError { address }
}
