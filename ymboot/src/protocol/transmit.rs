//! Transmit side of a YMODEM transfer.
//!
//! ## Wire sequence
//!
//! ```text
//! sender                              receiver
//!   <------------------------------------ 'C' | NAK   (picks CRC or checksum)
//!   SOH 00 FF "name\0size\0..." CRC --->
//!   <------------------------------------ ACK [ 'C' ]
//!   STX 01 FE <1024 bytes> CRC -------->
//!   <------------------------------------ ACK
//!   ...
//!   SOH nn .. <last bytes, 0x1A pad> -->
//!   <------------------------------------ ACK
//!   EOT -------------------------------->  <--- ACK
//!   EOT -------------------------------->  <--- ACK
//!   SOH 00 FF <zeros> CRC -------------->          (closes the batch)
//! ```
//!
//! Every block is retried on its own; a NAK or a fresh start byte is a
//! request to resend, a CAN pair from the receiver aborts the transfer.

use crate::clock::{Clock, Deadline};
use crate::error::{TransferError, TransferOutcome};
use crate::port::Transport;
use crate::protocol::link::Link;
use crate::protocol::packet::{
    IntegrityMode, MAX_PACKET_LEN, PACKET_HEADER_LEN, PacketKind, SOH_BLOCK_SIZE, STX_BLOCK_SIZE,
    control, encode_header_record, encode_packet,
};
use crate::session::SessionConfig;
use log::{debug, info, trace, warn};

/// YMODEM sender.
pub struct Transmitter<T, C> {
    link: Link<T, C>,
    config: SessionConfig,
    capacity: u32,
    mode: IntegrityMode,
}

impl<T: Transport, C: Clock> Transmitter<T, C> {
    /// Create a transmitter with the default [`SessionConfig`] and no
    /// capacity limit.
    pub fn new(transport: T, clock: C) -> Self {
        Self::with_config(transport, clock, SessionConfig::default())
    }

    /// Create a transmitter with custom timeouts and retry bound.
    pub fn with_config(transport: T, clock: C, config: SessionConfig) -> Self {
        let link = Link::new(transport, clock, config.packet_timeout_ms);
        Self {
            link,
            mode: config.integrity,
            config,
            capacity: u32::MAX,
        }
    }

    /// Stop with [`TransferError::SizeLimitExceeded`] once `capacity` bytes
    /// worth of 1K blocks have been sent and data remains.
    #[must_use]
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Trailer mode the receiver asked for in the last transfer.
    pub fn integrity(&self) -> IntegrityMode {
        self.mode
    }

    /// Send the first `size` bytes of `source` as `name`.
    pub fn transmit(&mut self, source: &[u8], name: &str, size: u32) -> TransferOutcome {
        self.transmit_with_progress(source, name, size, |_, _| {})
    }

    /// Like [`transmit`](Self::transmit), reporting `(sent, total)` after
    /// every acknowledged data block.
    pub fn transmit_with_progress<F>(
        &mut self,
        source: &[u8],
        name: &str,
        size: u32,
        mut progress: F,
    ) -> TransferOutcome
    where
        F: FnMut(u32, u32),
    {
        info!("Sending '{name}' ({size} bytes)");
        let watchdog = Deadline::after(self.link.clock(), self.config.session_timeout_ms);
        self.link
            .set_watchdog(watchdog);

        let result = self.run(source, name, size, &mut progress);
        match result {
            Ok(_) => info!("Sent '{name}' ({size} bytes)"),
            Err(err) => {
                if err != TransferError::Aborted {
                    self.link.send_cancel();
                }
                warn!("Transmit failed: {err}");
            },
        }
        result
    }

    fn run<F>(&mut self, source: &[u8], name: &str, size: u32, progress: &mut F) -> TransferOutcome
    where
        F: FnMut(u32, u32),
    {
        let Some(data) = source.get(..size as usize) else {
            warn!("Source holds {} bytes, {size} announced", source.len());
            return Err(TransferError::ProtocolError);
        };
        let mut frame = [0u8; MAX_PACKET_LEN];

        self.wait_for_start()?;

        // Block 0: file information.
        let mut record = [0u8; SOH_BLOCK_SIZE];
        encode_header_record(name, size, &mut record)?;
        let len = encode_packet(&mut frame, PacketKind::Data128, 0, &record, 0, self.mode);
        debug!("Sending file info: {name} ({size} bytes)");
        self.send_block(&frame[..len])?;
        self.absorb_start_request()?;

        let max_blocks = self.capacity / STX_BLOCK_SIZE as u32;
        let mut block: u32 = 1;
        let mut offset: u32 = 0;
        while offset < size {
            let remaining = size - offset;
            let kind = if remaining as usize >= STX_BLOCK_SIZE {
                PacketKind::Data1K
            } else {
                PacketKind::Data128
            };
            let start = offset as usize;
            let end = start + (remaining as usize).min(kind.payload_len());
            let len = encode_packet(
                &mut frame,
                kind,
                block.to_le_bytes()[0],
                &data[start..end],
                control::CPMEOF,
                self.mode,
            );
            trace!("Block {block} at offset {offset}");
            self.send_block(&frame[..len])?;

            offset = end as u32;
            progress(offset, size);

            if offset < size {
                if block >= max_blocks {
                    warn!("Receiver region of {} bytes is full", self.capacity);
                    return Err(TransferError::SizeLimitExceeded {
                        size,
                        capacity: self.capacity,
                    });
                }
                block += 1;
            }
        }

        debug!("Sending EOT");
        self.send_block(&[control::EOT])?;
        self.send_block(&[control::EOT])?;

        self.send_finish(&mut frame)?;
        debug!("YMODEM transfer complete");
        Ok(size)
    }

    /// Wait for the receiver's start byte and adopt the mode it asks for.
    fn wait_for_start(&mut self) -> Result<(), TransferError> {
        debug!("Waiting for receiver start byte...");
        let mut silent = 0;
        loop {
            match self
                .link
                .read_byte(self.config.packet_timeout_ms)
            {
                Ok(byte) => {
                    if let Some(mode) = IntegrityMode::from_start_byte(byte) {
                        debug!("Receiver requested {mode:?}");
                        self.mode = mode;
                        return Ok(());
                    }
                    if byte == control::CAN
                        && self
                            .link
                            .confirm_cancel(self.config.control_timeout_ms)?
                    {
                        return Err(TransferError::Aborted);
                    }
                    trace!("Ignoring 0x{byte:02X} before start");
                },
                Err(TransferError::TimedOut) => {
                    silent += 1;
                    if silent >= self.config.max_errors {
                        return Err(TransferError::TimedOut);
                    }
                },
                Err(err) => return Err(err),
            }
            if self.link.watchdog_expired() {
                return Err(TransferError::TimedOut);
            }
        }
    }

    /// Consume the start byte some receivers send after acknowledging the
    /// header. Others go straight to waiting for data, so anything else is
    /// left for the next read.
    fn absorb_start_request(&mut self) -> Result<(), TransferError> {
        match self
            .link
            .read_byte(self.config.control_timeout_ms)
        {
            Ok(byte) if byte == self.mode.start_byte() => Ok(()),
            Ok(byte) => {
                self.link.unread(byte);
                Ok(())
            },
            Err(TransferError::TimedOut) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Send `frame` until it is acknowledged or the retry budget runs out.
    fn send_block(&mut self, frame: &[u8]) -> Result<(), TransferError> {
        let mut failures = 0;
        loop {
            self.link.send(frame)?;

            let err = match self
                .link
                .read_byte(self.config.response_timeout_ms)
            {
                Ok(control::ACK) => return Ok(()),
                Ok(control::CAN) => {
                    if self
                        .link
                        .confirm_cancel(self.config.control_timeout_ms)?
                    {
                        debug!("Receiver cancelled the transfer");
                        return Err(TransferError::Aborted);
                    }
                    TransferError::ProtocolError
                },
                Ok(control::NAK | control::C) => TransferError::IntegrityError,
                Ok(other) => {
                    debug!("Unexpected response: 0x{other:02X}");
                    TransferError::ProtocolError
                },
                Err(TransferError::TimedOut) => TransferError::TimedOut,
                Err(err) => return Err(err),
            };

            failures += 1;
            debug!("Block not acknowledged ({err}), attempt {failures}/{}", self.config.max_errors);
            if failures >= self.config.max_errors {
                return Err(err);
            }
            if self.link.watchdog_expired() {
                return Err(TransferError::TimedOut);
            }
        }
    }

    /// Send the all-zero block 0 that closes the batch.
    fn send_finish(&mut self, frame: &mut [u8; MAX_PACKET_LEN]) -> Result<(), TransferError> {
        debug!("Sending finish block");
        let len = encode_packet(frame, PacketKind::Data128, 0, &[], 0, self.mode);
        debug_assert_eq!(len, PACKET_HEADER_LEN + SOH_BLOCK_SIZE + self.mode.trailer_len());
        self.link.send(&frame[..len])?;

        match self
            .link
            .read_byte(self.config.response_timeout_ms)
        {
            Ok(control::CAN) => Err(TransferError::Aborted),
            _ => Ok(()),
        }
    }
}
