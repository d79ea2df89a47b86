//! YMODEM packet codec.
//!
//! Translates between wire bytes and validated packets. The codec holds no
//! transfer state; sequencing and retries live in the session state machines.
//!
//! ```text
//! Data packet:
//! +--------+-----+------+------------------+----------+
//! | header | SEQ | ~SEQ |     payload      | trailer  |
//! +--------+-----+------+------------------+----------+
//! |   1    |  1  |  1   |   128 | 1024     |  2 | 1   |
//! +--------+-----+------+------------------+----------+
//! ```
//!
//! The trailer is a big-endian CRC-16/XMODEM in CRC mode, or a one-byte
//! additive checksum in checksum mode.

use crate::error::TransferError;
use crate::protocol::crc::{checksum8, crc16_xmodem};
use byteorder::{BigEndian, ByteOrder};
use std::io::Write as _;

/// YMODEM control characters.
pub mod control {
    /// Start of Header (128-byte block).
    pub const SOH: u8 = 0x01;
    /// Start of Text (1024-byte block).
    pub const STX: u8 = 0x02;
    /// End of Transmission.
    pub const EOT: u8 = 0x04;
    /// Acknowledge.
    pub const ACK: u8 = 0x06;
    /// Not Acknowledge.
    pub const NAK: u8 = 0x15;
    /// Cancel (sent twice in succession).
    pub const CAN: u8 = 0x18;
    /// CRC mode request character.
    pub const C: u8 = b'C';
    /// Abort requested by the user, upper case.
    pub const ABORT1: u8 = b'A';
    /// Abort requested by the user, lower case.
    pub const ABORT2: u8 = b'a';
    /// CP/M end-of-file, used to pad the tail of the last data block.
    pub const CPMEOF: u8 = 0x1A;
}

/// Payload size of SOH packets.
pub const SOH_BLOCK_SIZE: usize = 128;

/// Payload size of STX packets (YMODEM-1K).
pub const STX_BLOCK_SIZE: usize = 1024;

/// Header, sequence and complement bytes.
pub const PACKET_HEADER_LEN: usize = 3;

/// Largest possible frame: STX header + 1K payload + CRC trailer.
pub const MAX_PACKET_LEN: usize = PACKET_HEADER_LEN + STX_BLOCK_SIZE + 2;

/// Longest file name accepted in a header record, excluding the NUL.
pub const FILE_NAME_MAX: usize = 63;

/// Kind of a packet, as announced by its leading byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// SOH: 128-byte data packet.
    Data128,
    /// STX: 1024-byte data packet.
    Data1K,
    /// EOT: end of the file.
    EndOfTransmission,
    /// CA: cancel, valid only when followed by a second CA.
    Cancel,
    /// 'A' or 'a': abort requested by the user.
    AbortRequest,
}

impl PacketKind {
    /// Payload length carried by this kind (zero for control packets).
    pub fn payload_len(self) -> usize {
        match self {
            Self::Data128 => SOH_BLOCK_SIZE,
            Self::Data1K => STX_BLOCK_SIZE,
            Self::EndOfTransmission | Self::Cancel | Self::AbortRequest => 0,
        }
    }

    /// Whether this kind introduces a data packet.
    pub fn is_data(self) -> bool {
        matches!(self, Self::Data128 | Self::Data1K)
    }

    /// Leading wire byte of this kind.
    pub fn header_byte(self) -> u8 {
        match self {
            Self::Data128 => control::SOH,
            Self::Data1K => control::STX,
            Self::EndOfTransmission => control::EOT,
            Self::Cancel => control::CAN,
            Self::AbortRequest => control::ABORT1,
        }
    }
}

/// Map the leading byte of a packet to its kind.
pub fn decode_header_byte(byte: u8) -> Result<PacketKind, TransferError> {
    match byte {
        control::SOH => Ok(PacketKind::Data128),
        control::STX => Ok(PacketKind::Data1K),
        control::EOT => Ok(PacketKind::EndOfTransmission),
        control::CAN => Ok(PacketKind::Cancel),
        control::ABORT1 | control::ABORT2 => Ok(PacketKind::AbortRequest),
        _ => Err(TransferError::ProtocolError),
    }
}

/// Trailer flavour of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum IntegrityMode {
    /// 16-bit CRC-16/XMODEM trailer.
    #[default]
    Crc16,
    /// 8-bit additive checksum trailer.
    Checksum,
}

impl IntegrityMode {
    /// Trailer length in bytes.
    pub fn trailer_len(self) -> usize {
        match self {
            Self::Crc16 => 2,
            Self::Checksum => 1,
        }
    }

    /// Byte a receiver emits to request a transfer in this mode.
    pub fn start_byte(self) -> u8 {
        match self {
            Self::Crc16 => control::C,
            Self::Checksum => control::NAK,
        }
    }

    /// Mode requested by a receiver's start byte, if it is one.
    pub fn from_start_byte(byte: u8) -> Option<Self> {
        match byte {
            control::C => Some(Self::Crc16),
            control::NAK => Some(Self::Checksum),
            _ => None,
        }
    }
}

/// Check the complement invariant: `seq + comp ≡ 255 (mod 256)`.
pub fn validate_sequence(seq: u8, comp: u8) -> bool {
    seq.wrapping_add(comp) == 0xFF
}

/// Trailer value of `payload` in the given mode.
pub fn integrity(payload: &[u8], mode: IntegrityMode) -> u16 {
    match mode {
        IntegrityMode::Crc16 => crc16_xmodem(payload),
        IntegrityMode::Checksum => u16::from(checksum8(payload)),
    }
}

/// Length of the part of a data frame that follows its header byte.
pub fn body_len(kind: PacketKind, mode: IntegrityMode) -> usize {
    2 + kind.payload_len() + mode.trailer_len()
}

/// Validate the body of a data packet (everything after the header byte).
///
/// The complement is checked before the trailer, so a structurally broken
/// packet is reported as [`TransferError::SequenceError`] even when its
/// trailer is also wrong. Returns the sequence number.
pub fn validate_body(
    body: &[u8],
    kind: PacketKind,
    mode: IntegrityMode,
) -> Result<u8, TransferError> {
    let payload_len = kind.payload_len();
    if !kind.is_data() || body.len() != body_len(kind, mode) {
        return Err(TransferError::ProtocolError);
    }

    let (seq, comp) = (body[0], body[1]);
    if !validate_sequence(seq, comp) {
        return Err(TransferError::SequenceError);
    }

    let payload = &body[2..2 + payload_len];
    let trailer = &body[2 + payload_len..];
    let received = match mode {
        IntegrityMode::Crc16 => BigEndian::read_u16(trailer),
        IntegrityMode::Checksum => u16::from(trailer[0]),
    };
    if integrity(payload, mode) != received {
        return Err(TransferError::IntegrityError);
    }

    Ok(seq)
}

/// Build a data packet into `out` and return the frame length.
///
/// `data` longer than the payload of `kind` is cut; shorter data is filled
/// with `pad`.
pub fn encode_packet(
    out: &mut [u8; MAX_PACKET_LEN],
    kind: PacketKind,
    seq: u8,
    data: &[u8],
    pad: u8,
    mode: IntegrityMode,
) -> usize {
    debug_assert!(kind.is_data(), "only data packets carry a frame");
    let payload_len = kind.payload_len();
    let used = data.len().min(payload_len);

    out[0] = kind.header_byte();
    out[1] = seq;
    out[2] = !seq;

    let payload = &mut out[PACKET_HEADER_LEN..PACKET_HEADER_LEN + payload_len];
    payload[..used].copy_from_slice(&data[..used]);
    payload[used..].fill(pad);

    let trailer_at = PACKET_HEADER_LEN + payload_len;
    let code = integrity(&out[PACKET_HEADER_LEN..trailer_at], mode);
    match mode {
        IntegrityMode::Crc16 => BigEndian::write_u16(&mut out[trailer_at..trailer_at + 2], code),
        IntegrityMode::Checksum => out[trailer_at] = code.to_be_bytes()[1],
    }

    trailer_at + mode.trailer_len()
}

/// Metadata carried by packet 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord<'a> {
    /// File name; empty for the block that closes a batch.
    pub name: &'a str,
    /// Declared file size in bytes.
    pub size: u32,
}

impl HeaderRecord<'_> {
    /// Whether this record closes the batch instead of announcing a file.
    pub fn is_end_of_batch(&self) -> bool {
        self.name.is_empty()
    }
}

/// Parse the payload of packet 0: `name\0size[ ...]\0<padding>`.
pub fn parse_header_record(payload: &[u8]) -> Result<HeaderRecord<'_>, TransferError> {
    let nul = payload
        .iter()
        .position(|&b| b == 0)
        .ok_or(TransferError::ProtocolError)?;

    if nul > FILE_NAME_MAX {
        return Err(TransferError::ProtocolError);
    }
    let name = std::str::from_utf8(&payload[..nul]).map_err(|_| TransferError::ProtocolError)?;
    if name.is_empty() {
        return Ok(HeaderRecord { name, size: 0 });
    }

    let rest = &payload[nul + 1..];
    let end = rest
        .iter()
        .position(|&b| b == b' ' || b == 0)
        .unwrap_or(rest.len());
    let size = parse_int(&rest[..end]).ok_or(TransferError::ProtocolError)?;

    Ok(HeaderRecord { name, size })
}

/// Write a header record for `name`/`size` into `payload`, zero-padded.
pub fn encode_header_record(
    name: &str,
    size: u32,
    payload: &mut [u8],
) -> Result<(), TransferError> {
    let name_bytes = name.as_bytes();
    if name_bytes.len() > FILE_NAME_MAX
        || name_bytes.contains(&0)
        || name_bytes.len() + 1 >= payload.len()
    {
        return Err(TransferError::ProtocolError);
    }

    payload.fill(0);
    payload[..name_bytes.len()].copy_from_slice(name_bytes);

    let mut cursor = &mut payload[name_bytes.len() + 1..];
    write!(cursor, "{size}").map_err(|_| TransferError::ProtocolError)?;
    Ok(())
}

/// Parse an unsigned integer using the bootloader's shared convention.
///
/// Accepts up to 10 decimal digits optionally ended by `k`/`K` (×1024) or
/// `m`/`M` (×1 048 576), or `0x`/`0X` followed by up to 8 hex digits.
/// Anything after a size suffix is ignored. Returns `None` on empty input,
/// stray characters or overflow.
pub fn parse_int(s: &[u8]) -> Option<u32> {
    if let Some(hex) = s
        .strip_prefix(b"0x")
        .or_else(|| s.strip_prefix(b"0X"))
    {
        if hex.is_empty() || hex.len() > 8 {
            return None;
        }
        return hex.iter().try_fold(0u32, |acc, &b| {
            let digit = char::from(b).to_digit(16)?;
            Some((acc << 4) | digit)
        });
    }

    let mut value: u32 = 0;
    for (i, &b) in s.iter().enumerate() {
        match b {
            b'k' | b'K' if i > 0 => return value.checked_mul(1 << 10),
            b'm' | b'M' if i > 0 => return value.checked_mul(1 << 20),
            b'0'..=b'9' if i < 10 => {
                value = value
                    .checked_mul(10)?
                    .checked_add(u32::from(b - b'0'))?;
            },
            _ => return None,
        }
    }

    (!s.is_empty()).then_some(value)
}
