//! YMODEM protocol engine.
//!
//! [`packet`] and [`crc`] are pure codec functions with no transfer state.
//! [`receive`] and [`transmit`] drive whole transfers over a
//! [`Transport`](crate::port::Transport), timed by a
//! [`Clock`](crate::clock::Clock).

pub mod crc;
pub(crate) mod link;
pub mod packet;
pub mod receive;
pub mod transmit;

pub use link::POLL_INTERVAL_MS;
pub use packet::{HeaderRecord, IntegrityMode, PacketKind, control, parse_int};
pub use receive::Receiver;
pub use transmit::Transmitter;
