//! Byte transport abstraction for the transfer engine.
//!
//! The engine never touches a UART directly. It drives a [`Transport`],
//! which only has to move bytes with a bounded wait:
//!
//! ```text
//! +------------------------+
//! |  Receiver / Transmitter|
//! +-----------+------------+
//!             |
//!             v
//! +-----------+------------+
//! |     Transport trait    |
//! +-----------+------------+
//!             |
//!     +-------+--------+
//!     v                v
//! NativePort      test doubles
//! (serialport)    (in-memory)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ymboot::port::Transport;
//!
//! fn send_ack<T: Transport>(link: &mut T) -> ymboot::Result<()> {
//!     link.write(&[0x06], 1000)
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::time::Duration;

use crate::error::Result;

/// Byte-level link to the peer.
pub trait Transport {
    /// Read up to `buf.len()` bytes, waiting at most `timeout_ms`.
    ///
    /// Returns the number of bytes read; `Ok(0)` means nothing arrived in
    /// time. An `Err` is a link failure, not a timeout.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;

    /// Write all of `buf`, waiting at most `timeout_ms`.
    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        (**self).read(buf, timeout_ms)
    }

    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<()> {
        (**self).write(buf, timeout_ms)
    }
}

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Initial read/write timeout.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;

    /// First USB port, falling back to the first port of any kind.
    fn auto_detect() -> Result<Option<PortInfo>> {
        let ports = Self::list_ports()?;
        let usb = ports
            .iter()
            .position(|p| p.vid.is_some());
        Ok(match usb {
            Some(i) => ports.into_iter().nth(i),
            None => ports.into_iter().next(),
        })
    }
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0", 921600).with_timeout(Duration::from_secs(5));

        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 921600);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    struct Fixed(Vec<PortInfo>);

    fn info(name: &str, vid: Option<u16>) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid,
            pid: vid.map(|_| 0x7523),
            manufacturer: None,
            product: None,
        }
    }

    thread_local! {
        static PORTS: std::cell::RefCell<Fixed> = std::cell::RefCell::new(Fixed(Vec::new()));
    }

    struct FixedEnumerator;

    impl PortEnumerator for FixedEnumerator {
        fn list_ports() -> Result<Vec<PortInfo>> {
            Ok(PORTS.with(|p| p.borrow().0.clone()))
        }
    }

    #[test]
    fn test_auto_detect_prefers_usb() {
        PORTS.with(|p| {
            *p.borrow_mut() = Fixed(vec![info("/dev/ttyS0", None), info("/dev/ttyUSB0", Some(0x1A86))]);
        });
        let port = FixedEnumerator::auto_detect().unwrap().unwrap();
        assert_eq!(port.name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_auto_detect_falls_back_to_first() {
        PORTS.with(|p| *p.borrow_mut() = Fixed(vec![info("/dev/ttyS1", None)]));
        let port = FixedEnumerator::auto_detect().unwrap().unwrap();
        assert_eq!(port.name, "/dev/ttyS1");

        PORTS.with(|p| *p.borrow_mut() = Fixed(Vec::new()));
        assert!(FixedEnumerator::auto_detect().unwrap().is_none());
    }
}
