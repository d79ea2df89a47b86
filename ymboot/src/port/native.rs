//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the serial transport for hosted platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result},
        is_interrupted_requested,
        port::{DataBits, Parity, PortEnumerator, PortInfo, SerialConfig, StopBits, Transport},
    },
    log::trace,
    serialport::ClearBuffer,
    std::{
        io::{ErrorKind, Read, Write},
        time::Duration,
    },
};

/// Native serial port implementation.
pub struct NativePort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    timeout: Duration,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(
                config
                    .data_bits
                    .into(),
            )
            .parity(
                config
                    .parity
                    .into(),
            )
            .stop_bits(
                config
                    .stop_bits
                    .into(),
            )
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self {
            port,
            name: config
                .port_name
                .clone(),
            timeout: config.timeout,
        })
    }

    /// Open a serial port with default settings.
    pub fn open_simple(port_name: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig::new(port_name, baud_rate);
        Self::open(&config)
    }

    /// Get the port name/path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Discard anything pending in the input and output buffers.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::All)?;
        Ok(())
    }

    fn apply_timeout(&mut self, timeout_ms: u32) -> Result<()> {
        // serialport treats a zero timeout as non-blocking on some platforms.
        let timeout = Duration::from_millis(u64::from(timeout_ms.max(1)));
        if timeout != self.timeout {
            self.port
                .set_timeout(timeout)?;
            self.timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for NativePort {
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        if is_interrupted_requested() {
            return Err(Error::Interrupted);
        }
        self.apply_timeout(timeout_ms)?;

        match self
            .port
            .read(buf)
        {
            Ok(n) => {
                trace!("rx {n} bytes");
                Ok(n)
            },
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<()> {
        if is_interrupted_requested() {
            return Err(Error::Interrupted);
        }
        self.apply_timeout(timeout_ms)?;

        trace!("tx {} bytes", buf.len());
        self.port
            .write_all(buf)?;
        self.port
            .flush()?;
        Ok(())
    }
}

/// Native port enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let (vid, pid, manufacturer, product) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(info) => (
                        Some(info.vid),
                        Some(info.pid),
                        info.manufacturer
                            .clone(),
                        info.product
                            .clone(),
                    ),
                    _ => (None, None, None, None),
                };

                PortInfo {
                    name: p.port_name,
                    vid,
                    pid,
                    manufacturer,
                    product,
                }
            })
            .collect())
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}
