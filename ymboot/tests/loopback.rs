//! Transmitter and receiver talking to each other over an in-process pipe.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use ymboot::{
    Error, IntegrityMode, MemoryStorage, Receiver, SessionConfig, SystemClock, TransferError,
    Transmitter, Transport,
};

const BASE: u32 = 0x0801_0000;

/// One end of a full-duplex byte pipe.
struct PipeEnd {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

fn pipe() -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        PipeEnd {
            tx: a_tx,
            rx: a_rx,
            pending: VecDeque::new(),
        },
        PipeEnd {
            tx: b_tx,
            rx: b_rx,
            pending: VecDeque::new(),
        },
    )
}

impl Transport for PipeEnd {
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> ymboot::Result<usize> {
        if self.pending.is_empty() {
            match self
                .rx
                .recv_timeout(Duration::from_millis(u64::from(timeout_ms)))
            {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                // The peer finished and hung up; nothing more will come.
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf
            .iter_mut()
            .zip(self.pending.drain(..n))
        {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> ymboot::Result<()> {
        // A peer that already returned is not an error for the sender.
        let _ = self.tx.send(buf.to_vec());
        Ok(())
    }
}

/// Transport whose link is already gone.
struct DeadLink;

impl Transport for DeadLink {
    fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> ymboot::Result<usize> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "unplugged",
        )))
    }

    fn write(&mut self, _buf: &[u8], _timeout_ms: u32) -> ymboot::Result<()> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "unplugged",
        )))
    }
}

fn fast_config() -> SessionConfig {
    SessionConfig::default()
        .with_packet_timeout(2000)
        .with_response_timeout(300)
}

fn firmware(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i * 7 + 3).to_le_bytes()[0])
        .collect()
}

/// Run a transfer of `image` and return both outcomes plus the flash region.
fn transfer(
    image: &[u8],
    capacity: u32,
    config: SessionConfig,
) -> (ymboot::TransferOutcome, ymboot::TransferOutcome, MemoryStorage) {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();

    let (mut host, mut device) = pipe();
    let rx_config = config.clone();
    let receiver = thread::spawn(move || {
        let mut flash = MemoryStorage::new(BASE, capacity);
        let clock = SystemClock::new();
        let outcome =
            Receiver::with_config(&mut device, &mut flash, &clock, rx_config).receive(capacity);
        (outcome, flash)
    });

    let clock = SystemClock::new();
    let size = u32::try_from(image.len()).expect("test image fits in u32");
    let sent = Transmitter::with_config(&mut host, &clock, config).transmit(image, "app.bin", size);

    let (received, flash) = receiver
        .join()
        .expect("receiver thread panicked");
    (sent, received, flash)
}

#[test]
fn test_loopback_multi_block_image() {
    let image = firmware(5000);
    let (sent, received, flash) = transfer(&image, 64 * 1024, fast_config());

    assert_eq!(sent, Ok(5000));
    assert_eq!(received, Ok(5000));
    assert_eq!(flash.image(5000), image.as_slice());
}

#[test]
fn test_loopback_exact_block_multiple() {
    let image = firmware(2048);
    let (sent, received, flash) = transfer(&image, 4096, fast_config());

    assert_eq!(sent, Ok(2048));
    assert_eq!(received, Ok(2048));
    assert_eq!(flash.image(2048), image.as_slice());
    // Bytes past the image stay erased.
    assert!(flash.contents()[2048..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_loopback_checksum_mode() {
    let image = firmware(300);
    let config = fast_config().with_integrity(IntegrityMode::Checksum);
    let (sent, received, flash) = transfer(&image, 4096, config);

    assert_eq!(sent, Ok(300));
    assert_eq!(received, Ok(300));
    assert_eq!(flash.image(300), image.as_slice());
}

#[test]
fn test_loopback_oversized_image_is_refused() {
    let image = firmware(8192);
    let (sent, received, flash) = transfer(&image, 4096, fast_config());

    assert_eq!(
        received,
        Err(TransferError::SizeLimitExceeded {
            size: 8192,
            capacity: 4096
        })
    );
    assert_eq!(sent, Err(TransferError::Aborted));
    assert!(flash.contents().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_dead_link_aborts_both_directions() {
    let clock = SystemClock::new();
    let mut flash = MemoryStorage::new(BASE, 1024);

    assert_eq!(
        Receiver::new(DeadLink, &mut flash, &clock).receive(1024),
        Err(TransferError::Aborted)
    );
    assert_eq!(
        Transmitter::new(DeadLink, &clock).transmit(&[0; 16], "x.bin", 16),
        Err(TransferError::Aborted)
    );
}
