//! Persistent storage for the received image.
//!
//! The engine only needs three things from the flash driver: a fixed base
//! address, range erase, and range program. Address space and capacity are
//! fixed by the caller and never negotiated over the wire.

pub mod memory;

pub use memory::MemoryStorage;

use crate::error::Result;

/// Erase/program access to the image region.
pub trait Storage {
    /// First address of the image region.
    fn base(&self) -> u32;

    /// Size of the image region in bytes.
    fn capacity(&self) -> u32;

    /// Erase `start..end` (end exclusive).
    fn erase(&mut self, start: u32, end: u32) -> Result<()>;

    /// Program `data` at `address`.
    ///
    /// A failed write may have left the region partially programmed.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn base(&self) -> u32 {
        (**self).base()
    }

    fn capacity(&self) -> u32 {
        (**self).capacity()
    }

    fn erase(&mut self, start: u32, end: u32) -> Result<()> {
        (**self).erase(start, end)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        (**self).write(address, data)
    }
}
