//! RAM-backed flash region with NOR semantics.
//!
//! Erase sets bytes to `0xFF`; programming can only clear bits, and every
//! write is read back and compared, like the bootloader's flash driver does
//! after each word it programs.

use crate::error::{Error, Result};
use crate::storage::Storage;
use log::trace;

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

/// In-memory flash region.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    base: u32,
    cells: Vec<u8>,
}

impl MemoryStorage {
    /// Create a fully erased region of `capacity` bytes at `base`.
    pub fn new(base: u32, capacity: u32) -> Self {
        Self {
            base,
            cells: vec![ERASED; capacity as usize],
        }
    }

    /// Whole region, erased bytes included.
    pub fn contents(&self) -> &[u8] {
        &self.cells
    }

    /// First `len` bytes of the region, clamped to its size.
    pub fn image(&self, len: u32) -> &[u8] {
        let len = (len as usize).min(self.cells.len());
        &self.cells[..len]
    }

    fn end(&self) -> u32 {
        self.base
            .saturating_add(self.capacity())
    }

    fn offset(&self, address: u32, len: usize) -> Result<usize> {
        let out_of_range = || Error::OutOfRange {
            address,
            len,
            base: self.base,
            end: self.end(),
        };

        let offset = address
            .checked_sub(self.base)
            .ok_or_else(out_of_range)? as usize;
        if offset
            .checked_add(len)
            .is_none_or(|end| end > self.cells.len())
        {
            return Err(out_of_range());
        }
        Ok(offset)
    }
}

impl Storage for MemoryStorage {
    fn base(&self) -> u32 {
        self.base
    }

    #[allow(clippy::cast_possible_truncation)]
    fn capacity(&self) -> u32 {
        // Constructed from a u32 capacity or a caller-sized buffer.
        self.cells.len().min(u32::MAX as usize) as u32
    }

    fn erase(&mut self, start: u32, end: u32) -> Result<()> {
        let len = end.saturating_sub(start) as usize;
        let offset = self.offset(start, len)?;
        trace!("erase {start:#010x}..{end:#010x}");
        self.cells[offset..offset + len].fill(ERASED);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let offset = self.offset(address, data.len())?;
        trace!("program {} bytes at {address:#010x}", data.len());

        let cells = &mut self.cells[offset..offset + data.len()];
        for (i, (cell, &byte)) in cells
            .iter_mut()
            .zip(data)
            .enumerate()
        {
            *cell &= byte;
            if *cell != byte {
                return Err(Error::VerifyFailed {
                    address: address + i as u32,
                    expected: byte,
                    actual: *cell,
                });
            }
        }
        Ok(())
    }
}
