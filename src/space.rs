//! C2: address spaces.
//!
//! An address space is a fixed-length array of cells, each holding exactly
//! `char_bit` bits. A cell may be wider than 8 bits, so the backing store is
//! `Vec<u64>` with every cell masked to `char_bit` bits on write. Bounds are
//! checked explicitly rather than panicking past the end.

use crate::endian::{pack, unpack};
use crate::error::{MemResult, MemoryErr};

#[derive(Debug, Clone)]
pub struct AddressSpace {
    cells: Vec<u64>,
    char_bit: u32,
    read_only: bool,
}

impl AddressSpace {
    pub fn new(size: usize, char_bit: u32) -> Self {
        AddressSpace {
            cells: vec![0u64; size],
            char_bit,
            read_only: false,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn char_bit(&self) -> u32 {
        self.char_bit
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_bounds(&self, addr: u64) -> MemResult<()> {
        if (addr as usize) < self.cells.len() {
            Ok(())
        } else {
            Err(MemoryErr::OutOfBounds {
                addr,
                size: self.cells.len() as u64,
            })
        }
    }

    fn check_writable(&self, addr: u64) -> MemResult<()> {
        if self.read_only {
            Err(MemoryErr::ReadOnly { addr })
        } else {
            Ok(())
        }
    }

    pub fn load_cell(&self, addr: u64) -> MemResult<u64> {
        self.check_bounds(addr)?;
        Ok(self.cells[addr as usize])
    }

    pub fn store_cell(&mut self, addr: u64, value: u64) -> MemResult<()> {
        self.check_bounds(addr)?;
        self.check_writable(addr)?;
        let mask = if self.char_bit >= 64 {
            u64::MAX
        } else {
            (1u64 << self.char_bit) - 1
        };
        self.cells[addr as usize] = value & mask;
        Ok(())
    }

    /// Load `count` contiguous cells starting at `addr`, little-endian (the
    /// in-memory format never depends on opcode parity — §4.2).
    fn load_cells(&self, addr: u64, count: usize) -> MemResult<Vec<u64>> {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.load_cell(addr + i as u64)?);
        }
        Ok(out)
    }

    fn store_cells(&mut self, addr: u64, values: &[u64]) -> MemResult<()> {
        // All reads/bounds checks happen conceptually before any write: we
        // validate every target cell first so a partial store never occurs.
        for (i, _) in values.iter().enumerate() {
            self.check_bounds(addr + i as u64)?;
        }
        self.check_writable(addr)?;
        for (i, v) in values.iter().enumerate() {
            self.store_cell(addr + i as u64, *v)?;
        }
        Ok(())
    }

    pub fn load_word(&self, addr: u64, word_cells: usize) -> MemResult<u128> {
        let cells = self.load_cells(addr, word_cells)?;
        Ok(unpack(&cells, self.char_bit, true))
    }

    pub fn store_word(&mut self, addr: u64, word_cells: usize, value: u128) -> MemResult<()> {
        let cells = pack(value, word_cells, self.char_bit, true);
        self.store_cells(addr, &cells)
    }

    pub fn load_addr(&self, addr: u64, addr_cells: usize) -> MemResult<u64> {
        Ok(self.load_word(addr, addr_cells)? as u64)
    }

    pub fn store_addr(&mut self, addr: u64, addr_cells: usize, value: u64) -> MemResult<()> {
        self.store_word(addr, addr_cells, value as u128)
    }

    pub fn load_bytes(&self, addr: u64, n: usize) -> MemResult<Vec<u64>> {
        self.load_cells(addr, n)
    }

    pub fn store_bytes(&mut self, addr: u64, cells: &[u64]) -> MemResult<()> {
        self.store_cells(addr, cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_cell() {
        let mut s = AddressSpace::new(16, 8);
        s.store_cell(3, 0xFF).unwrap();
        assert_eq!(s.load_cell(3).unwrap(), 0xFF);
    }

    #[test]
    fn out_of_bounds_rejected() {
        let s = AddressSpace::new(4, 8);
        assert_eq!(
            s.load_cell(4),
            Err(MemoryErr::OutOfBounds { addr: 4, size: 4 })
        );
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut s = AddressSpace::new(4, 8);
        s.set_read_only(true);
        assert_eq!(s.store_cell(0, 1), Err(MemoryErr::ReadOnly { addr: 0 }));
    }

    #[test]
    fn word_round_trip() {
        let mut s = AddressSpace::new(16, 8);
        s.store_word(0, 4, 0x01020304).unwrap();
        assert_eq!(s.load_word(0, 4).unwrap(), 0x01020304);
        // little-endian in memory regardless of opcode parity.
        assert_eq!(s.load_cell(0).unwrap(), 0x04);
        assert_eq!(s.load_cell(3).unwrap(), 0x01);
    }

    #[test]
    fn cell_store_masks_to_char_bit() {
        let mut s = AddressSpace::new(4, 9);
        s.store_cell(0, 0x3FF).unwrap();
        assert_eq!(s.load_cell(0).unwrap(), 0x1FF);
    }
}
