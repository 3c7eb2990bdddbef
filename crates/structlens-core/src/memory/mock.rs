//! In-memory address space for tests.

use std::cell::RefCell;

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, WriteMemory};

const DEFAULT_BASE: u64 = 0x1000_0000;

/// Lays out a little-endian address space by bump allocation.
///
/// ```ignore
/// let mut builder = MockMemoryBuilder::new();
/// let node = builder.alloc(0x28, 8);
/// builder.write_u64(node, 0x1234);
/// let reader = builder.build();
/// ```
pub struct MockMemoryBuilder {
    base: u64,
    data: Vec<u8>,
}

impl Default for MockMemoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::with_base(DEFAULT_BASE)
    }

    pub fn with_base(base: u64) -> Self {
        Self {
            base,
            data: Vec::new(),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Reserve `size` zeroed bytes aligned to `align`, returning their address.
    pub fn alloc(&mut self, size: usize, align: usize) -> u64 {
        let align = align.max(1);
        let start = self.data.len().div_ceil(align) * align;
        self.data.resize(start + size, 0);
        self.base + start as u64
    }

    pub fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> &mut Self {
        let offset = (address - self.base) as usize;
        if self.data.len() < offset + bytes.len() {
            self.data.resize(offset + bytes.len(), 0);
        }
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn write_u8(&mut self, address: u64, value: u8) -> &mut Self {
        self.write_bytes(address, &[value])
    }

    pub fn write_u16(&mut self, address: u64, value: u16) -> &mut Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, address: u64, value: u32) -> &mut Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_i32(&mut self, address: u64, value: i32) -> &mut Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_u64(&mut self, address: u64, value: u64) -> &mut Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn build(self) -> MockMemoryReader {
        MockMemoryReader {
            base: self.base,
            data: RefCell::new(self.data),
        }
    }
}

pub struct MockMemoryReader {
    base: u64,
    data: RefCell<Vec<u8>>,
}

impl MockMemoryReader {
    fn offset(&self, address: u64, size: usize) -> Option<usize> {
        let offset = usize::try_from(address.checked_sub(self.base)?).ok()?;
        (offset.checked_add(size)? <= self.data.borrow().len()).then_some(offset)
    }
}

impl ReadMemory for MockMemoryReader {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let offset = self
            .offset(address, size)
            .ok_or_else(|| Error::read_failed(address, "outside mock memory"))?;
        Ok(self.data.borrow()[offset..offset + size].to_vec())
    }
}

impl WriteMemory for MockMemoryReader {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let offset = self
            .offset(address, bytes.len())
            .ok_or_else(|| Error::MemoryWriteFailed {
                address,
                message: "outside mock memory".to_string(),
            })?;
        self.data.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_respects_alignment() {
        let mut builder = MockMemoryBuilder::new();
        let a = builder.alloc(3, 1);
        let b = builder.alloc(8, 8);
        assert_eq!(a, DEFAULT_BASE);
        assert_eq!(b, DEFAULT_BASE + 8);
    }

    #[test]
    fn test_typed_reads_are_little_endian() {
        let mut builder = MockMemoryBuilder::new();
        let addr = builder.alloc(16, 8);
        builder.write_u64(addr, 0x0102_0304_0506_0708).write_i32(addr + 8, -2);
        let reader = builder.build();

        assert_eq!(reader.read_u8(addr).unwrap(), 0x08);
        assert_eq!(reader.read_u16(addr).unwrap(), 0x0708);
        assert_eq!(reader.read_u64(addr).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(reader.read_i32(addr + 8).unwrap(), -2);
        assert!(reader.read_u64(addr + 12).is_err());
    }

    #[test]
    fn test_writes_are_visible_to_later_reads() {
        let mut builder = MockMemoryBuilder::new();
        let addr = builder.alloc(8, 8);
        let reader = builder.build();

        reader.write_u32(addr, 7).unwrap();
        assert_eq!(reader.read_u32(addr).unwrap(), 7);
        assert!(reader.write_u64(addr + 4, 1).is_err());
    }

    #[test]
    fn test_find_pattern_returns_address() {
        let mut builder = MockMemoryBuilder::new();
        let addr = builder.alloc(8, 1);
        builder.write_bytes(addr + 3, &[0x48, 0x8D, 0x0D]);
        let reader = builder.build();

        let pattern = crate::memory::parse_pattern("48 8D ??").unwrap();
        assert_eq!(
            reader.find_pattern(addr, 8, &pattern).unwrap(),
            Some(addr + 3)
        );
    }
}
