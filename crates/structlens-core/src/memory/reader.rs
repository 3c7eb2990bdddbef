use crate::error::{Error, Result};
use crate::memory::pattern::find_in_buffer;

/// Read access to the foreign process's address space.
///
/// All addresses are absolute 64-bit virtual addresses in the target.
/// Multi-byte values are little-endian.
pub trait ReadMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Whether `address` points into readable memory.
    ///
    /// Address 0 is never valid.
    fn is_valid_pointer(&self, address: u64) -> bool {
        address != 0 && self.read_bytes(address, 1).is_ok()
    }

    fn read_u8(&self, address: u64) -> Result<u8> {
        Ok(u8::from_le_bytes(to_array(address, self.read_bytes(address, 1)?)?))
    }

    fn read_u16(&self, address: u64) -> Result<u16> {
        Ok(u16::from_le_bytes(to_array(address, self.read_bytes(address, 2)?)?))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        Ok(u32::from_le_bytes(to_array(address, self.read_bytes(address, 4)?)?))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        Ok(u64::from_le_bytes(to_array(address, self.read_bytes(address, 8)?)?))
    }

    fn read_i8(&self, address: u64) -> Result<i8> {
        Ok(self.read_u8(address)? as i8)
    }

    fn read_i16(&self, address: u64) -> Result<i16> {
        Ok(self.read_u16(address)? as i16)
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        Ok(self.read_u32(address)? as i32)
    }

    fn read_i64(&self, address: u64) -> Result<i64> {
        Ok(self.read_u64(address)? as i64)
    }

    fn read_f32(&self, address: u64) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(address)?))
    }

    fn read_f64(&self, address: u64) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64(address)?))
    }

    /// Read a pointer-sized value
    fn read_ptr(&self, address: u64) -> Result<u64> {
        self.read_u64(address)
    }

    /// Search `[start, start + len)` for a byte pattern (`None` = wildcard).
    ///
    /// Returns the address of the first match.
    fn find_pattern(&self, start: u64, len: usize, pattern: &[Option<u8>]) -> Result<Option<u64>> {
        let buffer = self.read_bytes(start, len)?;
        Ok(find_in_buffer(&buffer, pattern).map(|pos| start + pos as u64))
    }
}

/// Write access to the foreign process's address space.
pub trait WriteMemory: ReadMemory {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()>;

    fn write_u8(&self, address: u64, value: u8) -> Result<()> {
        self.write_bytes(address, &[value])
    }

    fn write_u16(&self, address: u64, value: u16) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_u32(&self, address: u64, value: u32) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_u64(&self, address: u64, value: u64) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

impl<T: ReadMemory + ?Sized> ReadMemory for &T {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, size)
    }

    fn is_valid_pointer(&self, address: u64) -> bool {
        (**self).is_valid_pointer(address)
    }
}

fn to_array<const N: usize>(address: u64, bytes: Vec<u8>) -> Result<[u8; N]> {
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        Error::read_failed(address, format!("short read: expected {} bytes, got {}", N, len))
    })
}
