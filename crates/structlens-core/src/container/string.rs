use tracing::debug;

use crate::container::MAX_MATERIALIZE_BYTES;
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::string;

/// A `std::string` (char width 1) or `std::wstring` (char width 2) at `base`.
///
/// Short strings live in the header itself and long ones behind a pointer
/// stored there. Which one applies depends on the current capacity, so the
/// data address is looked up again on every access.
pub struct RemoteString<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    base: u64,
    char_width: u8,
}

impl<'a, R: ReadMemory + ?Sized> RemoteString<'a, R> {
    pub fn new(reader: &'a R, base: u64, char_width: u8) -> Self {
        Self {
            reader,
            base,
            char_width: char_width.max(1),
        }
    }

    pub fn narrow(reader: &'a R, base: u64) -> Self {
        Self::new(reader, base, 1)
    }

    pub fn wide(reader: &'a R, base: u64) -> Self {
        Self::new(reader, base, 2)
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn char_width(&self) -> u8 {
        self.char_width
    }

    /// Length in characters
    pub fn length(&self) -> Result<u64> {
        self.reader.read_u64(self.base.wrapping_add(string::LENGTH))
    }

    pub fn capacity(&self) -> Result<u64> {
        self.reader.read_u64(self.base.wrapping_add(string::CAPACITY))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.length()? == 0)
    }

    /// Largest capacity still stored inline
    pub fn inline_capacity(&self) -> u64 {
        string::INLINE_BUFFER_BYTES / self.char_width as u64 - 1
    }

    pub fn is_inline(&self) -> Result<bool> {
        Ok(self.capacity()? <= self.inline_capacity())
    }

    pub fn data_address(&self) -> Result<u64> {
        if self.is_inline()? {
            Ok(self.base.wrapping_add(string::DATA))
        } else {
            self.reader.read_ptr(self.base.wrapping_add(string::DATA))
        }
    }

    /// Exactly `length * char_width` bytes of character data.
    pub fn materialize(&self) -> Result<Vec<u8>> {
        let bytes = self.length()?.saturating_mul(self.char_width as u64);
        if bytes == 0 {
            return Ok(Vec::new());
        }
        if bytes > MAX_MATERIALIZE_BYTES {
            return Err(Error::read_failed(
                self.base,
                format!("implausible string length {}", bytes),
            ));
        }
        let data = self.data_address()?;
        debug!("Reading {} string bytes from {:#x}", bytes, data);
        self.reader.read_bytes(data, bytes as usize)
    }

    /// Decoded contents; invalid sequences become U+FFFD.
    pub fn to_string_lossy(&self) -> Result<String> {
        let bytes = self.materialize()?;
        let encoding = if self.char_width == 2 {
            encoding_rs::UTF_16LE
        } else {
            encoding_rs::UTF_8
        };
        let (decoded, _) = encoding.decode_without_bom_handling(&bytes);
        Ok(decoded.into_owned())
    }

    /// Same data address, or same length and bytes.
    pub fn equals(&self, other: &RemoteString<'_, R>) -> Result<bool> {
        if self.data_address()? == other.data_address()? {
            return Ok(true);
        }
        if self.length()? != other.length()? {
            return Ok(false);
        }
        Ok(self.materialize()? == other.materialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockMemoryBuilder, WriteMemory};

    fn write_inline(builder: &mut MockMemoryBuilder, base: u64, text: &[u8], capacity: u64) {
        builder
            .write_bytes(base + string::DATA, text)
            .write_u64(base + string::LENGTH, text.len() as u64)
            .write_u64(base + string::CAPACITY, capacity);
    }

    #[test]
    fn test_short_string_reads_inline() {
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        write_inline(&mut builder, base, b"Olmec", 15);
        let reader = builder.build();

        let s = RemoteString::narrow(&reader, base);
        assert!(s.is_inline().unwrap());
        assert_eq!(s.data_address().unwrap(), base);
        assert_eq!(s.to_string_lossy().unwrap(), "Olmec");
    }

    #[test]
    fn test_long_string_reads_through_pointer() {
        let text = b"Temple of Anubis entrance";
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        let heap = builder.alloc(64, 16);
        builder
            .write_bytes(heap, text)
            .write_u64(base + string::DATA, heap)
            .write_u64(base + string::LENGTH, text.len() as u64)
            .write_u64(base + string::CAPACITY, 31);
        let reader = builder.build();

        let s = RemoteString::narrow(&reader, base);
        assert!(!s.is_inline().unwrap());
        assert_eq!(s.data_address().unwrap(), heap);
        assert_eq!(s.materialize().unwrap(), text.to_vec());
    }

    #[test]
    fn test_wide_string_threshold_scales() {
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        let utf16: Vec<u8> = "Tiamat".encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
        let heap = builder.alloc(32, 16);
        builder
            .write_bytes(heap, &utf16)
            .write_u64(base + string::DATA, heap)
            .write_u64(base + string::LENGTH, 6)
            .write_u64(base + string::CAPACITY, 8);
        let reader = builder.build();

        let s = RemoteString::wide(&reader, base);
        assert_eq!(s.inline_capacity(), 7);
        assert_eq!(s.data_address().unwrap(), heap);
        assert_eq!(s.materialize().unwrap().len(), 12);
        assert_eq!(s.to_string_lossy().unwrap(), "Tiamat");
    }

    #[test]
    fn test_short_to_long_mutation_is_followed() {
        let long = b"a much longer replacement value";
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        let heap = builder.alloc(64, 16);
        builder.write_bytes(heap, long);
        write_inline(&mut builder, base, b"short", 15);
        let reader = builder.build();

        let s = RemoteString::narrow(&reader, base);
        assert_eq!(s.to_string_lossy().unwrap(), "short");

        reader.write_u64(base + string::DATA, heap).unwrap();
        reader.write_u64(base + string::LENGTH, long.len() as u64).unwrap();
        reader.write_u64(base + string::CAPACITY, 47).unwrap();
        assert_eq!(s.data_address().unwrap(), heap);
        assert_eq!(s.materialize().unwrap(), long.to_vec());
    }

    #[test]
    fn test_header_near_top_of_address_space() {
        let reader = MockMemoryBuilder::new().build();
        let s = RemoteString::narrow(&reader, u64::MAX - 8);
        assert!(s.length().unwrap_err().is_unreadable());
        assert!(s.capacity().unwrap_err().is_unreadable());
        assert!(s.to_string_lossy().unwrap_err().is_unreadable());
    }

    #[test]
    fn test_garbage_heap_pointer_is_a_read_error() {
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        builder
            .write_u64(base + string::DATA, u64::MAX - 2)
            .write_u64(base + string::LENGTH, 20)
            .write_u64(base + string::CAPACITY, 31);
        let reader = builder.build();

        let s = RemoteString::narrow(&reader, base);
        assert_eq!(s.data_address().unwrap(), u64::MAX - 2);
        assert!(s.materialize().unwrap_err().is_unreadable());
    }

    #[test]
    fn test_materialize_ignores_bytes_past_length() {
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        write_inline(&mut builder, base, b"abcdefgh", 15);
        builder.write_u64(base + string::LENGTH, 3);
        let reader = builder.build();

        let s = RemoteString::narrow(&reader, base);
        assert_eq!(s.materialize().unwrap(), b"abc".to_vec());
        assert!(!s.is_empty().unwrap());
    }

    #[test]
    fn test_empty_string() {
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        write_inline(&mut builder, base, b"", 15);
        let reader = builder.build();

        let s = RemoteString::narrow(&reader, base);
        assert!(s.is_empty().unwrap());
        assert_eq!(s.to_string_lossy().unwrap(), "");
    }

    #[test]
    fn test_equality() {
        let mut builder = MockMemoryBuilder::new();
        let a = builder.alloc(32, 8);
        let b = builder.alloc(32, 8);
        let c = builder.alloc(32, 8);
        write_inline(&mut builder, a, b"Lava", 15);
        write_inline(&mut builder, b, b"Lava", 15);
        write_inline(&mut builder, c, b"Lave", 15);
        let reader = builder.build();

        let sa = RemoteString::narrow(&reader, a);
        let sb = RemoteString::narrow(&reader, b);
        let sc = RemoteString::narrow(&reader, c);
        assert!(sa.equals(&sa).unwrap());
        assert!(sa.equals(&sb).unwrap());
        assert!(!sa.equals(&sc).unwrap());
    }

    #[test]
    fn test_shared_heap_pointer_is_equal() {
        let mut builder = MockMemoryBuilder::new();
        let a = builder.alloc(32, 8);
        let b = builder.alloc(32, 8);
        let heap = builder.alloc(32, 16);
        // Lengths disagree but the data address matches
        builder
            .write_u64(a + string::DATA, heap)
            .write_u64(a + string::LENGTH, 20)
            .write_u64(a + string::CAPACITY, 31)
            .write_u64(b + string::DATA, heap)
            .write_u64(b + string::LENGTH, 21)
            .write_u64(b + string::CAPACITY, 31);
        let reader = builder.build();

        let sa = RemoteString::narrow(&reader, a);
        let sb = RemoteString::narrow(&reader, b);
        assert!(sa.equals(&sb).unwrap());
    }

    #[test]
    fn test_implausible_length_is_rejected() {
        let mut builder = MockMemoryBuilder::new();
        let base = builder.alloc(32, 8);
        builder
            .write_u64(base + string::LENGTH, u64::MAX / 2)
            .write_u64(base + string::CAPACITY, u64::MAX);
        let reader = builder.build();

        let s = RemoteString::narrow(&reader, base);
        assert!(s.materialize().unwrap_err().is_unreadable());
    }
}
