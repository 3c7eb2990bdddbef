use tracing::warn;

use crate::container::MAX_MATERIALIZE_BYTES;
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::vector;

/// A `std::vector` at `base` whose elements are `elem_size` bytes wide
pub struct RemoteVector<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    base: u64,
    elem_size: u64,
}

impl<'a, R: ReadMemory + ?Sized> RemoteVector<'a, R> {
    pub fn new(reader: &'a R, base: u64, elem_size: u64) -> Self {
        Self {
            reader,
            base,
            elem_size,
        }
    }

    pub fn begin(&self) -> Result<u64> {
        self.reader.read_ptr(self.base.wrapping_add(vector::BEGIN))
    }

    pub fn end(&self) -> Result<u64> {
        self.reader.read_ptr(self.base.wrapping_add(vector::END))
    }

    /// Element count. Fails when the header is inconsistent.
    pub fn len(&self) -> Result<u64> {
        self.span_len(vector::END)
    }

    pub fn capacity(&self) -> Result<u64> {
        self.span_len(vector::CAPACITY_END)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.begin()? == self.end()?)
    }

    fn span_len(&self, end_offset: u64) -> Result<u64> {
        if self.elem_size == 0 {
            warn!("Zero-sized vector element at {:#x}", self.base);
            return Ok(0);
        }
        let begin = self.begin()?;
        let end = self.reader.read_ptr(self.base.wrapping_add(end_offset))?;
        if end < begin || end - begin > MAX_MATERIALIZE_BYTES {
            return Err(Error::read_failed(
                self.base,
                format!("implausible vector span {:#x}..{:#x}", begin, end),
            ));
        }
        Ok((end - begin) / self.elem_size)
    }

    /// Address of element `index`, `None` past the end
    pub fn element_address(&self, index: u64) -> Result<Option<u64>> {
        if index >= self.len()? {
            return Ok(None);
        }
        Ok(Some(self.begin()? + index * self.elem_size))
    }

    /// Addresses of every element, read from one header snapshot
    pub fn iter(&self) -> Result<impl Iterator<Item = u64> + use<R>> {
        let begin = self.begin()?;
        let len = self.len()?;
        let elem_size = self.elem_size;
        Ok((0..len).map(move |i| begin + i * elem_size))
    }
}
