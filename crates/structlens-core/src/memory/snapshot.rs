//! Offline memory source backed by a raw dump file.
//!
//! A dump is a flat file of captured regions. The region table comes from a
//! `.maps` sidecar next to the dump, one region per line:
//!
//! ```text
//! # start        end            size     file_offset
//! 0x140000000    0x140002000    0x2000   0x0
//! 0x7ff600000000 0x7ff600001000 0x1000   0x2000
//! ```
//!
//! Without a sidecar the whole file is treated as one region at a caller
//! supplied base address.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, WriteMemory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRegion {
    pub start: u64,
    pub end: u64,
    pub file_offset: u64,
}

impl SnapshotRegion {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, address: u64, size: usize) -> bool {
        address >= self.start && address.saturating_add(size as u64) <= self.end
    }
}

pub struct SnapshotReader {
    data: RefCell<Vec<u8>>,
    regions: Vec<SnapshotRegion>,
}

impl SnapshotReader {
    /// Open a dump, taking its region table from the `.maps` sidecar.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let maps_path = path.with_extension("maps");
        let data = fs::read(path)?;
        let content = fs::read_to_string(&maps_path)?;
        let regions = parse_maps(&content)?;

        let file_len = data.len() as u64;
        if let Some(region) = regions
            .iter()
            .find(|r| r.file_offset.saturating_add(r.size()) > file_len)
        {
            return Err(invalid_data(format!(
                "region {:#x}-{:#x} extends past the end of the dump ({} bytes)",
                region.start, region.end, file_len
            )));
        }

        info!(
            "Opened snapshot {} ({} regions, {} bytes)",
            path.display(),
            regions.len(),
            data.len()
        );
        Ok(Self {
            data: RefCell::new(data),
            regions,
        })
    }

    /// Open a dump that was captured as one contiguous region at `base`.
    pub fn open_at(path: impl AsRef<Path>, base: u64) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        info!(
            "Opened snapshot {} at {:#x} ({} bytes)",
            path.as_ref().display(),
            base,
            data.len()
        );
        Ok(Self::from_region(base, data))
    }

    pub fn from_region(base: u64, data: Vec<u8>) -> Self {
        let region = SnapshotRegion {
            start: base,
            end: base + data.len() as u64,
            file_offset: 0,
        };
        Self {
            data: RefCell::new(data),
            regions: vec![region],
        }
    }

    pub fn regions(&self) -> &[SnapshotRegion] {
        &self.regions
    }

    /// Start of the lowest captured region
    pub fn base_address(&self) -> u64 {
        self.regions.iter().map(|r| r.start).min().unwrap_or(0)
    }

    fn file_offset(&self, address: u64, size: usize) -> Option<usize> {
        self.regions
            .iter()
            .find(|r| r.contains(address, size))
            .map(|r| (r.file_offset + (address - r.start)) as usize)
    }
}

impl ReadMemory for SnapshotReader {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let offset = self
            .file_offset(address, size)
            .ok_or_else(|| Error::read_failed(address, format!("{} bytes not captured", size)))?;
        Ok(self.data.borrow()[offset..offset + size].to_vec())
    }
}

/// Writes only touch the in-memory copy; the dump file is never modified.
impl WriteMemory for SnapshotReader {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let offset =
            self.file_offset(address, bytes.len())
                .ok_or_else(|| Error::MemoryWriteFailed {
                    address,
                    message: format!("{} bytes not captured", bytes.len()),
                })?;
        self.data.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

fn parse_maps(content: &str) -> Result<Vec<SnapshotRegion>> {
    let mut regions = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(invalid_data(format!(
                "maps line {}: expected `start end size file_offset`",
                line_no + 1
            )));
        }

        let start = parse_hex(parts[0], line_no)?;
        let end = parse_hex(parts[1], line_no)?;
        let file_offset = parse_hex(parts[3], line_no)?;
        if end <= start {
            return Err(invalid_data(format!(
                "maps line {}: empty region {:#x}-{:#x}",
                line_no + 1,
                start,
                end
            )));
        }

        regions.push(SnapshotRegion {
            start,
            end,
            file_offset,
        });
    }

    if regions.is_empty() {
        return Err(invalid_data("maps file lists no regions".to_string()));
    }

    debug!("Parsed {} snapshot regions", regions.len());
    Ok(regions)
}

fn parse_hex(token: &str, line_no: usize) -> Result<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16)
        .map_err(|e| invalid_data(format!("maps line {}: `{}`: {}", line_no + 1, token, e)))
}

fn invalid_data(message: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_region_reads_inside_only() {
        let reader = SnapshotReader::from_region(0x1000, (0u8..32).collect());
        assert_eq!(reader.read_u8(0x1005).unwrap(), 5);
        assert_eq!(reader.read_bytes(0x101E, 2).unwrap(), vec![30, 31]);
        assert!(reader.read_bytes(0x101F, 2).is_err());
        assert!(reader.read_u8(0xFFF).is_err());
        assert!(!reader.is_valid_pointer(0));
    }

    #[test]
    fn test_open_with_maps_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("game.dmp");
        let maps_path = dir.path().join("game.maps");

        let mut dump = vec![0u8; 0x30];
        dump[0x00..0x08].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        dump[0x20..0x24].copy_from_slice(&42u32.to_le_bytes());
        fs::write(&dump_path, &dump).unwrap();

        let mut maps = fs::File::create(&maps_path).unwrap();
        writeln!(maps, "# start end size file_offset").unwrap();
        writeln!(maps, "0x140000000 0x140000020 0x20 0x0").unwrap();
        writeln!(maps, "0x7ff600000000 0x7ff600000010 0x10 0x20").unwrap();
        drop(maps);

        let reader = SnapshotReader::open(&dump_path).unwrap();
        assert_eq!(reader.regions().len(), 2);
        assert_eq!(reader.base_address(), 0x1_4000_0000);
        assert_eq!(reader.read_u64(0x1_4000_0000).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(reader.read_u32(0x7ff6_0000_0000).unwrap(), 42);
        // Gap between regions is not captured
        assert!(reader.read_u8(0x1_4000_0020).is_err());
    }

    #[test]
    fn test_open_rejects_region_past_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("short.dmp");
        fs::write(&dump_path, [0u8; 8]).unwrap();
        fs::write(dir.path().join("short.maps"), "0x1000 0x2000 0x1000 0x0\n").unwrap();

        assert!(SnapshotReader::open(&dump_path).is_err());
    }

    #[test]
    fn test_open_missing_sidecar_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("lonely.dmp");
        fs::write(&dump_path, [0u8; 8]).unwrap();

        let err = SnapshotReader::open(&dump_path).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_write_updates_in_memory_copy() {
        let reader = SnapshotReader::from_region(0x2000, vec![0u8; 16]);
        reader.write_u32(0x2004, 0xDEAD_BEEF).unwrap();
        assert_eq!(reader.read_u32(0x2004).unwrap(), 0xDEAD_BEEF);
        assert!(reader.write_u64(0x200C, 1).is_err());
    }
}
