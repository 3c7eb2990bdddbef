//! Hexdump command: raw bytes at an address.

use anyhow::Result;
use structlens_core::ReadMemory;

use super::hex_utils::format_hex_address;

/// Bytes per output row
const ROW: usize = 16;

pub fn run<R: ReadMemory>(reader: &R, address: u64, size: usize) -> Result<()> {
    let bytes = reader.read_bytes(address, size)?;
    println!("Hexdump at {} ({} bytes):", format_hex_address(address), size);
    for line in format_rows(address, &bytes) {
        println!("{}", line);
    }
    Ok(())
}

/// `ADDRESS: XX XX ..  XX XX  |ascii|` rows, absolute addresses
pub fn format_rows(address: u64, bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(ROW)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("{:#014x}: ", address + (i * ROW) as u64);
            for j in 0..ROW {
                if j == ROW / 2 {
                    line.push(' ');
                }
                match chunk.get(j) {
                    Some(byte) => line.push_str(&format!("{:02X} ", byte)),
                    None => line.push_str("   "),
                }
            }
            line.push_str(" |");
            line.extend(chunk.iter().map(|&b| {
                if (0x20..0x7F).contains(&b) {
                    b as char
                } else {
                    '.'
                }
            }));
            line.push('|');
            line
        })
        .collect()
}
