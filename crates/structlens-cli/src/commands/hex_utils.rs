//! Hex address parsing and formatting.

use anyhow::{Result, bail};

/// Parse a hex address, with or without a `0x` prefix.
pub fn parse_hex_address(s: &str) -> Result<u64> {
    let digits = s
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .replace('`', "");
    if digits.is_empty() {
        bail!("Invalid hex address: `{}`", s);
    }
    u64::from_str_radix(&digits, 16).map_err(|e| anyhow::anyhow!("Invalid hex address `{}`: {}", s, e))
}

/// Parse a map key: decimal, negative decimal, or `0x` hex.
pub fn parse_key(s: &str) -> Result<i128> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i128::from_str_radix(hex, 16).map_err(|e| anyhow::anyhow!("Invalid key `{}`: {}", s, e));
    }
    s.parse::<i128>()
        .map_err(|e| anyhow::anyhow!("Invalid key `{}`: {}", s, e))
}

pub fn format_hex_address(addr: u64) -> String {
    format!("0x{:X}", addr)
}

/// `AA BB CC` rendering of raw bytes
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
