//! Byte patterns in the usual `"48 8D 0D ?? ?? ?? ??"` notation.

use crate::error::{Error, Result};

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }

        let value = u8::from_str_radix(token, 16)
            .map_err(|e| Error::InvalidPattern(format!("invalid token '{}': {}", token, e)))?;
        bytes.push(Some(value));
    }

    if bytes.is_empty() {
        return Err(Error::InvalidPattern("pattern is empty".to_string()));
    }

    if bytes.iter().all(Option::is_none) {
        return Err(Error::InvalidPattern(
            "pattern consists only of wildcards".to_string(),
        ));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Position of the first match of `pattern` in `buffer`.
///
/// Candidates are located with `memchr` on the first fixed byte, then
/// verified against the whole pattern.
pub fn find_in_buffer(buffer: &[u8], pattern: &[Option<u8>]) -> Option<usize> {
    if pattern.is_empty() || buffer.len() < pattern.len() {
        return None;
    }

    let (anchor_index, anchor) = pattern
        .iter()
        .enumerate()
        .find_map(|(i, b)| b.map(|value| (i, value)))?;
    let last = buffer.len() - pattern.len();

    let mut search_from = anchor_index;
    while search_from <= last + anchor_index {
        let found = memchr::memchr(anchor, &buffer[search_from..=last + anchor_index])?;
        let start = search_from + found - anchor_index;
        if matches_at(buffer, start, pattern) {
            return Some(start);
        }
        search_from += found + 1;
    }

    None
}

fn matches_at(buffer: &[u8], start: usize, pattern: &[Option<u8>]) -> bool {
    pattern
        .iter()
        .zip(&buffer[start..start + pattern.len()])
        .all(|(expected, actual)| expected.is_none_or(|value| value == *actual))
}
