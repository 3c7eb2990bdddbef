use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::schema::{Scalar, ScalarRepr};

/// A scalar decoded from the target
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ScalarValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
    Char(u16),
    Ipv4(Ipv4Addr),
    Address(u64),
}

impl ScalarValue {
    /// Integer view used for flag/state title lookups
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ScalarValue::Signed(v) => Some(v),
            ScalarValue::Unsigned(v) | ScalarValue::Address(v) => Some(v as i64),
            ScalarValue::Bool(v) => Some(v as i64),
            ScalarValue::Char(v) => Some(v as i64),
            ScalarValue::Ipv4(addr) => Some(u32::from(addr) as i64),
            ScalarValue::Float(_) => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Signed(v) => write!(f, "{}", v),
            ScalarValue::Unsigned(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "'{}'", c.escape_default()),
                None => write!(f, "U+{:04X}", v),
            },
            ScalarValue::Ipv4(addr) => write!(f, "{}", addr),
            ScalarValue::Address(v) => write!(f, "{:#x}", v),
        }
    }
}

/// Read one scalar at `address`. Address 0 is never readable.
pub fn read_scalar<R: ReadMemory>(reader: &R, address: u64, scalar: Scalar) -> Result<ScalarValue> {
    if address == 0 {
        return Err(Error::read_failed(0, "unresolved address"));
    }
    let bytes = reader.read_bytes(address, scalar.width as usize)?;

    let value = match scalar.repr {
        ScalarRepr::Float if scalar.width == 4 => {
            ScalarValue::Float(f32::from_bits(scalar.decode_integer(&bytes) as u32) as f64)
        }
        ScalarRepr::Float => ScalarValue::Float(f64::from_bits(scalar.decode_integer(&bytes) as u64)),
        ScalarRepr::Bool => ScalarValue::Bool(bytes.iter().any(|&b| b != 0)),
        ScalarRepr::Char16 => ScalarValue::Char(scalar.decode_integer(&bytes) as u16),
        ScalarRepr::Ipv4 => {
            // Stored in network byte order
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&bytes[..4]);
            ScalarValue::Ipv4(Ipv4Addr::from(octets))
        }
        ScalarRepr::Address => ScalarValue::Address(scalar.decode_integer(&bytes) as u64),
        _ if scalar.is_signed() => ScalarValue::Signed(scalar.decode_integer(&bytes) as i64),
        _ => ScalarValue::Unsigned(scalar.decode_integer(&bytes) as u64),
    };
    Ok(value)
}
