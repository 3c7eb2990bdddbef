//! String command: decode a remote `std::string` / `std::wstring`.

use anyhow::Result;
use clap::Args;
use structlens_core::{ReadMemory, RemoteString};

use super::hex_utils::parse_hex_address;

#[derive(Args, Debug, Clone)]
pub struct StringArgs {
    /// Address of the string object (hex)
    #[arg(value_parser = parse_hex_address)]
    pub address: u64,

    /// UTF-16 `std::wstring`
    #[arg(long)]
    pub wide: bool,
}

pub fn run<R: ReadMemory>(reader: &R, args: &StringArgs) -> Result<()> {
    for line in describe(reader, args)? {
        println!("{}", line);
    }
    Ok(())
}

pub fn describe<R: ReadMemory>(reader: &R, args: &StringArgs) -> Result<Vec<String>> {
    let string = if args.wide {
        RemoteString::wide(reader, args.address)
    } else {
        RemoteString::narrow(reader, args.address)
    };

    let storage = if string.is_inline()? {
        "inline".to_string()
    } else {
        format!("heap {:#x}", string.data_address()?)
    };
    Ok(vec![
        format!(
            "length {} / capacity {} ({})",
            string.length()?,
            string.capacity()?,
            storage
        ),
        format!("{:?}", string.to_string_lossy()?),
    ])
}
