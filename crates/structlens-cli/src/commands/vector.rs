//! Vector command: list a remote `std::vector`.

use anyhow::{Context, Result};
use clap::Args;
use structlens_core::{ReadMemory, RemoteVector, TypeCatalog, read_scalar};

use super::hex_utils::parse_hex_address;

#[derive(Args, Debug, Clone)]
pub struct VectorArgs {
    /// Address of the vector object (hex)
    #[arg(value_parser = parse_hex_address)]
    pub address: u64,

    /// Element type name
    #[arg(long)]
    pub elem: String,

    /// Maximum elements printed
    #[arg(long, default_value_t = 64)]
    pub limit: usize,
}

pub fn run<R: ReadMemory>(catalog: &TypeCatalog, reader: &R, args: &VectorArgs) -> Result<()> {
    for line in describe(catalog, reader, args)? {
        println!("{}", line);
    }
    Ok(())
}

pub fn describe<R: ReadMemory>(
    catalog: &TypeCatalog,
    reader: &R,
    args: &VectorArgs,
) -> Result<Vec<String>> {
    let shape = catalog
        .value_shape(&args.elem)
        .with_context(|| format!("Unknown element type {}", args.elem))?;
    let vector = RemoteVector::new(reader, args.address, shape.size);

    let len = vector.len()?;
    let mut lines = vec![format!(
        "{} x {} ({} bytes each), capacity {}",
        len,
        args.elem,
        shape.size,
        vector.capacity()?
    )];
    for (index, address) in vector.iter()?.take(args.limit).enumerate() {
        let value = match shape.kind.as_scalar() {
            Some(scalar) => read_scalar(reader, address, scalar)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "<unreadable>".to_string()),
            None => String::new(),
        };
        lines.push(
            format!("  [{}] {:#x} {}", index, address, value)
                .trim_end()
                .to_string(),
        );
    }
    if len > args.limit as u64 {
        lines.push(format!("  ... {} more", len - args.limit as u64));
    }
    Ok(lines)
}
