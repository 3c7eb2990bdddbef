//! Map command: walk a remote `std::map` / `std::set`.

use anyhow::{Context, Result};
use clap::Args;
use structlens_core::{NodeLayout, ReadMemory, RemoteMap, TypeCatalog, read_scalar};

use super::hex_utils::{parse_hex_address, parse_key};

#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    /// Address of the map's control block (hex)
    #[arg(value_parser = parse_hex_address)]
    pub address: u64,

    /// Key type name
    #[arg(long)]
    pub key: String,

    /// Value type name; omit for a set
    #[arg(long)]
    pub value: Option<String>,

    /// Look up a single key (decimal, negative or 0x-prefixed)
    #[arg(long, value_parser = parse_key)]
    pub find: Option<i128>,

    /// Maximum entries printed
    #[arg(long, default_value_t = 64)]
    pub limit: usize,
}

/// One printed map element
#[derive(Debug, Clone, PartialEq)]
pub struct MapRow {
    pub key: i128,
    pub node: u64,
    pub value_address: Option<u64>,
    /// Rendered value for scalar values, empty otherwise
    pub value: String,
}

pub fn run<R: ReadMemory>(catalog: &TypeCatalog, reader: &R, args: &MapArgs) -> Result<()> {
    let layout = node_layout(catalog, args)?;
    let map = RemoteMap::new(reader, args.address, layout);

    if let Some(key) = args.find {
        let node = map.find(key)?;
        if node.node == map.end()?.node {
            println!("{} not found", key);
        } else {
            let row = row_for(catalog, reader, args.value.as_deref(), node.node, key, node.value_address());
            println!("{}", format_row(&row));
        }
        return Ok(());
    }

    let size = map.size()?;
    println!(
        "Map at {:#x}: {} entries (key +{:#x}, value {:?})",
        args.address,
        size,
        layout.key_offset,
        layout.value_offset
    );
    let rows = collect_rows(catalog, reader, args)?;
    for row in &rows {
        println!("{}", format_row(row));
    }
    if (rows.len() as u64) < size {
        println!("... {} more", size - rows.len() as u64);
    }
    Ok(())
}

/// In-order rows, at most `args.limit`
pub fn collect_rows<R: ReadMemory>(
    catalog: &TypeCatalog,
    reader: &R,
    args: &MapArgs,
) -> Result<Vec<MapRow>> {
    let layout = node_layout(catalog, args)?;
    let map = RemoteMap::new(reader, args.address, layout);

    let mut rows = Vec::new();
    for node in map.iter()?.take(args.limit) {
        let node = node?;
        let key = node.key(reader)?;
        rows.push(row_for(
            catalog,
            reader,
            args.value.as_deref(),
            node.node,
            key,
            node.value_address(),
        ));
    }
    Ok(rows)
}

fn node_layout(catalog: &TypeCatalog, args: &MapArgs) -> Result<NodeLayout> {
    NodeLayout::for_types(catalog, &args.key, args.value.as_deref())
        .with_context(|| format!("Unknown key or value type ({} / {:?})", args.key, args.value))
}

fn row_for<R: ReadMemory>(
    catalog: &TypeCatalog,
    reader: &R,
    value_type: Option<&str>,
    node: u64,
    key: i128,
    value_address: Option<u64>,
) -> MapRow {
    let scalar = value_type
        .and_then(|name| catalog.value_shape(name))
        .and_then(|shape| shape.kind.as_scalar());
    let value = match (value_address, scalar) {
        (Some(address), Some(scalar)) => read_scalar(reader, address, scalar)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| "<unreadable>".to_string()),
        _ => String::new(),
    };
    MapRow {
        key,
        node,
        value_address,
        value,
    }
}

fn format_row(row: &MapRow) -> String {
    match row.value_address {
        Some(address) => format!("  [{}] node {:#x} -> {:#x} {}", row.key, row.node, address, row.value)
            .trim_end()
            .to_string(),
        None => format!("  [{}] node {:#x}", row.key, row.node),
    }
}
