//! Chain command: class chain and virtual functions of an entity.

use anyhow::Result;
use clap::Args;
use structlens_core::{
    ReadMemory, ResolvedFunction, TypeCatalog, VTableDirectory, VirtualFunction,
    resolve_virtual_functions,
};

use super::hex_utils::parse_hex_address;

#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    /// Entity name (or class name with --class)
    pub name: String,

    /// Treat NAME as a class rather than an entity name
    #[arg(long)]
    pub class: bool,

    /// Live object whose vtable should be resolved (hex)
    #[arg(long, value_parser = parse_hex_address)]
    pub addr: Option<u64>,
}

pub fn chain_for(catalog: &TypeCatalog, args: &ChainArgs) -> Vec<String> {
    if args.class {
        catalog.ancestors_of(&args.name)
    } else {
        catalog.class_chain_of(&args.name)
    }
}

/// Chain and declared functions, no memory access
pub fn describe(catalog: &TypeCatalog, args: &ChainArgs) -> Vec<String> {
    let chain = chain_for(catalog, args);
    let mut lines = vec![chain.join(" -> ")];

    let Some(leaf) = chain.last() else {
        return lines;
    };
    for function in catalog.virtual_functions_of(leaf) {
        lines.push(format!("  {}", signature(function)));
    }
    lines
}

/// Declared functions resolved against the object at `address`
pub fn describe_resolved<R: ReadMemory>(
    catalog: &TypeCatalog,
    reader: &R,
    address: u64,
    args: &ChainArgs,
    directory: &VTableDirectory,
) -> Result<Vec<String>> {
    let chain = chain_for(catalog, args);
    let mut lines = vec![chain.join(" -> ")];

    let functions = match chain.last() {
        Some(leaf) => catalog.virtual_functions_of(leaf),
        None => Vec::new(),
    };
    let resolved = resolve_virtual_functions(reader, address, &functions, directory)?;
    lines.extend(resolved.iter().map(format_resolved));
    Ok(lines)
}

fn signature(function: &VirtualFunction) -> String {
    format!(
        "[{}] {} {}::{}({})",
        function.index, function.return_type, function.owner, function.name, function.params
    )
}

fn format_resolved(resolved: &ResolvedFunction) -> String {
    let mut line = format!(
        "  {}  slot {:#x} -> {:#x}",
        signature(&resolved.function),
        resolved.slot_address,
        resolved.code_address
    );
    if let Some(slot) = resolved.table_slot {
        line.push_str(&format!(" (table slot {})", slot));
    }
    if !resolved.symbols.is_empty() {
        line.push_str(&format!(" [{}]", resolved.symbols.join(", ")));
    }
    line
}
