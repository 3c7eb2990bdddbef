//! Offsets command: lay out a type at an address and show every field.

use anyhow::{Result, bail};
use clap::Args;
use structlens_core::{
    FieldDifference, LayoutEngine, LayoutOptions, ObjectView, ReadMemory, TypeCatalog,
    ViewSnapshot,
};
use tracing::warn;

use super::hex_utils::{format_bytes, parse_hex_address};
use super::render::Renderer;

#[derive(Args, Debug, Clone)]
pub struct OffsetsArgs {
    /// Struct type or entity class, or an entity name with --entity
    pub target: String,

    /// Object address (hex)
    #[arg(value_parser = parse_hex_address)]
    pub address: u64,

    /// Treat TARGET as an entity name and pick its class from the schema rules
    #[arg(long)]
    pub entity: bool,

    /// Second object of the same type to diff against (hex)
    #[arg(long, value_parser = parse_hex_address)]
    pub compare: Option<u64>,

    /// Print `address name` debugger labels instead of values
    #[arg(long)]
    pub labels: bool,

    /// Print the raw offset map as JSON
    #[arg(long, conflicts_with = "labels")]
    pub json: bool,
}

pub fn run<R: ReadMemory>(
    catalog: &TypeCatalog,
    reader: &R,
    options: LayoutOptions,
    args: &OffsetsArgs,
) -> Result<()> {
    let view = build_view(catalog, &args.target, args.address, args.entity)?;
    let view = match args.compare {
        Some(other) => view.with_comparison(other),
        None => view,
    };
    let engine = LayoutEngine::with_options(catalog, reader, options);
    let snapshot = view.refresh(&engine)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    if args.labels {
        for (address, name) in snapshot.offsets.labels("") {
            println!("{:#x} {}", address, name);
        }
        return Ok(());
    }

    for line in render_snapshot(catalog, reader, &snapshot) {
        println!("{}", line);
    }
    Ok(())
}

/// View of `target` at `address`: an entity name when `entity` is set,
/// otherwise a class or struct type name.
pub fn build_view(
    catalog: &TypeCatalog,
    target: &str,
    address: u64,
    entity: bool,
) -> Result<ObjectView> {
    if entity {
        if catalog.class_for_entity_name(target).is_none() {
            warn!("No class rule matches {}, using the root class", target);
        }
        return Ok(ObjectView::for_entity(address, catalog, target));
    }
    if catalog.is_entity_class(target) {
        return Ok(ObjectView::for_class(address, catalog, target));
    }
    if catalog.resolve_type(target).is_none() {
        bail!("Unknown type {}", target);
    }
    Ok(ObjectView::for_struct(address, target))
}

/// One line per field, indented by nesting, followed by any differences.
pub fn render_snapshot<R: ReadMemory>(
    catalog: &TypeCatalog,
    reader: &R,
    snapshot: &ViewSnapshot,
) -> Vec<String> {
    let renderer = Renderer::new(catalog, reader);
    let mut lines: Vec<String> = snapshot
        .offsets
        .iter()
        .map(|entry| {
            let depth = entry.path.matches('.').count();
            let value = renderer.render(&snapshot.offsets, entry);
            format!("{:#014x}  {}{}  {}", entry.address, "  ".repeat(depth), entry.path, value)
                .trim_end()
                .to_string()
        })
        .collect();

    if snapshot.comparison.is_some() {
        lines.push(String::new());
        lines.push(format!("Differences: {}", snapshot.differences.len()));
        lines.extend(snapshot.differences.iter().map(format_difference));
    }
    lines
}

fn format_difference(diff: &FieldDifference) -> String {
    let show = |bytes: &Option<Vec<u8>>| match bytes {
        Some(bytes) => format_bytes(bytes),
        None => "<unreadable>".to_string(),
    };
    format!("  {}: {} -> {}", diff.path, show(&diff.primary), show(&diff.other))
}
