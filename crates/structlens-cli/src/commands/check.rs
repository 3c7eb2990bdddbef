//! Check command: validate a schema document.

use std::path::Path;

use anyhow::{Context, Result};
use structlens_core::TypeCatalog;

pub fn run(schema: &Path) -> Result<()> {
    let catalog = TypeCatalog::from_file(schema)
        .with_context(|| format!("Schema {} rejected", schema.display()))?;

    println!("Schema OK: {}", schema.display());
    println!("  structs:        {}", catalog.struct_count());
    println!("  entity classes: {}", catalog.entity_class_count());
    println!("  class rules:    {}", catalog.class_rule_count());
    Ok(())
}
