//! Watch command: refresh a view periodically and print what changed.
//!
//! The schema file is polled alongside; when it changes the catalog is
//! reloaded and the view rebuilt. A schema that fails to load leaves the
//! previous catalog in use.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use clap::Args;
use structlens_core::{LayoutEngine, LayoutOptions, ObjectView, ReadMemory, SharedCatalog};
use tracing::{info, warn};

use super::hex_utils::parse_hex_address;
use super::offsets::build_view;
use super::render::Renderer;
use crate::shutdown::ShutdownSignal;

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Struct type or entity class, or an entity name with --entity
    pub target: String,

    /// Object address (hex)
    #[arg(value_parser = parse_hex_address)]
    pub address: u64,

    #[arg(long)]
    pub entity: bool,

    /// Refresh interval; defaults to the config's `refresh_interval_ms`
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Stop after this many refreshes
    #[arg(long)]
    pub count: Option<usize>,
}

/// Detects modification of a file by its timestamp
pub struct SchemaWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl SchemaWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_modified: modified(path),
        }
    }

    /// True once per observed change
    pub fn changed(&mut self) -> bool {
        let current = modified(&self.path);
        if current.is_some() && current != self.last_modified {
            self.last_modified = current;
            return true;
        }
        false
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

pub fn run<R: ReadMemory>(
    shared: &SharedCatalog,
    schema: &Path,
    reader: &R,
    options: LayoutOptions,
    args: &WatchArgs,
    interval: Duration,
    signal: &ShutdownSignal,
) -> Result<()> {
    let mut watcher = SchemaWatcher::new(schema);
    let catalog = shared.snapshot();
    let mut view = build_view(&catalog, &args.target, args.address, args.entity)?;
    let mut previous = BTreeMap::new();
    let mut refreshes = 0usize;

    info!("Watching {} at {:#x} every {:?}", args.target, args.address, interval);
    loop {
        if watcher.changed() && shared.reload_from_file(schema).is_ok() {
            info!("Schema {} reloaded", schema.display());
            match build_view(&shared.snapshot(), &args.target, args.address, args.entity) {
                Ok(rebuilt) => view = rebuilt,
                Err(e) => warn!("Keeping previous view: {:#}", e),
            }
        }

        match sample(shared, reader, options, &view) {
            Ok(current) => {
                for line in changed_lines(&previous, &current) {
                    println!("{}", line);
                }
                previous = current;
            }
            Err(e) => warn!("Refresh failed: {}", e),
        }

        refreshes += 1;
        if args.count.is_some_and(|count| refreshes >= count) {
            break;
        }
        if signal.wait(interval) {
            info!("Stopping watch");
            break;
        }
    }
    Ok(())
}

/// Rendered value of every leaf, by path
pub fn sample<R: ReadMemory>(
    shared: &SharedCatalog,
    reader: &R,
    options: LayoutOptions,
    view: &ObjectView,
) -> structlens_core::Result<BTreeMap<String, String>> {
    let catalog = shared.snapshot();
    let engine = LayoutEngine::with_options(&catalog, reader, options);
    let snapshot = view.refresh(&engine)?;
    let renderer = Renderer::new(&catalog, reader);

    Ok(snapshot
        .offsets
        .iter()
        .filter(|entry| entry.kind.struct_name().is_none())
        .map(|entry| (entry.path.clone(), renderer.render(&snapshot.offsets, entry)))
        .collect())
}

/// `path: old -> new` for each value that differs; new paths show alone.
pub fn changed_lines(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> Vec<String> {
    current
        .iter()
        .filter_map(|(path, value)| match previous.get(path) {
            Some(old) if old == value => None,
            Some(old) => Some(format!("{}: {} -> {}", path, old, value)),
            None => Some(format!("{}: {}", path, value)),
        })
        .collect()
}
