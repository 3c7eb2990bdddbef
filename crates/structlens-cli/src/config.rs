//! Tool configuration (`structlens.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use structlens_core::TableSignature;
use structlens_core::layout::DEFAULT_MAX_POINTER_DEPTH;
use structlens_core::memory::layout::timing;

use crate::commands::hex_utils::parse_hex_address;

pub const DEFAULT_CONFIG_PATH: &str = "structlens.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema: PathBuf,
    /// Raw memory dump used when no process is given
    pub snapshot: Option<PathBuf>,
    /// Load address of a sidecar-less snapshot, hex
    pub snapshot_base: Option<String>,
    pub process_name: String,
    pub refresh_interval_ms: u64,
    pub max_pointer_depth: usize,
    pub vtable: VTableConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: PathBuf::from("schema.json"),
            snapshot: None,
            snapshot_base: None,
            process_name: "Spel2.exe".to_string(),
            refresh_interval_ms: timing::DEFAULT_REFRESH_INTERVAL_MS,
            max_pointer_depth: DEFAULT_MAX_POINTER_DEPTH,
            vtable: VTableConfig::default(),
        }
    }
}

/// Where the slot table lives and what is already known about it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VTableConfig {
    /// Fixed table start, hex. Takes precedence over `signature`.
    pub table_start: Option<String>,
    pub slot_count: u32,
    pub signature: Option<TableSignature>,
    /// Region scanned for `signature`, hex; defaults to the main module
    pub scan_start: Option<String>,
    pub scan_len: Option<usize>,
    /// Known code addresses (hex) -> names, imported as auto symbols
    pub symbols: BTreeMap<String, String>,
}

impl VTableConfig {
    pub fn table_start(&self) -> Result<Option<u64>> {
        self.table_start.as_deref().map(parse_hex_address).transpose()
    }

    pub fn scan_start(&self) -> Result<Option<u64>> {
        self.scan_start.as_deref().map(parse_hex_address).transpose()
    }

    pub fn symbol_table(&self) -> Result<BTreeMap<u64, String>> {
        self.symbols
            .iter()
            .map(|(address, name)| Ok((parse_hex_address(address)?, name.clone())))
            .collect()
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn snapshot_base(&self) -> Result<Option<u64>> {
        self.snapshot_base.as_deref().map(parse_hex_address).transpose()
    }
}
