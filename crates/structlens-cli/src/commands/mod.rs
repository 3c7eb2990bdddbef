//! CLI command implementations.

pub mod chain;
pub mod check;
pub mod hex_utils;
pub mod hexdump;
pub mod map;
pub mod offsets;
pub mod render;
pub mod string;
pub mod vector;
pub mod vtable;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use structlens_core::{LayoutOptions, TypeCatalog};

use crate::config::Config;
use crate::source::{Source, SourceArgs};

/// Configuration merged with command-line overrides
pub struct Session {
    pub config: Config,
    pub schema: PathBuf,
    pub source: SourceArgs,
}

impl Session {
    pub fn new(config: Config, schema: Option<PathBuf>, source: SourceArgs) -> Self {
        let schema = schema.unwrap_or_else(|| config.schema.clone());
        Self {
            config,
            schema,
            source,
        }
    }

    pub fn load_catalog(&self) -> Result<TypeCatalog> {
        TypeCatalog::from_file(&self.schema)
            .with_context(|| format!("Failed to load schema {}", self.schema.display()))
    }

    pub fn open_source(&self) -> Result<Source> {
        Source::open(&self.source, &self.config)
    }

    pub fn layout_options(&self) -> LayoutOptions {
        LayoutOptions::builder()
            .max_pointer_depth(self.config.max_pointer_depth)
            .build()
    }
}
