//! Memory source selection: a dump on disk or a live process.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use structlens_core::{ReadMemory, SnapshotReader};
use tracing::debug;

#[cfg(target_os = "windows")]
use structlens_core::{MemoryReader, ProcessHandle};

use crate::config::Config;

/// Source options given on the command line
#[derive(Debug, Clone, Default)]
pub struct SourceArgs {
    pub snapshot: Option<PathBuf>,
    pub base: Option<u64>,
    pub pid: Option<u32>,
    pub attach: bool,
}

pub enum Source {
    Snapshot(SnapshotReader),
    #[cfg(target_os = "windows")]
    Live(ProcessHandle),
}

impl Source {
    pub fn open(args: &SourceArgs, config: &Config) -> Result<Self> {
        if args.pid.is_some() || args.attach {
            return Self::open_live(args, config);
        }

        let Some(path) = args.snapshot.clone().or_else(|| config.snapshot.clone()) else {
            bail!("No memory source: pass --snapshot, --pid or --attach, or set `snapshot` in the config");
        };
        let base = match args.base {
            Some(base) => Some(base),
            None => config.snapshot_base()?,
        };

        let reader = match base {
            Some(base) => SnapshotReader::open_at(&path, base),
            None => SnapshotReader::open(&path),
        }
        .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
        debug!("Snapshot base {:#x}", reader.base_address());
        Ok(Source::Snapshot(reader))
    }

    #[cfg(target_os = "windows")]
    fn open_live(args: &SourceArgs, config: &Config) -> Result<Self> {
        let process = match args.pid {
            Some(pid) => ProcessHandle::open(pid)?,
            None => ProcessHandle::find_by_name(&config.process_name)?,
        };
        tracing::info!(
            "Attached to PID {} (base: {:#x})",
            process.pid, process.base_address
        );
        Ok(Source::Live(process))
    }

    #[cfg(not(target_os = "windows"))]
    fn open_live(_args: &SourceArgs, _config: &Config) -> Result<Self> {
        bail!("Live process access is only available on Windows")
    }

    /// Region a signature scan covers when none is configured
    pub fn default_scan_region(&self) -> Option<(u64, usize)> {
        match self {
            Source::Snapshot(reader) => reader
                .regions()
                .first()
                .map(|region| (region.start, region.size() as usize)),
            #[cfg(target_os = "windows")]
            Source::Live(process) => Some((process.base_address, process.module_size as usize)),
        }
    }
}

impl ReadMemory for Source {
    fn read_bytes(&self, address: u64, size: usize) -> structlens_core::Result<Vec<u8>> {
        match self {
            Source::Snapshot(reader) => reader.read_bytes(address, size),
            #[cfg(target_os = "windows")]
            Source::Live(process) => MemoryReader::new(process).read_bytes(address, size),
        }
    }

    fn is_valid_pointer(&self, address: u64) -> bool {
        match self {
            Source::Snapshot(reader) => reader.is_valid_pointer(address),
            #[cfg(target_os = "windows")]
            Source::Live(process) => MemoryReader::new(process).is_valid_pointer(address),
        }
    }
}
