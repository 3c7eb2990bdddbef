//! Vtable command: query the slot address book.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use structlens_core::{ReadMemory, VTableDirectory, VTableEntry, locate_table};
use tracing::info;

use super::hex_utils::parse_hex_address;
use crate::config::VTableConfig;

#[derive(Subcommand, Debug, Clone)]
pub enum VTableCommand {
    /// Show the slot at an address, or the slots holding a code address
    Lookup {
        #[arg(value_parser = parse_hex_address)]
        address: u64,
    },
    /// Nearest user-labeled slot at or below a slot index
    Nearest { slot: u32 },
    /// Attach a name to the slot at an address (not persisted)
    Label {
        #[arg(value_parser = parse_hex_address)]
        slot_address: u64,
        name: String,
    },
    /// List named slots
    Named,
}

/// Load the table described by `config`. A configured `table_start` wins;
/// otherwise the signature is scanned for in the configured region or
/// `default_region`.
pub fn load_directory<R: ReadMemory>(
    reader: &R,
    config: &VTableConfig,
    default_region: Option<(u64, usize)>,
) -> Result<VTableDirectory> {
    let table_start = match (config.table_start()?, &config.signature) {
        (Some(start), _) => start,
        (None, Some(signature)) => {
            let (start, len) = match (config.scan_start()?, config.scan_len) {
                (Some(start), Some(len)) => (start, len),
                _ => default_region.context("No scan region for the vtable signature")?,
            };
            let table = locate_table(reader, start, len, signature)?;
            info!("Located vtable directory at {:#x}", table);
            table
        }
        (None, None) => bail!("Set [vtable] table_start or [vtable.signature] in the config"),
    };

    let symbols = config.symbol_table()?;
    let mut directory = VTableDirectory::new();
    directory.load(reader, table_start, config.slot_count, &symbols)?;
    Ok(directory)
}

pub fn run(directory: &mut VTableDirectory, command: &VTableCommand) -> Result<()> {
    for line in execute(directory, command) {
        println!("{}", line);
    }
    Ok(())
}

pub fn execute(directory: &mut VTableDirectory, command: &VTableCommand) -> Vec<String> {
    match command {
        VTableCommand::Lookup { address } => {
            if let Some(slot) = directory.slot_for_address(*address) {
                return vec![format_entry(directory, directory.entry_at(slot))];
            }
            let slots = directory.slots_for_function_address(*address);
            if slots.is_empty() {
                return vec![format!("{:#x} is neither a slot nor a slot target", address)];
            }
            slots
                .into_iter()
                .map(|slot| format_entry(directory, directory.entry_at(slot)))
                .collect()
        }
        VTableCommand::Nearest { slot } => {
            let entry = directory.nearest_labeled_predecessor(*slot);
            if entry.is_empty() {
                vec![format!("No labeled slot at or below {}", slot)]
            } else {
                vec![format_entry(directory, entry)]
            }
        }
        VTableCommand::Label { slot_address, name } => {
            if !directory.attach_symbol(*slot_address, name) {
                return vec![format!("{:#x} is not a slot of the table", slot_address)];
            }
            match directory.slot_for_address(*slot_address) {
                Some(slot) => vec![format_entry(directory, directory.entry_at(slot))],
                None => Vec::new(),
            }
        }
        VTableCommand::Named => directory
            .entries()
            .iter()
            .filter(|entry| !entry.symbols.is_empty())
            .map(|entry| format_entry(directory, entry))
            .collect(),
    }
}

fn format_entry(directory: &VTableDirectory, entry: &VTableEntry) -> String {
    let names: Vec<&str> = entry.symbols.iter().map(String::as_str).collect();
    let mut line = format!(
        "slot {} @ {:#x} -> {:#x}",
        entry.slot,
        directory.address_of_slot(entry),
        entry.value
    );
    if !entry.is_valid_address {
        line.push_str(" (not code)");
    }
    if !names.is_empty() {
        line.push_str(&format!(" [{}]", names.join(", ")));
        if entry.is_auto_imported {
            line.push_str(" (imported)");
        }
    }
    line
}
