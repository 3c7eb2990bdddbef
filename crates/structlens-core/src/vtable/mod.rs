//! Address book over the target's flat table of virtual function slots.

mod resolve;

pub use resolve::{ResolvedFunction, TableSignature, locate_table, resolve_virtual_functions};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::vtable;

/// Names already known for code addresses, e.g. from a debugger's symbol
/// database. Entries loaded from here are marked auto-imported.
pub trait SymbolSource {
    fn symbol_at(&self, address: u64) -> Option<&str>;
}

/// No pre-existing symbols
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolSource for NoSymbols {
    fn symbol_at(&self, _address: u64) -> Option<&str> {
        None
    }
}

impl SymbolSource for HashMap<u64, String> {
    fn symbol_at(&self, address: u64) -> Option<&str> {
        self.get(&address).map(String::as_str)
    }
}

impl SymbolSource for BTreeMap<u64, String> {
    fn symbol_at(&self, address: u64) -> Option<&str> {
        self.get(&address).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VTableEntry {
    /// Index of the slot in the table
    pub slot: u32,
    /// Raw pointer stored in the slot
    pub value: u64,
    pub is_valid_address: bool,
    /// Name came from the [`SymbolSource`] at load time
    pub is_auto_imported: bool,
    pub symbols: BTreeSet<String>,
}

impl VTableEntry {
    pub const EMPTY: VTableEntry = VTableEntry {
        slot: 0,
        value: 0,
        is_valid_address: false,
        is_auto_imported: false,
        symbols: BTreeSet::new(),
    };

    pub fn is_empty(&self) -> bool {
        self == &Self::EMPTY
    }
}

static EMPTY_ENTRY: VTableEntry = VTableEntry::EMPTY;

#[derive(Debug, Default)]
pub struct VTableDirectory {
    table_start: u64,
    entries: Vec<VTableEntry>,
}

impl VTableDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `slot_count` slots starting at `table_start` in one go.
    ///
    /// On failure the previous contents are kept.
    pub fn load<R: ReadMemory + ?Sized>(
        &mut self,
        reader: &R,
        table_start: u64,
        slot_count: u32,
        symbols: &dyn SymbolSource,
    ) -> Result<()> {
        if table_start == 0 || slot_count == 0 {
            return Err(Error::VTableLoadFailed(format!(
                "empty table at {:#x} ({} slots)",
                table_start, slot_count
            )));
        }

        let size = slot_count as u64 * vtable::SLOT_SIZE;
        let raw = reader
            .read_bytes(table_start, size as usize)
            .map_err(|e| Error::VTableLoadFailed(e.to_string()))?;

        let mut entries = Vec::with_capacity(slot_count as usize);
        let mut imported = 0usize;
        for (slot, chunk) in raw.chunks_exact(vtable::SLOT_SIZE as usize).enumerate() {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            let value = u64::from_le_bytes(bytes);
            let is_valid_address = reader.is_valid_pointer(value);

            let mut entry = VTableEntry {
                slot: slot as u32,
                value,
                is_valid_address,
                is_auto_imported: false,
                symbols: BTreeSet::new(),
            };
            if is_valid_address && let Some(name) = symbols.symbol_at(value) {
                entry.symbols.insert(name.to_string());
                entry.is_auto_imported = true;
                imported += 1;
            }
            entries.push(entry);
        }

        info!(
            "Loaded vtable directory at {:#x}: {} slots, {} auto-imported symbols",
            table_start, slot_count, imported
        );
        self.table_start = table_start;
        self.entries = entries;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn table_start(&self) -> u64 {
        self.table_start
    }

    pub fn reset(&mut self) {
        self.table_start = 0;
        self.entries.clear();
    }

    pub fn entries(&self) -> &[VTableEntry] {
        &self.entries
    }

    /// Entry for `slot`, or [`VTableEntry::EMPTY`] when out of range or
    /// unloaded.
    pub fn entry_at(&self, slot: u32) -> &VTableEntry {
        self.entries.get(slot as usize).unwrap_or(&EMPTY_ENTRY)
    }

    /// Absolute address of the slot holding `entry`; 0 when unloaded.
    pub fn address_of_slot(&self, entry: &VTableEntry) -> u64 {
        if !self.is_loaded() {
            return 0;
        }
        self.table_start + entry.slot as u64 * vtable::SLOT_SIZE
    }

    /// Slot whose address is exactly `address`
    pub fn slot_for_address(&self, address: u64) -> Option<u32> {
        if !self.is_loaded() || address < self.table_start {
            return None;
        }
        let delta = address - self.table_start;
        if delta % vtable::SLOT_SIZE != 0 {
            return None;
        }
        let slot = delta / vtable::SLOT_SIZE;
        (slot < self.entries.len() as u64).then_some(slot as u32)
    }

    /// Every slot holding `function_address`, in slot order.
    pub fn slots_for_function_address(&self, function_address: u64) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|entry| entry.value == function_address)
            .map(|entry| entry.slot)
            .collect()
    }

    /// Add `name` to the slot at `slot_address`. Returns false when the
    /// address is not a slot of the loaded table.
    ///
    /// Purely additive: an auto-imported slot stays auto-imported.
    pub fn attach_symbol(&mut self, slot_address: u64, name: &str) -> bool {
        let Some(slot) = self.slot_for_address(slot_address) else {
            warn!("No vtable slot at {:#x}", slot_address);
            return false;
        };
        let entry = &mut self.entries[slot as usize];
        if entry.symbols.insert(name.to_string()) {
            debug!("Labeled slot {} as {}", slot, name);
        }
        true
    }

    /// Closest entry at or below `slot` that points at code and carries a
    /// name given by the user. Slot 0 is never examined.
    pub fn nearest_labeled_predecessor(&self, slot: u32) -> &VTableEntry {
        let start = (slot as usize).min(self.entries.len().saturating_sub(1));
        (1..=start)
            .rev()
            .map(|i| &self.entries[i])
            .find(|entry| {
                entry.is_valid_address && !entry.is_auto_imported && !entry.symbols.is_empty()
            })
            .unwrap_or(&EMPTY_ENTRY)
    }
}
