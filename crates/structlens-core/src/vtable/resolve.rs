use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::layout::vtable;
use crate::memory::{ReadMemory, parse_pattern};
use crate::schema::VirtualFunction;
use crate::vtable::VTableDirectory;

/// Code signature whose RIP-relative operand points at the start of the
/// vtable region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSignature {
    pub pattern: String,
    /// Offset of the referencing instruction inside the match
    #[serde(default)]
    pub instr_offset: usize,
    /// Offset of the 32-bit displacement inside the instruction
    pub disp_offset: usize,
    pub instr_len: usize,
}

/// Find the table start by scanning `[start, start + len)` for `signature`.
pub fn locate_table<R: ReadMemory + ?Sized>(
    reader: &R,
    start: u64,
    len: usize,
    signature: &TableSignature,
) -> Result<u64> {
    let pattern = parse_pattern(&signature.pattern)?;
    let Some(match_addr) = reader.find_pattern(start, len, &pattern)? else {
        return Err(Error::VTableLoadFailed(format!(
            "signature `{}` not found",
            signature.pattern
        )));
    };

    let instr_addr = match_addr.wrapping_add(signature.instr_offset as u64);
    let disp = reader.read_i32(instr_addr.wrapping_add(signature.disp_offset as u64))?;
    let next_ip = instr_addr.wrapping_add(signature.instr_len as u64);
    let target = next_ip.wrapping_add_signed(disp as i64);
    debug!(
        "Table signature matched at {:#x}, table at {:#x}",
        match_addr, target
    );
    Ok(target)
}

/// A declared virtual function resolved against a live object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFunction {
    pub function: VirtualFunction,
    /// Address of the slot in the object's vtable
    pub slot_address: u64,
    /// Code pointer stored in the slot
    pub code_address: u64,
    /// Slot index in the directory, when the vtable lies inside it
    pub table_slot: Option<u32>,
    pub symbols: Vec<String>,
}

/// Read the vtable pointer at `object_address` and resolve each declared
/// function to its slot, code address and known names.
pub fn resolve_virtual_functions<R: ReadMemory + ?Sized>(
    reader: &R,
    object_address: u64,
    functions: &[&VirtualFunction],
    directory: &VTableDirectory,
) -> Result<Vec<ResolvedFunction>> {
    let table = reader.read_ptr(object_address)?;

    functions
        .iter()
        .map(|function| {
            let slot_address = table.wrapping_add(function.index as u64 * vtable::SLOT_SIZE);
            let code_address = reader.read_ptr(slot_address)?;
            let table_slot = directory.slot_for_address(slot_address);
            let symbols = match table_slot {
                Some(slot) => directory.entry_at(slot).symbols.iter().cloned().collect(),
                None => Vec::new(),
            };
            Ok(ResolvedFunction {
                function: (*function).clone(),
                slot_address,
                code_address,
                table_slot,
                symbols,
            })
        })
        .collect()
}
