use serde::Serialize;

use crate::layout::OffsetMap;
use crate::memory::ReadMemory;
use crate::schema::{TypeCatalog, TypeKind};

/// Prefix of the parallel offset map computed for a comparison object
pub const COMPARISON_PREFIX: &str = "comparison";

/// A leaf whose bytes differ between two same-shaped objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDifference {
    pub path: String,
    pub primary_address: u64,
    pub other_address: u64,
    /// `None` when the side could not be read
    pub primary: Option<Vec<u8>>,
    pub other: Option<Vec<u8>>,
}

/// Join two offset maps by path and report every scalar or pointer leaf
/// whose bytes differ.
///
/// Paths in `other` may carry the [`COMPARISON_PREFIX`].
pub fn compare<R: ReadMemory>(
    reader: &R,
    catalog: &TypeCatalog,
    primary: &OffsetMap,
    other: &OffsetMap,
) -> Vec<FieldDifference> {
    let mut differences = Vec::new();

    for entry in primary {
        if !is_leaf(&entry.kind) {
            continue;
        }
        let Some(counterpart) = other
            .entry(&entry.path)
            .or_else(|| other.entry(&format!("{}.{}", COMPARISON_PREFIX, entry.path)))
        else {
            continue;
        };

        let size = catalog.size_of(&entry.kind) as usize;
        let read = |address: u64| {
            if address == 0 {
                None
            } else {
                reader.read_bytes(address, size).ok()
            }
        };
        let primary_bytes = read(entry.address);
        let other_bytes = read(counterpart.address);

        if primary_bytes != other_bytes {
            differences.push(FieldDifference {
                path: entry.path.clone(),
                primary_address: entry.address,
                other_address: counterpart.address,
                primary: primary_bytes,
                other: other_bytes,
            });
        }
    }

    differences
}

fn is_leaf(kind: &TypeKind) -> bool {
    match kind {
        TypeKind::Scalar(_)
        | TypeKind::PointerTo(_)
        | TypeKind::OwnedPointer(_)
        | TypeKind::VTable(_) => true,
        TypeKind::FixedArray(elem, _) => elem.is_scalar(),
        _ => false,
    }
}
