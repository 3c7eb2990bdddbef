//! Display strings for offset map entries.

use structlens_core::container::{NodeLayout, RemoteMap, RemoteString, RemoteVector};
use structlens_core::layout::{OffsetEntry, OffsetMap, ScalarValue, read_scalar};
use structlens_core::{ReadMemory, Scalar, ScalarRepr, TypeCatalog, TypeKind};

const UNRESOLVED: &str = "<unresolved>";
const UNREADABLE: &str = "<unreadable>";
/// Elements shown for scalar fixed arrays
const MAX_ARRAY_PREVIEW: usize = 16;

pub struct Renderer<'a, R: ReadMemory> {
    catalog: &'a TypeCatalog,
    reader: &'a R,
}

impl<'a, R: ReadMemory> Renderer<'a, R> {
    pub fn new(catalog: &'a TypeCatalog, reader: &'a R) -> Self {
        Self { catalog, reader }
    }

    /// Value of `entry`, empty for struct headers.
    pub fn render(&self, map: &OffsetMap, entry: &OffsetEntry) -> String {
        if entry.kind.struct_name().is_some() {
            return String::new();
        }
        if entry.address == 0 {
            return UNRESOLVED.to_string();
        }

        let (owner, field) = owner_of(map, &entry.path);
        match &entry.kind {
            TypeKind::Scalar(scalar) => self.scalar(entry.address, *scalar, &owner, field),
            TypeKind::PointerTo(_) | TypeKind::OwnedPointer(_) | TypeKind::VTable(_) => {
                match self.reader.read_ptr(entry.address) {
                    Ok(ptr) => format!("{:#x}", ptr),
                    Err(_) => UNREADABLE.to_string(),
                }
            }
            TypeKind::ForeignString(width) => {
                match RemoteString::new(self.reader, entry.address, *width).to_string_lossy() {
                    Ok(text) => format!("{:?}", text),
                    Err(_) => UNREADABLE.to_string(),
                }
            }
            TypeKind::DynamicArray(elem) => {
                let elem_size = self
                    .catalog
                    .value_shape(elem)
                    .map(|shape| shape.size)
                    .unwrap_or(0);
                match RemoteVector::new(self.reader, entry.address, elem_size).len() {
                    Ok(len) => format!("[{} x {}]", len, elem),
                    Err(_) => UNREADABLE.to_string(),
                }
            }
            TypeKind::OrderedMap { key, value } => {
                let Some(layout) = NodeLayout::for_types(self.catalog, key, value.as_deref()) else {
                    return "<unknown element type>".to_string();
                };
                match RemoteMap::new(self.reader, entry.address, layout).size() {
                    Ok(size) => format!("{} entries", size),
                    Err(_) => UNREADABLE.to_string(),
                }
            }
            TypeKind::FixedArray(elem, count) => match elem.as_scalar() {
                Some(scalar) => self.scalar_array(entry.address, scalar, *count),
                None => String::new(),
            },
            _ => String::new(),
        }
    }

    fn scalar(&self, address: u64, scalar: Scalar, owner: &str, field: &str) -> String {
        let value = match read_scalar(self.reader, address, scalar) {
            Ok(value) => value,
            Err(_) => return UNREADABLE.to_string(),
        };

        match (scalar.repr, value.as_i64()) {
            (ScalarRepr::Flags, Some(bits)) => {
                let set: Vec<String> = (0..scalar.width as i64 * 8)
                    .filter(|bit| bits & (1 << bit) != 0)
                    .map(|bit| {
                        let flag = bit + 1;
                        format!("{}:{}", flag, self.catalog.title_for_flag(owner, field, flag))
                    })
                    .collect();
                format!("{:#x} [{}]", bits, set.join(", "))
            }
            (ScalarRepr::State, Some(state)) => {
                format!("{} ({})", state, self.catalog.title_for_state(owner, field, state))
            }
            (ScalarRepr::ForeignId(table), _) => format!("{} ({})", value, table),
            _ => value.to_string(),
        }
    }

    fn scalar_array(&self, address: u64, scalar: Scalar, count: usize) -> String {
        let shown = count.min(MAX_ARRAY_PREVIEW);
        let mut parts: Vec<String> = (0..shown as u64)
            .map(|i| {
                read_scalar(self.reader, address + i * scalar.width as u64, scalar)
                    .map(|v: ScalarValue| v.to_string())
                    .unwrap_or_else(|_| UNREADABLE.to_string())
            })
            .collect();
        if count > shown {
            parts.push(format!("... {} more", count - shown));
        }
        format!("[{}]", parts.join(", "))
    }
}

/// Declaring type and field name of the leaf at `path`.
///
/// The parent entry's kind names the type; top-level fields fall back to
/// the parent path's last segment, which is the root type or class name.
pub fn owner_of<'p>(map: &OffsetMap, path: &'p str) -> (String, &'p str) {
    let Some((parent, field)) = path.rsplit_once('.') else {
        return (String::new(), path);
    };

    let from_kind = map.entry(parent).and_then(|entry| match &entry.kind {
        TypeKind::OwnedPointer(name) => Some(name.clone()),
        TypeKind::PointerTo(inner) => inner.struct_name().map(str::to_string),
        kind => kind.struct_name().map(str::to_string),
    });
    let owner = from_kind.unwrap_or_else(|| {
        parent
            .rsplit_once('.')
            .map(|(_, last)| last)
            .unwrap_or(parent)
            .to_string()
    });
    (owner, field)
}
