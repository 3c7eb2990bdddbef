use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::tree;
use crate::schema::{Scalar, ScalarRepr, TypeCatalog};

/// Walk limit for descents and climbs; a real tree is never this deep
const MAX_DESCENT: usize = 128;

/// First row of `table` whose alignment is >= `alignment`; the last row
/// when none is.
fn lookup_alignment_row(table: &[(u64, u64)], alignment: u8) -> u64 {
    let alignment = alignment.max(1) as u64;
    match table.iter().find(|(max, _)| alignment <= *max) {
        Some((_, value)) => *value,
        None => {
            warn!("Alignment {} exceeds the node layout table", alignment);
            table.last().map(|(_, value)| *value).unwrap_or(0)
        }
    }
}

/// Key offset within a tree node for the larger of the key and value
/// alignments.
pub fn key_offset_for_alignment(alignment: u8) -> u64 {
    lookup_alignment_row(tree::KEY_OFFSET_BY_ALIGNMENT, alignment)
}

/// Alignment the value is actually placed at; 3 behaves as 4 and 5 to 7
/// as 8.
pub fn value_alignment_bucket(alignment: u8) -> u64 {
    lookup_alignment_row(tree::VALUE_ALIGNMENT_BUCKETS, alignment).max(1)
}

fn round_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Where key and value sit inside one node of a particular map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    pub key_offset: u64,
    pub key_size: u64,
    /// Width and signedness used when comparing keys
    pub key_scalar: Scalar,
    /// `None` for sets
    pub value_offset: Option<u64>,
    pub value_size: u64,
}

impl NodeLayout {
    /// Layout for a map with the given key shape and optional value shape
    /// `(size, alignment)`.
    pub fn new(key_scalar: Scalar, key_size: u64, key_alignment: u8, value: Option<(u64, u8)>) -> Self {
        let value_alignment = value.map(|(_, align)| align).unwrap_or(1);
        let key_offset = key_offset_for_alignment(key_alignment.max(value_alignment));
        let key_end = key_offset + key_size;

        Self {
            key_offset,
            key_size,
            key_scalar,
            value_offset: value.map(|(_, align)| round_up(key_end, value_alignment_bucket(align))),
            value_size: value.map(|(size, _)| size).unwrap_or(0),
        }
    }

    /// Layout for a scalar-keyed map of scalars
    pub fn for_scalars(key: Scalar, value: Option<Scalar>) -> Self {
        Self::new(
            key,
            key.width as u64,
            key.width,
            value.map(|v| (v.width as u64, v.width)),
        )
    }

    /// Layout for schema type names. `None` if either name is unknown.
    pub fn for_types(catalog: &TypeCatalog, key_type: &str, value_type: Option<&str>) -> Option<Self> {
        let key = catalog.value_shape(key_type)?;
        let value = match value_type {
            Some(name) => Some(catalog.value_shape(name)?),
            None => None,
        };

        let key_scalar = key.kind.as_scalar().unwrap_or_else(|| {
            debug!("Non-scalar map key {}, comparing raw bytes", key_type);
            Scalar::new(key.size.clamp(1, 8) as u8, ScalarRepr::Unsigned)
        });
        Some(Self::new(
            key_scalar,
            key.size,
            key.alignment,
            value.map(|v| (v.size, v.alignment)),
        ))
    }
}

/// One tree node, addressed in the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHandle {
    pub node: u64,
    pub layout: NodeLayout,
}

impl TreeHandle {
    fn at(node: u64, layout: NodeLayout) -> Self {
        Self { node, layout }
    }

    pub fn key_address(&self) -> u64 {
        self.node.wrapping_add(self.layout.key_offset)
    }

    pub fn value_address(&self) -> Option<u64> {
        self.layout.value_offset.map(|offset| self.node.wrapping_add(offset))
    }

    pub fn left<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<Self> {
        Ok(Self::at(reader.read_ptr(self.node.wrapping_add(tree::NODE_LEFT))?, self.layout))
    }

    pub fn parent<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<Self> {
        Ok(Self::at(reader.read_ptr(self.node.wrapping_add(tree::NODE_PARENT))?, self.layout))
    }

    pub fn right<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<Self> {
        Ok(Self::at(reader.read_ptr(self.node.wrapping_add(tree::NODE_RIGHT))?, self.layout))
    }

    /// Red is 0, black is 1
    pub fn color<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<u8> {
        reader.read_u8(self.node.wrapping_add(tree::NODE_COLOR))
    }

    pub fn is_nil<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<bool> {
        Ok(reader.read_u8(self.node.wrapping_add(tree::NODE_IS_NIL))? != 0)
    }

    /// Key decoded with the map's declared width and signedness
    pub fn key<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<i128> {
        let scalar = self.layout.key_scalar;
        let bytes = reader.read_bytes(self.key_address(), scalar.width as usize)?;
        Ok(scalar.decode_integer(&bytes))
    }

    /// In-order successor. The sentinel is its own successor.
    pub fn successor<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<Self> {
        if self.is_nil(reader)? {
            return Ok(*self);
        }

        let right = self.right(reader)?;
        if !right.is_nil(reader)? {
            let mut current = right;
            for _ in 0..MAX_DESCENT {
                let left = current.left(reader)?;
                if left.is_nil(reader)? {
                    return Ok(current);
                }
                current = left;
            }
            return Err(Error::read_failed(self.node, "tree too deep below node"));
        }

        // Every nil child points at the sentinel
        let sentinel = right.node;
        let mut child = *self;
        let mut parent = self.parent(reader)?;
        for _ in 0..MAX_DESCENT {
            if parent.node == sentinel || parent.right(reader)?.node != child.node {
                return Ok(parent);
            }
            child = parent;
            parent = parent.parent(reader)?;
        }
        Err(Error::read_failed(self.node, "tree too deep above node"))
    }
}

/// An ordered map or set (red-black tree) at `base`
pub struct RemoteMap<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    base: u64,
    layout: NodeLayout,
}

impl<'a, R: ReadMemory + ?Sized> RemoteMap<'a, R> {
    pub fn new(reader: &'a R, base: u64, layout: NodeLayout) -> Self {
        Self {
            reader,
            base,
            layout,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    pub fn size(&self) -> Result<u64> {
        self.reader.read_u64(self.base.wrapping_add(tree::SIZE))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.begin()? == self.end()?)
    }

    /// The sentinel node
    pub fn end(&self) -> Result<TreeHandle> {
        Ok(TreeHandle::at(
            self.reader.read_ptr(self.base.wrapping_add(tree::HEAD))?,
            self.layout,
        ))
    }

    /// Smallest element, or `end()` when empty
    pub fn begin(&self) -> Result<TreeHandle> {
        self.end()?.left(self.reader)
    }

    pub fn root(&self) -> Result<TreeHandle> {
        self.end()?.parent(self.reader)
    }

    /// Largest element, or `end()` when empty
    pub fn last(&self) -> Result<TreeHandle> {
        self.end()?.right(self.reader)
    }

    /// Node holding `key`, or `end()` on a miss.
    pub fn find(&self, key: i128) -> Result<TreeHandle> {
        let end = self.end()?;
        let mut current = self.root()?;

        for _ in 0..MAX_DESCENT {
            if current.node == end.node {
                return Ok(end);
            }
            let node_key = current.key(self.reader)?;
            if node_key == key {
                return Ok(current);
            }
            current = if node_key > key {
                current.left(self.reader)?
            } else {
                current.right(self.reader)?
            };
        }

        warn!("Tree at {:#x} deeper than {}, giving up", self.base, MAX_DESCENT);
        Ok(end)
    }

    pub fn contains(&self, key: i128) -> Result<bool> {
        Ok(self.find(key)?.node != self.end()?.node)
    }

    /// Address of the value stored under `key`. `None` on a miss or for sets.
    pub fn value_address_of(&self, key: i128) -> Result<Option<u64>> {
        let found = self.find(key)?;
        if found.node == self.end()?.node {
            return Ok(None);
        }
        Ok(found.value_address())
    }

    pub fn successor(&self, node: TreeHandle) -> Result<TreeHandle> {
        node.successor(self.reader)
    }

    /// In-order iteration from `begin()` to `end()`.
    ///
    /// Stops after `size()` nodes even if the sentinel was never reached.
    pub fn iter(&self) -> Result<MapIter<'a, R>> {
        let end = self.end()?;
        Ok(MapIter {
            reader: self.reader,
            current: end.left(self.reader)?,
            end: end.node,
            remaining: self.size()?,
            failed: false,
        })
    }
}

pub struct MapIter<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    current: TreeHandle,
    end: u64,
    remaining: u64,
    failed: bool,
}

impl<R: ReadMemory + ?Sized> Iterator for MapIter<'_, R> {
    type Item = Result<TreeHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.current.node == self.end || self.remaining == 0 {
            return None;
        }
        let node = self.current;
        self.remaining -= 1;
        match node.successor(self.reader) {
            Ok(next) => self.current = next,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        }
        Some(Ok(node))
    }
}
