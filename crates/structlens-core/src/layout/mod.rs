//! Field-path -> address computation.
//!
//! Offsets are derived from declaration order and from pointers read out of
//! the target while walking, so every computation performs remote reads and
//! its result is only valid for the moment it was taken. Nothing here is
//! cached between calls.

mod compare;
mod offsets;
mod value;
mod view;

pub use compare::{COMPARISON_PREFIX, FieldDifference, compare};
pub use offsets::{OffsetEntry, OffsetMap};
pub use value::{ScalarValue, read_scalar};
pub use view::{ObjectView, RefreshGate, RefreshTicket, ViewSnapshot, ViewTarget};

use tracing::debug;

use crate::memory::ReadMemory;
use crate::schema::{FieldSelector, FieldSpec, TypeCatalog, TypeKind};
use offsets::join_path;

pub const DEFAULT_MAX_POINTER_DEPTH: usize = 8;

/// Options for [`LayoutEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Maximum number of nested pointer follows. Past it only the pointer's
    /// own path is recorded.
    pub max_pointer_depth: usize,
    /// Follow `PointerTo` / owned pointers at all
    pub follow_pointers: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            max_pointer_depth: DEFAULT_MAX_POINTER_DEPTH,
            follow_pointers: true,
        }
    }
}

impl LayoutOptions {
    pub fn builder() -> LayoutOptionsBuilder {
        LayoutOptionsBuilder::default()
    }
}

/// Builder for LayoutOptions
#[derive(Debug, Clone, Default)]
pub struct LayoutOptionsBuilder {
    max_pointer_depth: Option<usize>,
    follow_pointers: Option<bool>,
}

impl LayoutOptionsBuilder {
    pub fn max_pointer_depth(mut self, depth: usize) -> Self {
        self.max_pointer_depth = Some(depth);
        self
    }

    pub fn follow_pointers(mut self, enabled: bool) -> Self {
        self.follow_pointers = Some(enabled);
        self
    }

    pub fn build(self) -> LayoutOptions {
        let default = LayoutOptions::default();
        LayoutOptions {
            max_pointer_depth: self.max_pointer_depth.unwrap_or(default.max_pointer_depth),
            follow_pointers: self.follow_pointers.unwrap_or(default.follow_pointers),
        }
    }
}

/// Walks schema fields against live memory.
pub struct LayoutEngine<'a, R: ReadMemory> {
    catalog: &'a TypeCatalog,
    reader: &'a R,
    options: LayoutOptions,
}

impl<'a, R: ReadMemory> LayoutEngine<'a, R> {
    pub fn new(catalog: &'a TypeCatalog, reader: &'a R) -> Self {
        Self::with_options(catalog, reader, LayoutOptions::default())
    }

    pub fn with_options(catalog: &'a TypeCatalog, reader: &'a R, options: LayoutOptions) -> Self {
        Self {
            catalog,
            reader,
            options,
        }
    }

    pub fn catalog(&self) -> &'a TypeCatalog {
        self.catalog
    }

    pub fn reader(&self) -> &'a R {
        self.reader
    }

    pub fn options(&self) -> LayoutOptions {
        self.options
    }

    /// Lay out `fields` starting at `root`, recording paths under `prefix`.
    ///
    /// Pointers are dereferenced as they are met; an unreadable pointer
    /// counts as 0. A root of 0 yields 0 for every path.
    pub fn compute_offsets(&self, root: u64, prefix: &str, fields: &[FieldSpec]) -> OffsetMap {
        let mut map = OffsetMap::new();
        self.walk_fields(root, prefix, fields, 0, &mut map);
        map
    }

    /// Lay out a named type at `root`. Structs are recorded under their type
    /// name; entity classes walk their whole chain.
    pub fn compute_type_offsets(&self, root: u64, type_name: &str) -> OffsetMap {
        if self.catalog.is_entity_class(type_name) {
            let chain = self.catalog.ancestors_of(type_name);
            return self.compute_entity_offsets(root, &chain);
        }

        let fields: &[FieldSpec] = match self.catalog.resolve_type(type_name) {
            Some(kind) => self.catalog.struct_fields(&kind),
            None => {
                debug!("Unknown root type {}", type_name);
                &[]
            }
        };
        self.compute_offsets(root, type_name, fields)
    }

    /// Lay out an entity whose class chain (root first) is `chain`.
    ///
    /// Each class records a header entry under its own name, then its fields
    /// as `Class.field`; the next class continues where the previous ended.
    pub fn compute_entity_offsets(&self, root: u64, chain: &[String]) -> OffsetMap {
        self.compute_entity_offsets_under(root, "", chain)
    }

    pub fn compute_entity_offsets_under(&self, root: u64, prefix: &str, chain: &[String]) -> OffsetMap {
        let mut map = OffsetMap::new();
        self.walk_chain(root, prefix, chain, 0, &mut map);
        map
    }

    fn walk_fields(
        &self,
        base: u64,
        prefix: &str,
        fields: &[FieldSpec],
        depth: usize,
        map: &mut OffsetMap,
    ) -> u64 {
        let mut offset = 0;
        let mut end = 0;
        for field in fields {
            let start = field.declared_offset.unwrap_or(offset);
            let path = join_path(prefix, &field.name);
            self.place(&field.kind, &path, at(base, start), depth, map);
            offset = start + self.catalog.size_of(&field.kind);
            end = end.max(offset);
        }
        end
    }

    fn walk_chain(&self, base: u64, prefix: &str, chain: &[String], depth: usize, map: &mut OffsetMap) {
        let mut offset = 0;
        for class in chain {
            let class_path = join_path(prefix, class);
            let class_base = at(base, offset);
            map.insert(
                class_path.as_str(),
                class_base,
                TypeKind::EntitySubclass(class.clone()),
            );
            let fields = self.catalog.fields_of(FieldSelector::EntitySubclass(class));
            offset += self.walk_fields(class_base, &class_path, fields, depth, map);
        }
    }

    fn place(&self, kind: &TypeKind, path: &str, address: u64, depth: usize, map: &mut OffsetMap) {
        if let TypeKind::SkipPadding(_) = kind {
            return;
        }
        map.insert(path, address, kind.clone());

        match kind {
            TypeKind::InlineStruct(_) | TypeKind::Builtin(_) => {
                self.walk_fields(address, path, self.catalog.struct_fields(kind), depth, map);
            }
            TypeKind::EntitySubclass(class) => {
                let chain = self.catalog.ancestors_of(class);
                self.walk_chain(address, path, &chain, depth, map);
            }
            TypeKind::OwnedPointer(_) => {
                if let Some(target) = self.follow(address, path, depth) {
                    let fields = self.catalog.struct_fields(kind);
                    self.walk_fields(target, path, fields, depth + 1, map);
                }
            }
            TypeKind::PointerTo(inner) => {
                if let Some(target) = self.follow(address, path, depth) {
                    match inner.as_ref() {
                        TypeKind::InlineStruct(_) | TypeKind::Builtin(_) => {
                            let fields = self.catalog.struct_fields(inner);
                            self.walk_fields(target, path, fields, depth + 1, map);
                        }
                        TypeKind::EntitySubclass(class) => {
                            let chain = self.catalog.ancestors_of(class);
                            self.walk_chain(target, path, &chain, depth + 1, map);
                        }
                        other => {
                            let pointee = join_path(path, "*");
                            self.place(other, &pointee, target, depth + 1, map);
                        }
                    }
                }
            }
            TypeKind::FixedArray(elem, count) => {
                if elem.is_scalar() {
                    return;
                }
                let elem_size = self.catalog.size_of(elem);
                for i in 0..*count as u64 {
                    let elem_path = join_path(path, &i.to_string());
                    self.place(elem, &elem_path, at(address, i * elem_size), depth, map);
                }
            }
            TypeKind::Scalar(_)
            | TypeKind::SkipPadding(_)
            | TypeKind::DynamicArray(_)
            | TypeKind::OrderedMap { .. }
            | TypeKind::ForeignString(_)
            | TypeKind::VTable(_) => {}
        }
    }

    /// Dereference the pointer at `address` if following is allowed here.
    fn follow(&self, address: u64, path: &str, depth: usize) -> Option<u64> {
        if !self.options.follow_pointers {
            return None;
        }
        if depth >= self.options.max_pointer_depth {
            debug!("Pointer depth limit reached at {}", path);
            return None;
        }
        if address == 0 {
            return Some(0);
        }
        match self.reader.read_ptr(address) {
            Ok(target) => Some(target),
            Err(e) => {
                debug!("Treating unreadable pointer {} as null: {}", path, e);
                Some(0)
            }
        }
    }
}

/// `base + offset`, keeping unresolved bases at 0. Garbage pointees wrap
/// instead of overflowing.
fn at(base: u64, offset: u64) -> u64 {
    if base == 0 { 0 } else { base.wrapping_add(offset) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockMemoryBuilder, WriteMemory};
    use crate::schema::fixtures::sample_catalog;

    #[test]
    fn test_round_trip_child_parent() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let root = builder.alloc(16, 8);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let map = engine.compute_type_offsets(root, "Child");
        assert_eq!(map.get("Child.parent.a"), Some(root));
        assert_eq!(map.get("Child.b"), Some(root + 4));
        assert_eq!(map.get("Child.parent"), Some(root));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_state_layout_follows_pointers() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        let light = builder.alloc(8, 8);
        builder.write_u64(state + 12, light);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let map = engine.compute_type_offsets(state, "State");
        assert_eq!(map.get("State.screen"), Some(state));
        assert_eq!(map.get("State.flags"), Some(state + 4));
        // Skip padding is not recorded
        assert!(!map.contains("State.pad"));
        assert_eq!(map.get("State.illumination"), Some(state + 12));
        assert_eq!(map.get("State.illumination.color"), Some(light));
        assert_eq!(map.get("State.illumination.radius"), Some(light + 4));
        // Outer cursor advanced by one pointer width
        assert_eq!(map.get("State.position"), Some(state + 20));
        assert_eq!(map.get("State.position.y"), Some(state + 24));
        assert_eq!(map.get("State.items"), Some(state + 28));
        assert_eq!(map.get("State.lookup"), Some(state + 52));
        assert_eq!(map.get("State.name"), Some(state + 68));
        assert_eq!(map.get("State.corners.1.x"), Some(state + 108));
        assert_eq!(map.get("State.scores"), Some(state + 116));
        assert!(!map.contains("State.scores.0"));
        assert_eq!(map.get("State.next"), Some(state + 128));
        // Null `next` pointer walks at 0
        assert_eq!(map.get("State.next.screen"), Some(0));
        assert_eq!(map.get("State.next.flags"), Some(0));
    }

    #[test]
    fn test_compute_offsets_is_deterministic() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        builder.write_u64(state + 128, state);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let first = engine.compute_type_offsets(state, "State");
        let second = engine.compute_type_offsets(state, "State");
        assert_eq!(first, second);
    }

    #[test]
    fn test_self_referential_pointer_is_bounded() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        builder.write_u64(state + 128, state);
        let reader = builder.build();
        let options = LayoutOptions::builder().max_pointer_depth(2).build();
        let engine = LayoutEngine::with_options(&catalog, &reader, options);

        let map = engine.compute_type_offsets(state, "State");
        assert_eq!(map.get("State.next.screen"), Some(state));
        assert_eq!(map.get("State.next.next"), Some(state + 128));
        assert_eq!(map.get("State.next.next.screen"), Some(state));
        assert!(map.contains("State.next.next.next"));
        assert!(!map.contains("State.next.next.next.screen"));
    }

    #[test]
    fn test_root_zero_yields_zero_everywhere() {
        let catalog = sample_catalog();
        let reader = MockMemoryBuilder::new().build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let map = engine.compute_type_offsets(0, "State");
        assert!(!map.is_empty());
        assert!(map.iter().all(|e| e.address == 0));
    }

    #[test]
    fn test_unreadable_pointer_does_not_abort() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        // Pointer into nowhere
        builder.write_u64(state + 12, 0xDEAD_0000);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let map = engine.compute_type_offsets(state, "State");
        // Garbage pointee addresses are produced, never validated
        assert_eq!(map.get("State.illumination.color"), Some(0xDEAD_0000));
        assert_eq!(map.get("State.next"), Some(state + 128));
    }

    #[test]
    fn test_garbage_pointer_near_top_of_address_space() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        builder.write_u64(state + 128, u64::MAX - 8);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let map = engine.compute_type_offsets(state, "State");
        assert_eq!(map.get("State.next"), Some(state + 128));
        assert_eq!(map.get("State.next.screen"), Some(u64::MAX - 8));
        // Offsets past the pointee wrap around
        assert_eq!(map.get("State.next.flags"), Some((u64::MAX - 8).wrapping_add(4)));
        assert!(map.contains("State.next.next"));
    }

    #[test]
    fn test_layout_sees_live_mutation() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        let first = builder.alloc(8, 8);
        let second = builder.alloc(8, 8);
        builder.write_u64(state + 12, first);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let before = engine.compute_type_offsets(state, "State");
        reader.write_u64(state + 12, second).unwrap();
        let after = engine.compute_type_offsets(state, "State");

        assert_eq!(before.get("State.illumination.color"), Some(first));
        assert_eq!(after.get("State.illumination.color"), Some(second));
    }

    #[test]
    fn test_follow_pointers_disabled() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        let reader = builder.build();
        let options = LayoutOptions::builder().follow_pointers(false).build();
        let engine = LayoutEngine::with_options(&catalog, &reader, options);

        let map = engine.compute_type_offsets(state, "State");
        assert!(map.contains("State.illumination"));
        assert!(!map.contains("State.illumination.color"));
    }

    #[test]
    fn test_entity_offsets_walk_chain_root_first() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let entity = builder.alloc(40, 8);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let chain = catalog.class_chain_of("ENT_TYPE_CHAR_ANA");
        let map = engine.compute_entity_offsets(entity, &chain);

        let paths: Vec<&str> = map.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Entity",
                "Entity.vtable",
                "Entity.flags",
                "Entity.uid",
                "Movable",
                "Movable.velocity",
                "Movable.velocity.x",
                "Movable.velocity.y",
                "Movable.health",
                "Player",
                "Player.ai",
            ]
        );
        assert_eq!(map.get("Entity"), Some(entity));
        assert_eq!(map.get("Movable"), Some(entity + 16));
        assert_eq!(map.get("Movable.health"), Some(entity + 24));
        assert_eq!(map.get("Player.ai"), Some(entity + 25));

        // Same result through the type entry point
        assert_eq!(engine.compute_type_offsets(entity, "Player"), map);
    }

    #[test]
    fn test_distinct_fields_have_distinct_paths() {
        let catalog = sample_catalog();
        let mut builder = MockMemoryBuilder::new();
        let state = builder.alloc(136, 8);
        let reader = builder.build();
        let engine = LayoutEngine::new(&catalog, &reader);

        let map = engine.compute_type_offsets(state, "State");
        let mut paths: Vec<&str> = map.iter().map(|e| e.path.as_str()).collect();
        let total = paths.len();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), total);
    }

    #[test]
    fn test_options_builder_defaults() {
        let options = LayoutOptions::builder().build();
        assert_eq!(options, LayoutOptions::default());
        assert_eq!(options.max_pointer_depth, DEFAULT_MAX_POINTER_DEPTH);
        assert!(options.follow_pointers);
    }
}
