use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::layout::{COMPARISON_PREFIX, FieldDifference, LayoutEngine, OffsetMap, compare};
use crate::memory::ReadMemory;
use crate::schema::{FieldSpec, TypeCatalog};

/// What an inspected object is laid out as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ViewTarget {
    /// Named struct type, recorded under its own name
    Struct(String),
    /// Entity class chain, root first
    Entity(Vec<String>),
}

/// Refresh-in-flight guard for one object
#[derive(Debug, Default)]
pub struct RefreshGate {
    in_flight: AtomicBool,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. Fails while another refresh holds a ticket.
    pub fn try_begin(&self, address: u64) -> Result<RefreshTicket<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::RefreshInFlight(address));
        }
        Ok(RefreshTicket { gate: self })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases its gate when dropped
#[derive(Debug)]
pub struct RefreshTicket<'a> {
    gate: &'a RefreshGate,
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, Ordering::Release);
    }
}

/// Result of one refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewSnapshot {
    pub offsets: OffsetMap,
    /// Parallel map under [`COMPARISON_PREFIX`], if a comparison root is set
    pub comparison: Option<OffsetMap>,
    pub differences: Vec<FieldDifference>,
}

/// A refreshable inspected object
#[derive(Debug)]
pub struct ObjectView {
    root: u64,
    target: ViewTarget,
    comparison_root: Option<u64>,
    gate: RefreshGate,
}

impl ObjectView {
    pub fn for_struct(root: u64, type_name: impl Into<String>) -> Self {
        Self::new(root, ViewTarget::Struct(type_name.into()))
    }

    /// Entity whose class is picked from its name by the catalog's rules
    pub fn for_entity(root: u64, catalog: &TypeCatalog, entity_name: &str) -> Self {
        Self::new(root, ViewTarget::Entity(catalog.class_chain_of(entity_name)))
    }

    /// Entity interpreted as an explicit class
    pub fn for_class(root: u64, catalog: &TypeCatalog, class: &str) -> Self {
        Self::new(root, ViewTarget::Entity(catalog.ancestors_of(class)))
    }

    fn new(root: u64, target: ViewTarget) -> Self {
        Self {
            root,
            target,
            comparison_root: None,
            gate: RefreshGate::new(),
        }
    }

    pub fn with_comparison(mut self, other: u64) -> Self {
        self.comparison_root = Some(other);
        self
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn target(&self) -> &ViewTarget {
        &self.target
    }

    pub fn comparison_root(&self) -> Option<u64> {
        self.comparison_root
    }

    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    /// Recompute offsets (and the comparison diff) from live memory.
    pub fn refresh<R: ReadMemory>(&self, engine: &LayoutEngine<'_, R>) -> Result<ViewSnapshot> {
        let _ticket = self.gate.try_begin(self.root)?;

        let offsets = self.layout(engine, self.root, "");
        let mut snapshot = ViewSnapshot {
            offsets,
            ..ViewSnapshot::default()
        };

        if let Some(other) = self.comparison_root {
            let comparison = self.layout(engine, other, COMPARISON_PREFIX);
            snapshot.differences = compare(
                engine.reader(),
                engine.catalog(),
                &snapshot.offsets,
                &comparison,
            );
            debug!(
                "Refreshed {:#x} against {:#x}: {} differences",
                self.root,
                other,
                snapshot.differences.len()
            );
            snapshot.comparison = Some(comparison);
        }

        Ok(snapshot)
    }

    fn layout<R: ReadMemory>(&self, engine: &LayoutEngine<'_, R>, root: u64, prefix: &str) -> OffsetMap {
        match &self.target {
            ViewTarget::Entity(chain) => engine.compute_entity_offsets_under(root, prefix, chain),
            ViewTarget::Struct(name) if prefix.is_empty() => engine.compute_type_offsets(root, name),
            ViewTarget::Struct(name) => {
                let catalog = engine.catalog();
                let fields: &[FieldSpec] = match catalog.resolve_type(name) {
                    Some(kind) => catalog.struct_fields(&kind),
                    None => &[],
                };
                engine.compute_offsets(root, &format!("{}.{}", prefix, name), fields)
            }
        }
    }
}
