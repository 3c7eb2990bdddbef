//! # structlens-core
//!
//! Schema-driven inspection of a foreign process's memory.
//!
//! This crate provides:
//! - Memory access traits with snapshot and Windows live-process sources
//! - A declarative type catalog loaded from a JSON schema
//! - Field-path -> address layout over live memory, with object diffing
//! - Remote traversal of `std::map`/`std::set`, `std::string` and `std::vector`
//! - A virtual function table address book

pub mod container;
pub mod error;
pub mod layout;
pub mod memory;
pub mod schema;
pub mod vtable;

pub use container::{NodeLayout, RemoteMap, RemoteString, RemoteVector, TreeHandle};
pub use error::{Error, Result, SchemaError};
pub use layout::{
    FieldDifference, LayoutEngine, LayoutOptions, ObjectView, OffsetEntry, OffsetMap,
    RefreshGate, ScalarValue, ViewSnapshot, ViewTarget, compare, read_scalar,
};
#[cfg(target_os = "windows")]
pub use memory::{MemoryReader, ProcessHandle};
pub use memory::{ReadMemory, SnapshotReader, WriteMemory, format_pattern, parse_pattern};
pub use schema::{
    BuiltinType, FieldSelector, FieldSpec, Scalar, ScalarRepr, SchemaDocument, SharedCatalog,
    TypeCatalog, TypeKind, VirtualFunction,
};
pub use vtable::{
    NoSymbols, ResolvedFunction, SymbolSource, TableSignature, VTableDirectory, VTableEntry,
    locate_table, resolve_virtual_functions,
};
