mod catalog;
mod document;
mod kind;
mod shared;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::{
    FieldSelector, MAX_HIERARCHY_DEPTH, ROOT_ENTITY_CLASS, TypeCatalog, UNKNOWN_FLAG_TITLE,
    UNKNOWN_STATE_TITLE, ValueShape, VirtualFunction,
};
pub use document::{ClassRuleDoc, EntityFieldDoc, FieldDoc, FunctionDoc, SchemaDocument};
pub use kind::{BuiltinType, FieldSpec, IdTable, Scalar, ScalarRepr, TypeKind};
pub use shared::SharedCatalog;
