//! Serialized shape of a schema document.
//!
//! ```json
//! {
//!   "entity_class_hierarchy": { "Movable": "Entity", "Player": "Movable" },
//!   "default_entity_types": [ { "pattern": "ENT_TYPE_CHAR_.*", "class": "Player" } ],
//!   "pointer_types": [ "Illumination" ],
//!   "inline_struct_types": [ "Vec2" ],
//!   "struct_alignments": { "Vec2": 4 },
//!   "refs": { "entity_flags": { "1": "Invisible", "2": "Indestructible" } },
//!   "fields": { "Vec2": [ { "field": "x", "type": "Float" }, { "field": "y", "type": "Float" } ] },
//!   "entity_fields": {
//!     "Entity": [
//!       { "field": "vtable", "type": "VirtualFunctionTable" },
//!       { "vftablefunctions": { "0": { "name": "dtor", "return": "void" } } }
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaDocument {
    /// Entity class -> parent class
    pub entity_class_hierarchy: BTreeMap<String, String>,
    /// Ordered; the first matching pattern wins
    pub default_entity_types: Vec<ClassRuleDoc>,
    pub pointer_types: Vec<String>,
    pub inline_struct_types: Vec<String>,
    pub struct_alignments: BTreeMap<String, u8>,
    /// Shared flag/state title tables, keyed by ref name
    pub refs: BTreeMap<String, BTreeMap<String, String>>,
    pub fields: BTreeMap<String, Vec<FieldDoc>>,
    pub entity_fields: BTreeMap<String, Vec<EntityFieldDoc>>,
    /// Virtual functions of non-entity types
    pub vftablefunctions: BTreeMap<String, BTreeMap<String, FunctionDoc>>,
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassRuleDoc {
    pub pattern: String,
    pub class: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDoc {
    pub field: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub comment: Option<String>,
    #[serde(default)]
    pub pointer: bool,
    /// Byte size for `Skip` and fixed-size strings
    pub offset: Option<u64>,
    pub declared_offset: Option<u64>,
    /// Element count for fixed arrays
    pub count: Option<usize>,
    pub flags: Option<BTreeMap<String, String>>,
    pub states: Option<BTreeMap<String, String>>,
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
    pub keytype: Option<String>,
    pub valuetype: Option<String>,
    pub vectortype: Option<String>,
    pub functions: Option<BTreeMap<String, FunctionDoc>>,
}

/// Entity field lists may carry the class's virtual functions inline
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EntityFieldDoc {
    VirtualFunctions {
        vftablefunctions: BTreeMap<String, FunctionDoc>,
    },
    Field(FieldDoc),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDoc {
    #[serde(default = "unnamed_function")]
    pub name: String,
    #[serde(default)]
    pub params: String,
    #[serde(rename = "return", default = "void_return")]
    pub return_type: String,
}

fn unnamed_function() -> String {
    "unnamed function".to_string()
}

fn void_return() -> String {
    "void".to_string()
}
