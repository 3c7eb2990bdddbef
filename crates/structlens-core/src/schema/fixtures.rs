//! Schema shared by unit tests across the crate.

use crate::schema::TypeCatalog;

pub const SAMPLE_SCHEMA: &str = r#"{
    "entity_class_hierarchy": {
        "Movable": "Entity",
        "Player": "Movable",
        "Floor": "Entity"
    },
    "default_entity_types": [
        { "pattern": "ENT_TYPE_CHAR_.*", "class": "Player" },
        { "pattern": "ENT_TYPE_FLOOR_.*", "class": "Floor" },
        { "pattern": "ENT_TYPE_.*", "class": "Movable" }
    ],
    "pointer_types": [ "Illumination" ],
    "inline_struct_types": [ "Vec2" ],
    "struct_alignments": { "Vec2": 4, "Illumination": 8 },
    "refs": {
        "entity_flags": { "1": "Invisible", "2": "Indestructible", "3": "Solid" }
    },
    "fields": {
        "Vec2": [
            { "field": "x", "type": "Float" },
            { "field": "y", "type": "Float" }
        ],
        "Illumination": [
            { "field": "color", "type": "UnsignedDword" },
            { "field": "radius", "type": "Float" }
        ],
        "Parent": [
            { "field": "a", "type": "UnsignedDword" }
        ],
        "Child": [
            { "field": "parent", "type": "Parent" },
            { "field": "b", "type": "UnsignedWord" }
        ],
        "State": [
            { "field": "screen", "type": "State32", "states": { "0": "Logo", "12": "Level" } },
            { "field": "flags", "type": "Flags32", "ref": "entity_flags" },
            { "field": "pad", "type": "Skip", "offset": 4 },
            { "field": "illumination", "type": "Illumination" },
            { "field": "position", "type": "Vec2" },
            { "field": "items", "type": "StdVector", "vectortype": "UnsignedDword" },
            { "field": "lookup", "type": "StdMap", "keytype": "Dword", "valuetype": "Vec2" },
            { "field": "name", "type": "StdString", "comment": "level name" },
            { "field": "corners", "type": "Vec2", "count": 2 },
            { "field": "scores", "type": "Dword", "count": 3 },
            { "field": "next", "type": "State", "pointer": true }
        ]
    },
    "entity_fields": {
        "Entity": [
            { "field": "vtable", "type": "VirtualFunctionTable", "functions": {
                "0": { "name": "dtor" },
                "2": { "name": "kill", "params": "bool destroy_corpse" }
            } },
            { "field": "flags", "type": "Flags32", "ref": "entity_flags" },
            { "field": "uid", "type": "EntityUID" }
        ],
        "Movable": [
            { "vftablefunctions": { "91": { "name": "damage", "params": "int8 amount", "return": "bool" } } },
            { "field": "velocity", "type": "Vec2" },
            { "field": "health", "type": "UnsignedByte" }
        ],
        "Player": [
            { "field": "ai", "type": "DataPointer" }
        ],
        "Floor": []
    }
}"#;

pub fn sample_catalog() -> TypeCatalog {
    TypeCatalog::from_json(SAMPLE_SCHEMA).unwrap()
}
