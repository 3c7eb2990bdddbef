use std::fmt;

use serde::Serialize;
use strum::{Display, EnumString, IntoStaticStr};

/// Lookup table a foreign ID indexes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
pub enum IdTable {
    EntityDb,
    EntityUid,
    ParticleDb,
    TextureDb,
    StringsTable,
    CharacterDb,
}

/// How the bytes of a scalar are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarRepr {
    Signed,
    Unsigned,
    Float,
    Bool,
    /// Bit flags, titles looked up per flag number
    Flags,
    /// Enumerated state, titles looked up per value
    State,
    ForeignId(IdTable),
    Char16,
    Ipv4,
    /// Pointer that is displayed but never followed
    Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Scalar {
    pub width: u8,
    pub repr: ScalarRepr,
}

impl Scalar {
    pub const fn new(width: u8, repr: ScalarRepr) -> Self {
        Self { width, repr }
    }

    pub fn is_signed(&self) -> bool {
        match self.repr {
            ScalarRepr::Signed | ScalarRepr::State => true,
            ScalarRepr::ForeignId(table) => {
                matches!(table, IdTable::EntityUid | IdTable::TextureDb)
            }
            _ => false,
        }
    }

    /// Sign- or zero-extend `bytes` (little-endian, `width` long) to i128.
    pub fn decode_integer(&self, bytes: &[u8]) -> i128 {
        let width = (self.width as usize).min(bytes.len()).min(8);
        let mut buffer = [0u8; 8];
        buffer[..width].copy_from_slice(&bytes[..width]);
        let raw = u64::from_le_bytes(buffer);

        if self.is_signed() && width > 0 && width < 8 {
            let shift = 64 - width * 8;
            (((raw << shift) as i64) >> shift) as i128
        } else if self.is_signed() {
            raw as i64 as i128
        } else {
            raw as i128
        }
    }
}

/// Declared kind of one schema field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypeKind {
    Scalar(Scalar),
    /// Pointer flagged for traversal
    PointerTo(Box<TypeKind>),
    /// Pointer to a registered pointer type; always followed
    OwnedPointer(String),
    InlineStruct(String),
    EntitySubclass(String),
    /// Fixed-layout composite declared in the schema's `fields` section
    Builtin(String),
    FixedArray(Box<TypeKind>, usize),
    SkipPadding(u64),
    DynamicArray(String),
    OrderedMap { key: String, value: Option<String> },
    ForeignString(u8),
    VTable(String),
}

impl TypeKind {
    /// Struct-like kinds are embedded by value and walked field by field
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            TypeKind::InlineStruct(name)
            | TypeKind::EntitySubclass(name)
            | TypeKind::Builtin(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, TypeKind::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            TypeKind::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Scalar(s) => write!(f, "{:?}{}", s.repr, s.width * 8),
            TypeKind::PointerTo(inner) => write!(f, "{}*", inner),
            TypeKind::OwnedPointer(name) => write!(f, "{}*", name),
            TypeKind::InlineStruct(name) | TypeKind::Builtin(name) => f.write_str(name),
            TypeKind::EntitySubclass(name) => write!(f, "entity {}", name),
            TypeKind::FixedArray(elem, n) => write!(f, "{}[{}]", elem, n),
            TypeKind::SkipPadding(n) => write!(f, "skip {}", n),
            TypeKind::DynamicArray(elem) => write!(f, "vector<{}>", elem),
            TypeKind::OrderedMap { key, value: Some(v) } => write!(f, "map<{}, {}>", key, v),
            TypeKind::OrderedMap { key, value: None } => write!(f, "set<{}>", key),
            TypeKind::ForeignString(1) => f.write_str("string"),
            TypeKind::ForeignString(_) => f.write_str("wstring"),
            TypeKind::VTable(owner) => write!(f, "vtable<{}>", owner),
        }
    }
}

/// One field of a schema struct, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: TypeKind,
    /// Type name as written in the schema
    pub type_name: String,
    /// Offset relative to the start of the owning struct
    pub declared_offset: Option<u64>,
    pub comment: Option<String>,
}

/// Type names the schema can use without declaring them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display)]
pub enum BuiltinType {
    Byte,
    UnsignedByte,
    Word,
    UnsignedWord,
    Dword,
    UnsignedDword,
    Qword,
    UnsignedQword,
    Float,
    Double,
    Bool,
    Flags8,
    Flags16,
    Flags32,
    State8,
    State16,
    State32,
    UTF16Char,
    UTF16StringFixedSize,
    UTF8StringFixedSize,
    Skip,
    StdVector,
    StdMap,
    StdSet,
    StdString,
    StdWstring,
    CodePointer,
    DataPointer,
    ConstCharPointer,
    ConstCharPointerPointer,
    EntityPointer,
    EntityUIDPointer,
    EntityDBPointer,
    ParticleDBPointer,
    TextureDBPointer,
    VirtualFunctionTable,
    IPv4Address,
    EntityDBID,
    EntityUID,
    ParticleDBID,
    TextureDBID,
    StringsTableID,
    CharacterDBID,
}

impl BuiltinType {
    /// Scalar shape of a builtin, `None` for the ones that need field
    /// arguments (containers, fixed strings, skip, vtable).
    pub fn scalar(self) -> Option<Scalar> {
        use BuiltinType::*;
        use ScalarRepr as R;

        let scalar = match self {
            Byte => Scalar::new(1, R::Signed),
            UnsignedByte => Scalar::new(1, R::Unsigned),
            Word => Scalar::new(2, R::Signed),
            UnsignedWord => Scalar::new(2, R::Unsigned),
            Dword => Scalar::new(4, R::Signed),
            UnsignedDword => Scalar::new(4, R::Unsigned),
            Qword => Scalar::new(8, R::Signed),
            UnsignedQword => Scalar::new(8, R::Unsigned),
            Float => Scalar::new(4, R::Float),
            Double => Scalar::new(8, R::Float),
            Bool => Scalar::new(1, R::Bool),
            Flags8 => Scalar::new(1, R::Flags),
            Flags16 => Scalar::new(2, R::Flags),
            Flags32 => Scalar::new(4, R::Flags),
            State8 => Scalar::new(1, R::State),
            State16 => Scalar::new(2, R::State),
            State32 => Scalar::new(4, R::State),
            UTF16Char => Scalar::new(2, R::Char16),
            IPv4Address => Scalar::new(4, R::Ipv4),
            EntityDBID => Scalar::new(4, R::ForeignId(IdTable::EntityDb)),
            EntityUID => Scalar::new(4, R::ForeignId(IdTable::EntityUid)),
            ParticleDBID => Scalar::new(4, R::ForeignId(IdTable::ParticleDb)),
            TextureDBID => Scalar::new(4, R::ForeignId(IdTable::TextureDb)),
            StringsTableID => Scalar::new(4, R::ForeignId(IdTable::StringsTable)),
            CharacterDBID => Scalar::new(1, R::ForeignId(IdTable::CharacterDb)),
            CodePointer | DataPointer | ConstCharPointer | ConstCharPointerPointer
            | EntityPointer | EntityUIDPointer | EntityDBPointer | ParticleDBPointer
            | TextureDBPointer => Scalar::new(8, R::Address),
            UTF16StringFixedSize | UTF8StringFixedSize | Skip | StdVector | StdMap | StdSet
            | StdString | StdWstring | VirtualFunctionTable => return None,
        };
        Some(scalar)
    }

    pub fn is_flags(self) -> bool {
        matches!(
            self,
            BuiltinType::Flags8 | BuiltinType::Flags16 | BuiltinType::Flags32
        )
    }

    pub fn is_state(self) -> bool {
        matches!(
            self,
            BuiltinType::State8 | BuiltinType::State16 | BuiltinType::State32
        )
    }
}
