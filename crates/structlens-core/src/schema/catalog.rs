use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SchemaError;
use crate::memory::layout::{pointer, string, tree, vector, vtable};
use crate::schema::document::{EntityFieldDoc, FieldDoc, FunctionDoc, SchemaDocument};
use crate::schema::kind::{BuiltinType, FieldSpec, Scalar, ScalarRepr, TypeKind};

/// Root of every entity class chain
pub const ROOT_ENTITY_CLASS: &str = "Entity";
/// Maximum number of parent hops from any class to the root
pub const MAX_HIERARCHY_DEPTH: usize = 32;
pub const UNKNOWN_FLAG_TITLE: &str = "Unknown";
pub const UNKNOWN_STATE_TITLE: &str = "UNKNOWN STATE";

const DEFAULT_ALIGNMENT: u8 = 8;

/// Which of the four field tables to consult
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector<'a> {
    Builtin(&'a str),
    Pointer(&'a str),
    InlineStruct(&'a str),
    EntitySubclass(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualFunction {
    pub index: u32,
    pub name: String,
    pub params: String,
    pub return_type: String,
    /// Type that declared the function
    pub owner: String,
}

/// Static size and alignment of a named type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueShape {
    pub kind: TypeKind,
    pub size: u64,
    pub alignment: u8,
}

#[derive(Debug, Clone)]
struct ClassRule {
    pattern: String,
    regex: Regex,
    class: String,
}

/// Type names known to the schema, by category
#[derive(Debug, Default, Clone)]
struct TypeNames {
    pointer: HashSet<String>,
    inline: HashSet<String>,
    structs: HashSet<String>,
    entities: HashSet<String>,
}

impl TypeNames {
    fn resolve(&self, name: &str) -> Option<TypeKind> {
        if let Ok(builtin) = BuiltinType::from_str(name) {
            return match builtin {
                BuiltinType::StdString => Some(TypeKind::ForeignString(1)),
                BuiltinType::StdWstring => Some(TypeKind::ForeignString(2)),
                other => other.scalar().map(TypeKind::Scalar),
            };
        }

        if self.pointer.contains(name) {
            Some(TypeKind::OwnedPointer(name.to_string()))
        } else if self.inline.contains(name) {
            Some(TypeKind::InlineStruct(name.to_string()))
        } else if self.structs.contains(name) {
            Some(TypeKind::Builtin(name.to_string()))
        } else if self.entities.contains(name) {
            Some(TypeKind::EntitySubclass(name.to_string()))
        } else {
            None
        }
    }
}

/// Declarative catalog of the foreign process's types.
///
/// Built once by [`TypeCatalog::load`] and read-only afterwards; see
/// [`crate::schema::SharedCatalog`] for replacing it at runtime.
#[derive(Debug, Default, Clone)]
pub struct TypeCatalog {
    names: TypeNames,
    builtin_fields: HashMap<String, Vec<FieldSpec>>,
    pointer_fields: HashMap<String, Vec<FieldSpec>>,
    inline_fields: HashMap<String, Vec<FieldSpec>>,
    entity_fields: HashMap<String, Vec<FieldSpec>>,
    parents: HashMap<String, String>,
    class_rules: Vec<ClassRule>,
    /// `Type.field` -> title table name
    title_refs: HashMap<String, String>,
    title_tables: HashMap<String, BTreeMap<i64, String>>,
    virtual_functions: HashMap<String, Vec<VirtualFunction>>,
    alignments: HashMap<String, u8>,
}

impl TypeCatalog {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let doc = SchemaDocument::from_json(json)?;
        Self::load(&doc)
    }

    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&text)?;
        info!(
            "Loaded schema {} ({} structs, {} entity classes)",
            path.as_ref().display(),
            catalog.struct_count(),
            catalog.entity_class_count()
        );
        Ok(catalog)
    }

    /// Validate `doc` and build a catalog from it.
    ///
    /// Fails on the first unresolved or inconsistent reference; nothing is
    /// built in that case.
    pub fn load(doc: &SchemaDocument) -> Result<Self, SchemaError> {
        Loader::new(doc).build()
    }

    pub fn fields_of(&self, selector: FieldSelector<'_>) -> &[FieldSpec] {
        let (table, name, label) = match selector {
            FieldSelector::Builtin(name) => (&self.builtin_fields, name, "builtin"),
            FieldSelector::Pointer(name) => (&self.pointer_fields, name, "pointer"),
            FieldSelector::InlineStruct(name) => (&self.inline_fields, name, "inline struct"),
            FieldSelector::EntitySubclass(name) => (&self.entity_fields, name, "entity subclass"),
        };

        match table.get(name) {
            Some(fields) => fields,
            None => {
                warn!("Unknown {} type requested: {}", label, name);
                &[]
            }
        }
    }

    /// Fields walked for a struct-like or owned-pointer kind.
    ///
    /// For entity subclasses only the class's own fields are returned.
    pub fn struct_fields(&self, kind: &TypeKind) -> &[FieldSpec] {
        match kind {
            TypeKind::Builtin(name) => self.fields_of(FieldSelector::Builtin(name)),
            TypeKind::OwnedPointer(name) => self.fields_of(FieldSelector::Pointer(name)),
            TypeKind::InlineStruct(name) => self.fields_of(FieldSelector::InlineStruct(name)),
            TypeKind::EntitySubclass(name) => self.fields_of(FieldSelector::EntitySubclass(name)),
            _ => &[],
        }
    }

    pub fn resolve_type(&self, name: &str) -> Option<TypeKind> {
        self.names.resolve(name)
    }

    pub fn is_entity_class(&self, name: &str) -> bool {
        name == ROOT_ENTITY_CLASS || self.parents.contains_key(name)
    }

    /// Class assigned to an entity by name. Rules are tried in declaration
    /// order and the first full match wins.
    pub fn class_for_entity_name(&self, entity_name: &str) -> Option<&str> {
        self.class_rules
            .iter()
            .find(|rule| rule.regex.is_match(entity_name))
            .map(|rule| {
                debug!("{} matched class rule `{}`", entity_name, rule.pattern);
                rule.class.as_str()
            })
    }

    /// Class chain of a live entity, root first. Unmatched names get just
    /// the root class.
    pub fn class_chain_of(&self, entity_name: &str) -> Vec<String> {
        match self.class_for_entity_name(entity_name) {
            Some(class) => self.ancestors_of(class),
            None => vec![ROOT_ENTITY_CLASS.to_string()],
        }
    }

    /// Chain from the root down to `class`, both included.
    pub fn ancestors_of(&self, class: &str) -> Vec<String> {
        if !self.is_entity_class(class) {
            warn!("Unknown entity class requested: {}", class);
            return vec![ROOT_ENTITY_CLASS.to_string()];
        }

        let mut chain = Vec::new();
        let mut current = class;
        while current != ROOT_ENTITY_CLASS && chain.len() < MAX_HIERARCHY_DEPTH {
            chain.push(current.to_string());
            match self.parents.get(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        chain.push(ROOT_ENTITY_CLASS.to_string());
        chain.reverse();
        chain
    }

    /// Declared virtual functions. Entity classes include every ancestor's
    /// functions, root first.
    pub fn virtual_functions_of(&self, type_name: &str) -> Vec<&VirtualFunction> {
        if self.is_entity_class(type_name) {
            self.ancestors_of(type_name)
                .iter()
                .filter_map(|class| self.virtual_functions.get(class))
                .flatten()
                .collect()
        } else {
            self.virtual_functions
                .get(type_name)
                .map(|functions| functions.iter().collect())
                .unwrap_or_default()
        }
    }

    /// Title of flag number `flag` (1-based bit position) of `type_name.field`
    pub fn title_for_flag(&self, type_name: &str, field: &str, flag: i64) -> &str {
        self.title(type_name, field, flag)
            .unwrap_or(UNKNOWN_FLAG_TITLE)
    }

    pub fn title_for_state(&self, type_name: &str, field: &str, value: i64) -> &str {
        self.title(type_name, field, value)
            .unwrap_or(UNKNOWN_STATE_TITLE)
    }

    /// Full title table registered for a flags/state field
    pub fn title_table(&self, type_name: &str, field: &str) -> Option<&BTreeMap<i64, String>> {
        let table = self.title_refs.get(&format!("{}.{}", type_name, field))?;
        self.title_tables.get(table)
    }

    fn title(&self, type_name: &str, field: &str, key: i64) -> Option<&str> {
        self.title_table(type_name, field)?
            .get(&key)
            .map(String::as_str)
    }

    /// Static byte size of a kind; never reads memory.
    pub fn size_of(&self, kind: &TypeKind) -> u64 {
        match kind {
            TypeKind::Scalar(scalar) => scalar.width as u64,
            TypeKind::PointerTo(_) | TypeKind::OwnedPointer(_) => pointer::SIZE,
            TypeKind::InlineStruct(_) | TypeKind::Builtin(_) => {
                self.struct_size(self.struct_fields(kind))
            }
            TypeKind::EntitySubclass(class) => self
                .ancestors_of(class)
                .iter()
                .map(|c| self.struct_size(self.fields_of(FieldSelector::EntitySubclass(c))))
                .sum(),
            TypeKind::FixedArray(elem, count) => self.size_of(elem) * *count as u64,
            TypeKind::SkipPadding(bytes) => *bytes,
            TypeKind::DynamicArray(_) => vector::HEADER_SIZE,
            TypeKind::OrderedMap { .. } => tree::HEADER_SIZE,
            TypeKind::ForeignString(_) => string::HEADER_SIZE,
            TypeKind::VTable(_) => vtable::POINTER_SIZE,
        }
    }

    /// Size of a field sequence laid out in order, honoring declared
    /// offsets.
    pub fn struct_size(&self, fields: &[FieldSpec]) -> u64 {
        let mut cursor = 0;
        let mut end = 0;
        for field in fields {
            let start = field.declared_offset.unwrap_or(cursor);
            cursor = start + self.size_of(&field.kind);
            end = end.max(cursor);
        }
        end
    }

    pub fn alignment_of(&self, type_name: &str) -> u8 {
        if let Some(kind) = self.resolve_type(type_name) {
            match kind {
                TypeKind::Scalar(scalar) => return scalar.width,
                TypeKind::OwnedPointer(_) | TypeKind::ForeignString(_) => {
                    return DEFAULT_ALIGNMENT;
                }
                _ => {}
            }
        }

        match self.alignments.get(type_name) {
            Some(alignment) => *alignment,
            None => {
                debug!(
                    "No alignment declared for {}, assuming {}",
                    type_name, DEFAULT_ALIGNMENT
                );
                DEFAULT_ALIGNMENT
            }
        }
    }

    /// Kind, size and alignment of a named type, as used for container
    /// elements.
    pub fn value_shape(&self, type_name: &str) -> Option<ValueShape> {
        let Some(kind) = self.resolve_type(type_name) else {
            warn!("Unknown type requested for value shape: {}", type_name);
            return None;
        };
        Some(ValueShape {
            size: self.size_of(&kind),
            alignment: self.alignment_of(type_name),
            kind,
        })
    }

    pub fn struct_count(&self) -> usize {
        self.builtin_fields.len() + self.pointer_fields.len() + self.inline_fields.len()
    }

    pub fn entity_class_count(&self) -> usize {
        self.parents.len() + 1
    }

    pub fn class_rule_count(&self) -> usize {
        self.class_rules.len()
    }

    /// All struct type names, sorted
    pub fn struct_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.structs.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

struct Loader<'d> {
    doc: &'d SchemaDocument,
    catalog: TypeCatalog,
}

impl<'d> Loader<'d> {
    fn new(doc: &'d SchemaDocument) -> Self {
        Self {
            doc,
            catalog: TypeCatalog::default(),
        }
    }

    fn build(mut self) -> Result<TypeCatalog, SchemaError> {
        self.collect_names()?;
        self.load_alignments()?;
        self.load_hierarchy()?;
        self.load_class_rules()?;
        self.load_refs()?;
        self.load_struct_fields()?;
        self.load_entity_fields()?;
        self.load_type_functions()?;
        self.check_embedding()?;

        for functions in self.catalog.virtual_functions.values_mut() {
            functions.sort_by_key(|f| f.index);
        }
        Ok(self.catalog)
    }

    fn collect_names(&mut self) -> Result<(), SchemaError> {
        let doc = self.doc;
        let names = &mut self.catalog.names;
        names.structs = doc.fields.keys().cloned().collect();

        for (set, section, members) in [
            (&mut names.pointer, "pointer_types", &doc.pointer_types),
            (&mut names.inline, "inline_struct_types", &doc.inline_struct_types),
        ] {
            for name in members {
                if !doc.fields.contains_key(name) {
                    return Err(SchemaError::UnresolvedType {
                        owner: section.to_string(),
                        name: name.clone(),
                    });
                }
                set.insert(name.clone());
            }
        }

        names.entities = doc
            .entity_class_hierarchy
            .keys()
            .cloned()
            .chain(std::iter::once(ROOT_ENTITY_CLASS.to_string()))
            .collect();

        for class in doc.entity_fields.keys() {
            if !names.entities.contains(class) {
                return Err(SchemaError::UnresolvedType {
                    owner: "entity_fields".to_string(),
                    name: class.clone(),
                });
            }
        }
        Ok(())
    }

    fn load_alignments(&mut self) -> Result<(), SchemaError> {
        for (name, &alignment) in &self.doc.struct_alignments {
            if !(1..=8).contains(&alignment) {
                return Err(SchemaError::InvalidAlignment {
                    name: name.clone(),
                    alignment,
                });
            }
            self.catalog.alignments.insert(name.clone(), alignment);
        }
        Ok(())
    }

    fn load_hierarchy(&mut self) -> Result<(), SchemaError> {
        let hierarchy = &self.doc.entity_class_hierarchy;
        for (class, parent) in hierarchy {
            if class == parent {
                // Self-parenting entries are ignored
                continue;
            }
            if parent != ROOT_ENTITY_CLASS && !hierarchy.contains_key(parent) {
                return Err(SchemaError::UnknownParent {
                    class: class.clone(),
                    parent: parent.clone(),
                });
            }
            self.catalog.parents.insert(class.clone(), parent.clone());
        }

        for class in self.catalog.parents.keys() {
            let mut seen = HashSet::new();
            let mut current = class.as_str();
            let mut steps = 0;
            while current != ROOT_ENTITY_CLASS {
                if !seen.insert(current) {
                    return Err(SchemaError::CyclicHierarchy {
                        class: class.clone(),
                    });
                }
                if steps == MAX_HIERARCHY_DEPTH {
                    return Err(SchemaError::HierarchyTooDeep {
                        class: class.clone(),
                        limit: MAX_HIERARCHY_DEPTH,
                    });
                }
                steps += 1;
                current = match self.catalog.parents.get(current) {
                    Some(parent) => parent,
                    // Self-parented class acting as its own root
                    None => break,
                };
            }
        }
        Ok(())
    }

    fn load_class_rules(&mut self) -> Result<(), SchemaError> {
        for rule in &self.doc.default_entity_types {
            let regex = Regex::new(&format!("^(?:{})$", rule.pattern)).map_err(|e| {
                SchemaError::InvalidClassRule {
                    pattern: rule.pattern.clone(),
                    message: e.to_string(),
                }
            })?;
            if !self.catalog.names.entities.contains(&rule.class) {
                return Err(SchemaError::UnknownRuleClass {
                    pattern: rule.pattern.clone(),
                    class: rule.class.clone(),
                });
            }
            self.catalog.class_rules.push(ClassRule {
                pattern: rule.pattern.clone(),
                regex,
                class: rule.class.clone(),
            });
        }
        Ok(())
    }

    fn load_refs(&mut self) -> Result<(), SchemaError> {
        for (name, titles) in &self.doc.refs {
            let table = parse_titles(&format!("refs.{}", name), titles)?;
            self.catalog.title_tables.insert(name.clone(), table);
        }
        Ok(())
    }

    fn load_struct_fields(&mut self) -> Result<(), SchemaError> {
        let doc = self.doc;
        for (owner, docs) in &doc.fields {
            let mut fields = Vec::with_capacity(docs.len());
            for field_doc in docs {
                let field = self.convert_field(owner, field_doc)?;
                push_unique(owner, &mut fields, field)?;
            }

            let names = &self.catalog.names;
            let table = if names.pointer.contains(owner) {
                &mut self.catalog.pointer_fields
            } else if names.inline.contains(owner) {
                &mut self.catalog.inline_fields
            } else {
                &mut self.catalog.builtin_fields
            };
            table.insert(owner.clone(), fields);
        }
        Ok(())
    }

    fn load_entity_fields(&mut self) -> Result<(), SchemaError> {
        let doc = self.doc;
        for class in &self.catalog.names.entities.clone() {
            let mut fields = Vec::new();
            for entry in doc.entity_fields.get(class).into_iter().flatten() {
                match entry {
                    EntityFieldDoc::VirtualFunctions { vftablefunctions } => {
                        self.add_functions(class, vftablefunctions)?;
                    }
                    EntityFieldDoc::Field(field_doc) => {
                        let field = self.convert_field(class, field_doc)?;
                        push_unique(class, &mut fields, field)?;
                    }
                }
            }
            self.catalog.entity_fields.insert(class.clone(), fields);
        }
        Ok(())
    }

    fn load_type_functions(&mut self) -> Result<(), SchemaError> {
        let doc = self.doc;
        for (type_name, functions) in &doc.vftablefunctions {
            if self.catalog.names.resolve(type_name).is_none() {
                return Err(SchemaError::UnresolvedType {
                    owner: "vftablefunctions".to_string(),
                    name: type_name.clone(),
                });
            }
            self.add_functions(type_name, functions)?;
        }
        Ok(())
    }

    fn add_functions(
        &mut self,
        owner: &str,
        functions: &BTreeMap<String, FunctionDoc>,
    ) -> Result<(), SchemaError> {
        let list = self
            .catalog
            .virtual_functions
            .entry(owner.to_string())
            .or_default();
        for (index, function) in functions {
            let index = index.trim().parse::<u32>().map_err(|_| SchemaError::InvalidField {
                owner: owner.to_string(),
                message: format!("virtual function index `{}` is not a number", index),
            })?;
            list.push(VirtualFunction {
                index,
                name: function.name.clone(),
                params: function.params.clone(),
                return_type: function.return_type.clone(),
                owner: owner.to_string(),
            });
        }
        Ok(())
    }

    fn convert_field(&mut self, owner: &str, doc: &FieldDoc) -> Result<FieldSpec, SchemaError> {
        let path = format!("{}.{}", owner, doc.field);
        let invalid = |message: &str| SchemaError::InvalidField {
            owner: path.clone(),
            message: message.to_string(),
        };
        let builtin = BuiltinType::from_str(&doc.type_name).ok();

        let mut kind = match builtin {
            Some(BuiltinType::Skip) => {
                if doc.pointer {
                    return Err(invalid("skip element cannot be marked as pointer"));
                }
                TypeKind::SkipPadding(doc.offset.ok_or_else(|| invalid("skip needs `offset`"))?)
            }
            Some(BuiltinType::UTF16StringFixedSize) => {
                let bytes = doc
                    .offset
                    .ok_or_else(|| invalid("fixed size string needs `offset`"))?;
                let char16 = Scalar::new(2, ScalarRepr::Char16);
                TypeKind::FixedArray(Box::new(TypeKind::Scalar(char16)), (bytes / 2) as usize)
            }
            Some(BuiltinType::UTF8StringFixedSize) => {
                let bytes = doc
                    .offset
                    .ok_or_else(|| invalid("fixed size string needs `offset`"))?;
                let byte = Scalar::new(1, ScalarRepr::Unsigned);
                TypeKind::FixedArray(Box::new(TypeKind::Scalar(byte)), bytes as usize)
            }
            Some(BuiltinType::StdVector) => {
                let elem = self.parameter_type(&path, doc.vectortype.as_deref(), "vectortype")?;
                TypeKind::DynamicArray(elem)
            }
            Some(BuiltinType::StdMap) => {
                let key = self.parameter_type(&path, doc.keytype.as_deref(), "keytype")?;
                let value = self.parameter_type(&path, doc.valuetype.as_deref(), "valuetype")?;
                TypeKind::OrderedMap {
                    key,
                    value: Some(value),
                }
            }
            Some(BuiltinType::StdSet) => {
                let key = self.parameter_type(&path, doc.keytype.as_deref(), "keytype")?;
                TypeKind::OrderedMap { key, value: None }
            }
            Some(BuiltinType::StdString) => TypeKind::ForeignString(1),
            Some(BuiltinType::StdWstring) => TypeKind::ForeignString(2),
            Some(BuiltinType::VirtualFunctionTable) => {
                if let Some(functions) = &doc.functions {
                    self.add_functions(owner, functions)?;
                }
                TypeKind::VTable(owner.to_string())
            }
            Some(other) => match other.scalar() {
                Some(scalar) => TypeKind::Scalar(scalar),
                None => return Err(invalid("type needs arguments")),
            },
            None => self.catalog.names.resolve(&doc.type_name).ok_or_else(|| {
                SchemaError::UnresolvedType {
                    owner: path.clone(),
                    name: doc.type_name.clone(),
                }
            })?,
        };

        self.register_titles(&path, builtin, doc)?;

        if doc.pointer && !matches!(kind, TypeKind::OwnedPointer(_)) {
            kind = TypeKind::PointerTo(Box::new(kind));
        }
        if let Some(count) = doc.count {
            if count == 0 {
                return Err(invalid("`count` must be at least 1"));
            }
            kind = TypeKind::FixedArray(Box::new(kind), count);
        }

        Ok(FieldSpec {
            name: doc.field.clone(),
            kind,
            type_name: doc.type_name.clone(),
            declared_offset: doc.declared_offset,
            comment: doc.comment.clone(),
        })
    }

    /// Container element type; defaults to `UnsignedQword` when missing.
    fn parameter_type(
        &self,
        path: &str,
        name: Option<&str>,
        key: &str,
    ) -> Result<String, SchemaError> {
        let Some(name) = name else {
            debug!("No {} specified for ({}), using UnsignedQword", key, path);
            return Ok(BuiltinType::UnsignedQword.to_string());
        };
        if self.catalog.names.resolve(name).is_none() {
            return Err(SchemaError::UnresolvedType {
                owner: path.to_string(),
                name: name.to_string(),
            });
        }
        Ok(name.to_string())
    }

    fn register_titles(
        &mut self,
        path: &str,
        builtin: Option<BuiltinType>,
        doc: &FieldDoc,
    ) -> Result<(), SchemaError> {
        let is_flags = builtin.is_some_and(BuiltinType::is_flags);
        let is_state = builtin.is_some_and(BuiltinType::is_state);
        let invalid = |message: &str| SchemaError::InvalidField {
            owner: path.to_string(),
            message: message.to_string(),
        };

        if doc.flags.is_some() && !is_flags {
            return Err(invalid("`flags` on a non-flags field"));
        }
        if doc.states.is_some() && !is_state {
            return Err(invalid("`states` on a non-state field"));
        }
        if !is_flags && !is_state {
            return Ok(());
        }

        if let Some(ref_name) = &doc.ref_name {
            if !self.catalog.title_tables.contains_key(ref_name) {
                return Err(SchemaError::UnknownRef {
                    owner: path.to_string(),
                    name: ref_name.clone(),
                });
            }
            self.catalog
                .title_refs
                .insert(path.to_string(), ref_name.clone());
        } else if let Some(titles) = doc.flags.as_ref().or(doc.states.as_ref()) {
            let table = parse_titles(path, titles)?;
            self.catalog.title_tables.insert(path.to_string(), table);
            self.catalog
                .title_refs
                .insert(path.to_string(), path.to_string());
        } else {
            debug!("Missing titles or `ref` in field ({})", path);
        }
        Ok(())
    }

    /// Reject structs that contain themselves by value.
    fn check_embedding(&self) -> Result<(), SchemaError> {
        let tables = [
            &self.catalog.builtin_fields,
            &self.catalog.pointer_fields,
            &self.catalog.inline_fields,
            &self.catalog.entity_fields,
        ];
        let fields_of = |name: &str| tables.iter().find_map(|t| t.get(name));

        let mut names: Vec<&String> = tables.iter().flat_map(|t| t.keys()).collect();
        names.sort();

        let mut done = HashSet::new();
        for name in names {
            let mut stack = vec![name.clone()];
            visit_embedded(name, &fields_of, &mut stack, &mut done)?;
        }
        Ok(())
    }
}

fn visit_embedded<'a>(
    name: &str,
    fields_of: &dyn Fn(&str) -> Option<&'a Vec<FieldSpec>>,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
) -> Result<(), SchemaError> {
    if done.contains(name) {
        return Ok(());
    }
    for field in fields_of(name).into_iter().flatten() {
        let Some(embedded) = embedded_struct(&field.kind) else {
            continue;
        };
        stack.push(embedded.to_string());
        if stack[..stack.len() - 1].iter().any(|s| s == embedded) {
            return Err(SchemaError::RecursiveEmbedding {
                name: embedded.to_string(),
                path: stack.join(" -> "),
            });
        }
        visit_embedded(embedded, fields_of, stack, done)?;
        stack.pop();
    }
    done.insert(name.to_string());
    Ok(())
}

fn embedded_struct(kind: &TypeKind) -> Option<&str> {
    match kind {
        TypeKind::FixedArray(elem, _) => embedded_struct(elem),
        other => other.struct_name(),
    }
}

fn push_unique(owner: &str, fields: &mut Vec<FieldSpec>, field: FieldSpec) -> Result<(), SchemaError> {
    if fields.iter().any(|f| f.name == field.name) {
        return Err(SchemaError::DuplicateField {
            owner: owner.to_string(),
            field: field.name,
        });
    }
    fields.push(field);
    Ok(())
}

fn parse_titles(
    owner: &str,
    titles: &BTreeMap<String, String>,
) -> Result<BTreeMap<i64, String>, SchemaError> {
    titles
        .iter()
        .map(|(key, title)| {
            let trimmed = key.trim();
            let parsed = match trimmed.strip_prefix("0x") {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => trimmed.parse::<i64>(),
            };
            parsed
                .map(|value| (value, title.clone()))
                .map_err(|_| SchemaError::InvalidField {
                    owner: owner.to_string(),
                    message: format!("title key `{}` is not a number", key),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::{SAMPLE_SCHEMA, sample_catalog};

    fn load_err(json: &str) -> SchemaError {
        TypeCatalog::from_json(json).unwrap_err()
    }

    #[test]
    fn test_sample_schema_loads() {
        let catalog = sample_catalog();
        assert_eq!(catalog.struct_count(), 5);
        assert_eq!(catalog.entity_class_count(), 4);
        assert_eq!(catalog.class_rule_count(), 3);
        assert_eq!(
            catalog.struct_names(),
            vec!["Child", "Illumination", "Parent", "State", "Vec2"]
        );
    }

    #[test]
    fn test_fields_of_uses_the_right_table() {
        let catalog = sample_catalog();
        assert_eq!(catalog.fields_of(FieldSelector::InlineStruct("Vec2")).len(), 2);
        assert_eq!(catalog.fields_of(FieldSelector::Pointer("Illumination")).len(), 2);
        assert_eq!(catalog.fields_of(FieldSelector::Builtin("Parent")).len(), 1);
        assert_eq!(catalog.fields_of(FieldSelector::EntitySubclass("Movable")).len(), 2);
        // Each table is independent
        assert!(catalog.fields_of(FieldSelector::Builtin("Vec2")).is_empty());
        assert!(catalog.fields_of(FieldSelector::Builtin("Nope")).is_empty());
    }

    #[test]
    fn test_field_kinds() {
        let catalog = sample_catalog();
        let state = catalog.fields_of(FieldSelector::Builtin("State"));
        let kind = |name: &str| {
            state
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.kind.clone())
                .unwrap()
        };

        assert_eq!(kind("pad"), TypeKind::SkipPadding(4));
        assert_eq!(kind("illumination"), TypeKind::OwnedPointer("Illumination".into()));
        assert_eq!(kind("position"), TypeKind::InlineStruct("Vec2".into()));
        assert_eq!(kind("items"), TypeKind::DynamicArray("UnsignedDword".into()));
        assert_eq!(
            kind("lookup"),
            TypeKind::OrderedMap {
                key: "Dword".into(),
                value: Some("Vec2".into())
            }
        );
        assert_eq!(kind("name"), TypeKind::ForeignString(1));
        assert_eq!(
            kind("next"),
            TypeKind::PointerTo(Box::new(TypeKind::Builtin("State".into())))
        );
        assert!(matches!(kind("corners"), TypeKind::FixedArray(_, 2)));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let json = r#"{ "fields": { "Dup": [
            { "field": "a", "type": "Byte" },
            { "field": "a", "type": "Word" }
        ] } }"#;
        assert_eq!(
            load_err(json),
            SchemaError::DuplicateField {
                owner: "Dup".into(),
                field: "a".into()
            }
        );
    }

    #[test]
    fn test_unresolved_type_names_offender() {
        let json = r#"{ "fields": { "State": [ { "field": "player", "type": "PlayerInfo" } ] } }"#;
        let err = load_err(json);
        assert_eq!(
            err.to_string(),
            "Unresolved type `PlayerInfo` referenced by (State.player)"
        );
    }

    #[test]
    fn test_unresolved_container_parameter() {
        let json = r#"{ "fields": { "S": [
            { "field": "m", "type": "StdMap", "keytype": "Dword", "valuetype": "Ghost" }
        ] } }"#;
        assert!(matches!(load_err(json), SchemaError::UnresolvedType { name, .. } if name == "Ghost"));
    }

    #[test]
    fn test_missing_container_parameter_defaults() {
        let json = r#"{ "fields": { "S": [ { "field": "v", "type": "StdVector" } ] } }"#;
        let catalog = TypeCatalog::from_json(json).unwrap();
        let fields = catalog.fields_of(FieldSelector::Builtin("S"));
        assert_eq!(fields[0].kind, TypeKind::DynamicArray("UnsignedQword".into()));
    }

    #[test]
    fn test_unknown_ref_rejected() {
        let json = r#"{ "fields": { "S": [ { "field": "f", "type": "Flags8", "ref": "missing" } ] } }"#;
        assert_eq!(
            load_err(json),
            SchemaError::UnknownRef {
                owner: "S.f".into(),
                name: "missing".into()
            }
        );
    }

    #[test]
    fn test_pointer_type_without_fields_rejected() {
        let json = r#"{ "pointer_types": ["Ghost"] }"#;
        assert!(matches!(load_err(json), SchemaError::UnresolvedType { owner, .. } if owner == "pointer_types"));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let json = r#"{ "entity_class_hierarchy": { "Player": "Movable" } }"#;
        assert_eq!(
            load_err(json),
            SchemaError::UnknownParent {
                class: "Player".into(),
                parent: "Movable".into()
            }
        );
    }

    #[test]
    fn test_cyclic_hierarchy_rejected() {
        let json = r#"{ "entity_class_hierarchy": { "A": "B", "B": "C", "C": "A" } }"#;
        assert!(matches!(load_err(json), SchemaError::CyclicHierarchy { .. }));
    }

    fn linear_hierarchy(depth: usize) -> String {
        let entries: Vec<String> = (0..depth)
            .map(|i| {
                let parent = if i == 0 {
                    ROOT_ENTITY_CLASS.to_string()
                } else {
                    format!("C{}", i - 1)
                };
                format!("\"C{}\": \"{}\"", i, parent)
            })
            .collect();
        format!("{{ \"entity_class_hierarchy\": {{ {} }} }}", entries.join(", "))
    }

    #[test]
    fn test_hierarchy_depth_limit() {
        let catalog = TypeCatalog::from_json(&linear_hierarchy(MAX_HIERARCHY_DEPTH)).unwrap();
        let chain = catalog.ancestors_of("C31");
        assert_eq!(chain.len(), MAX_HIERARCHY_DEPTH + 1);
        assert_eq!(chain[0], ROOT_ENTITY_CLASS);
        assert_eq!(chain.last().unwrap(), "C31");

        assert!(matches!(
            load_err(&linear_hierarchy(MAX_HIERARCHY_DEPTH + 1)),
            SchemaError::HierarchyTooDeep { .. }
        ));
    }

    #[test]
    fn test_every_class_chain_ends_at_root() {
        let catalog = sample_catalog();
        for class in ["Movable", "Player", "Floor", ROOT_ENTITY_CLASS] {
            let chain = catalog.ancestors_of(class);
            assert_eq!(chain[0], ROOT_ENTITY_CLASS);
            assert_eq!(chain.last().unwrap(), class);
            assert!(chain.len() <= MAX_HIERARCHY_DEPTH + 1);
        }
    }

    #[test]
    fn test_class_rules_first_match_wins() {
        let catalog = sample_catalog();
        assert_eq!(catalog.class_for_entity_name("ENT_TYPE_CHAR_ANA"), Some("Player"));
        assert_eq!(catalog.class_for_entity_name("ENT_TYPE_FLOOR_GENERIC"), Some("Floor"));
        assert_eq!(catalog.class_for_entity_name("ENT_TYPE_ITEM_ROCK"), Some("Movable"));
        // Full match only
        assert_eq!(catalog.class_for_entity_name("X_ENT_TYPE_CHAR_ANA"), None);
    }

    #[test]
    fn test_class_chain_root_first() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.class_chain_of("ENT_TYPE_CHAR_ANA"),
            vec!["Entity", "Movable", "Player"]
        );
        assert_eq!(catalog.class_chain_of("SOMETHING_ELSE"), vec!["Entity"]);
        assert_eq!(catalog.ancestors_of("NotAClass"), vec!["Entity"]);
    }

    #[test]
    fn test_invalid_class_rule_rejected() {
        let json = r#"{ "default_entity_types": [ { "pattern": "ENT_(", "class": "Entity" } ] }"#;
        assert!(matches!(load_err(json), SchemaError::InvalidClassRule { .. }));

        let json = r#"{ "default_entity_types": [ { "pattern": "ENT_.*", "class": "Ghost" } ] }"#;
        assert!(matches!(load_err(json), SchemaError::UnknownRuleClass { .. }));
    }

    #[test]
    fn test_virtual_functions_root_first() {
        let catalog = sample_catalog();
        let names: Vec<&str> = catalog
            .virtual_functions_of("Player")
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["dtor", "kill", "damage"]);

        let damage = catalog.virtual_functions_of("Movable")[2];
        assert_eq!(damage.index, 91);
        assert_eq!(damage.owner, "Movable");
        assert_eq!(damage.return_type, "bool");

        assert!(catalog.virtual_functions_of("Vec2").is_empty());
        assert!(catalog.virtual_functions_of("Unknown").is_empty());
    }

    #[test]
    fn test_titles_and_sentinels() {
        let catalog = sample_catalog();
        assert_eq!(catalog.title_for_state("State", "screen", 12), "Level");
        assert_eq!(catalog.title_for_state("State", "screen", 99), UNKNOWN_STATE_TITLE);
        assert_eq!(catalog.title_for_flag("State", "flags", 2), "Indestructible");
        assert_eq!(catalog.title_for_flag("Entity", "flags", 1), "Invisible");
        assert_eq!(catalog.title_for_flag("State", "flags", 31), UNKNOWN_FLAG_TITLE);
        assert_eq!(catalog.title_for_flag("Nope", "nope", 1), UNKNOWN_FLAG_TITLE);
    }

    #[test]
    fn test_titles_on_wrong_kind_rejected() {
        let json = r#"{ "fields": { "S": [ { "field": "f", "type": "Dword", "flags": { "1": "x" } } ] } }"#;
        assert!(matches!(load_err(json), SchemaError::InvalidField { .. }));
    }

    #[test]
    fn test_sizes() {
        let catalog = sample_catalog();
        let size = |name: &str| catalog.size_of(&catalog.resolve_type(name).unwrap());
        assert_eq!(size("Vec2"), 8);
        assert_eq!(size("Child"), 6);
        assert_eq!(size("Illumination"), 8);
        assert_eq!(size("State"), 136);
        assert_eq!(size("StdString"), 32);
        // Entity classes include their ancestors
        assert_eq!(size("Movable"), 25);
    }

    #[test]
    fn test_declared_offset_overrides_cursor() {
        let json = r#"{ "fields": { "Holey": [
            { "field": "a", "type": "Dword" },
            { "field": "b", "type": "Dword", "declared_offset": 16 },
            { "field": "c", "type": "Byte" }
        ] } }"#;
        let catalog = TypeCatalog::from_json(json).unwrap();
        let fields = catalog.fields_of(FieldSelector::Builtin("Holey"));
        assert_eq!(catalog.struct_size(fields), 21);
    }

    #[test]
    fn test_alignment_of() {
        let catalog = sample_catalog();
        assert_eq!(catalog.alignment_of("Byte"), 1);
        assert_eq!(catalog.alignment_of("UnsignedWord"), 2);
        assert_eq!(catalog.alignment_of("Float"), 4);
        assert_eq!(catalog.alignment_of("Qword"), 8);
        assert_eq!(catalog.alignment_of("StdString"), 8);
        assert_eq!(catalog.alignment_of("Vec2"), 4);
        // Undeclared struct alignment
        assert_eq!(catalog.alignment_of("Child"), 8);
    }

    #[test]
    fn test_invalid_alignment_rejected() {
        let json = r#"{ "struct_alignments": { "Vec2": 16 } }"#;
        assert_eq!(
            load_err(json),
            SchemaError::InvalidAlignment {
                name: "Vec2".into(),
                alignment: 16
            }
        );
    }

    #[test]
    fn test_recursive_embedding_rejected() {
        let json = r#"{ "fields": {
            "A": [ { "field": "b", "type": "B" } ],
            "B": [ { "field": "a", "type": "A", "count": 2 } ]
        } }"#;
        match load_err(json) {
            SchemaError::RecursiveEmbedding { path, .. } => assert_eq!(path, "A -> B -> A"),
            other => panic!("unexpected error: {:?}", other),
        }

        // Through a pointer is fine
        let json = r#"{ "fields": { "Node": [ { "field": "next", "type": "Node", "pointer": true } ] } }"#;
        assert!(TypeCatalog::from_json(json).is_ok());
    }

    #[test]
    fn test_value_shape() {
        let catalog = sample_catalog();
        let shape = catalog.value_shape("Vec2").unwrap();
        assert_eq!(shape.size, 8);
        assert_eq!(shape.alignment, 4);
        assert!(catalog.value_shape("Ghost").is_none());
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(load_err("{ not json"), SchemaError::Malformed(_)));
        assert!(matches!(
            load_err(r#"{ "fields": { "S": [ { "field": "x", "type": "Skip" } ] } }"#),
            SchemaError::InvalidField { .. }
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, SAMPLE_SCHEMA).unwrap();
        let catalog = TypeCatalog::from_file(&path).unwrap();
        assert_eq!(catalog.struct_count(), 5);

        let missing = TypeCatalog::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(missing.is_not_found());
    }
}
