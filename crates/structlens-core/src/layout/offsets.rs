use std::collections::HashMap;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::schema::TypeKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetEntry {
    /// Dot-joined qualified path
    pub path: String,
    /// Absolute address; 0 when unresolvable
    pub address: u64,
    pub kind: TypeKind,
}

/// Qualified path -> absolute address, in walk order.
#[derive(Debug, Clone, Default)]
pub struct OffsetMap {
    entries: Vec<OffsetEntry>,
    index: HashMap<String, usize>,
}

impl OffsetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path`. A path that is already present keeps its first
    /// address.
    pub fn insert(&mut self, path: impl Into<String>, address: u64, kind: TypeKind) -> bool {
        let path = path.into();
        if self.index.contains_key(&path) {
            warn!("Duplicate offset path ignored: {}", path);
            return false;
        }
        self.index.insert(path.clone(), self.entries.len());
        self.entries.push(OffsetEntry {
            path,
            address,
            kind,
        });
        true
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.entry(path).map(|e| e.address)
    }

    pub fn entry(&self, path: &str) -> Option<&OffsetEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OffsetEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[OffsetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(address, "prefix.path")` pairs for debugger labels. Unresolved
    /// entries are skipped.
    pub fn labels(&self, prefix: &str) -> Vec<(u64, String)> {
        self.entries
            .iter()
            .filter(|e| e.address != 0)
            .map(|e| (e.address, join_path(prefix, &e.path)))
            .collect()
    }
}

impl PartialEq for OffsetMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for OffsetMap {}

impl Serialize for OffsetMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.entries)
    }
}

impl<'a> IntoIterator for &'a OffsetMap {
    type Item = &'a OffsetEntry;
    type IntoIter = std::slice::Iter<'a, OffsetEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
