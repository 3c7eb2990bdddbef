use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    #[error("Invalid byte pattern: {0}")]
    InvalidPattern(String),

    #[error("Refresh already in flight for object at {0:#x}")]
    RefreshInFlight(u64),

    #[error("Failed to load virtual table: {0}")]
    VTableLoadFailed(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Check if this error came from an unreadable remote address
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Error::MemoryReadFailed { .. })
    }

    pub(crate) fn read_failed(address: u64, message: impl Into<String>) -> Self {
        Error::MemoryReadFailed {
            address,
            message: message.into(),
        }
    }
}

/// Reasons a schema document is rejected by `TypeCatalog::load`.
///
/// Every variant names the first offending reference so the message can be
/// shown to the user as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Malformed schema document: {0}")]
    Malformed(String),

    #[error("Unresolved type `{name}` referenced by ({owner})")]
    UnresolvedType { owner: String, name: String },

    #[error("Struct ({owner}) contains duplicate field name: ({field})")]
    DuplicateField { owner: String, field: String },

    #[error("Unknown ref `{name}` referenced by ({owner})")]
    UnknownRef { owner: String, name: String },

    #[error("Entity class `{class}` has unknown parent `{parent}`")]
    UnknownParent { class: String, parent: String },

    #[error("Entity class hierarchy contains a cycle through `{class}`")]
    CyclicHierarchy { class: String },

    #[error("Entity class `{class}` is more than {limit} levels below the root")]
    HierarchyTooDeep { class: String, limit: usize },

    #[error("Invalid class rule `{pattern}`: {message}")]
    InvalidClassRule { pattern: String, message: String },

    #[error("Class rule `{pattern}` assigns unknown class `{class}`")]
    UnknownRuleClass { pattern: String, class: String },

    #[error("Struct `{name}` embeds itself by value ({path})")]
    RecursiveEmbedding { name: String, path: String },

    #[error("Invalid field ({owner}): {message}")]
    InvalidField { owner: String, message: String },

    #[error("Invalid alignment {alignment} for struct `{name}`, allowed range: 1-8")]
    InvalidAlignment { name: String, alignment: u8 },
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        SchemaError::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.is_not_found());

        let other_io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err2 = Error::Io(other_io_err);
        assert!(!err2.is_not_found());
    }

    #[test]
    fn test_schema_error_names_offender() {
        let err = Error::from(SchemaError::UnresolvedType {
            owner: "State.player".to_string(),
            name: "PlayerInfo".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Unresolved type `PlayerInfo` referenced by (State.player)"
        );
    }

    #[test]
    fn test_read_failed_is_unreadable() {
        let err = Error::read_failed(0x1000, "unmapped");
        assert!(err.is_unreadable());
        assert!(err.to_string().contains("0x1000"));
    }
}
