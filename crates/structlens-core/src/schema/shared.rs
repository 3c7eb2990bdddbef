use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::error::Result;
use crate::schema::{SchemaDocument, TypeCatalog};

/// Process-wide handle to the active catalog.
///
/// Readers take an `Arc` snapshot that stays valid across reloads. A reload
/// builds the replacement completely before swapping it in, so a failed
/// load leaves the previous catalog active.
#[derive(Debug, Default)]
pub struct SharedCatalog {
    current: RwLock<Arc<TypeCatalog>>,
}

impl SharedCatalog {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn snapshot(&self) -> Arc<TypeCatalog> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, catalog: TypeCatalog) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
    }

    pub fn reload(&self, doc: &SchemaDocument) -> Result<()> {
        let catalog = TypeCatalog::load(doc).inspect_err(|e| {
            warn!("Schema reload rejected, keeping previous catalog: {}", e);
        })?;
        self.replace(catalog);
        info!("Schema reloaded");
        Ok(())
    }

    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let catalog = TypeCatalog::from_file(path).inspect_err(|e| {
            warn!("Schema reload rejected, keeping previous catalog: {}", e);
        })?;
        self.replace(catalog);
        Ok(())
    }

    /// Swap in an empty catalog
    pub fn reset(&self) {
        self.replace(TypeCatalog::default());
    }
}
