//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the
//! engine, so no process-wide environment variables are read while operations
//! are being handled. The catalog in particular is loaded exactly once and
//! treated as immutable for the process lifetime.

use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};

/// Filename of a catalog override inside a data directory.
pub const CATALOG_FILE_NAME: &str = "catalog.yaml";

/// Engine configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    assessment_data_dir: PathBuf,
    catalog_file: Option<PathBuf>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if a catalog override is given
    /// but does not point at a file.
    pub fn new(
        assessment_data_dir: PathBuf,
        catalog_file: Option<PathBuf>,
    ) -> EngineResult<Self> {
        if let Some(path) = &catalog_file {
            if !path.is_file() {
                return Err(EngineError::InvalidInput(format!(
                    "catalog override is not a file: {}",
                    path.display()
                )));
            }
        }

        Ok(Self {
            assessment_data_dir,
            catalog_file,
        })
    }

    pub fn assessment_data_dir(&self) -> &Path {
        &self.assessment_data_dir
    }

    pub fn catalog_file(&self) -> Option<&Path> {
        self.catalog_file.as_deref()
    }

    /// Loads the domain catalog: the YAML override when configured, the
    /// built-in default otherwise.
    ///
    /// Intended to be called once at startup; the returned catalog is then
    /// shared read-only for the process lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CatalogRead`] if the override file cannot be
    /// read, or the parse/validation errors of [`Catalog::from_yaml`].
    pub fn load_catalog(&self) -> EngineResult<Catalog> {
        match &self.catalog_file {
            Some(path) => {
                let yaml_text =
                    std::fs::read_to_string(path).map_err(EngineError::CatalogRead)?;
                Catalog::from_yaml(&yaml_text)
            }
            None => Ok(Catalog::builtin()),
        }
    }
}

/// Resolve the catalog override inside a data directory, if present.
///
/// A data directory without a `catalog.yaml` uses the built-in catalog; that
/// is the normal case, not an error.
pub fn resolve_catalog_file(data_dir: &Path) -> Option<PathBuf> {
    let candidate = data_dir.join(CATALOG_FILE_NAME);
    candidate.is_file().then_some(candidate)
}
