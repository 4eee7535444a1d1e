//! Artifact loading and type discovery.
//!
//! An artifact exports a table of [`FenvTypeDescriptor`]s. Loading copies that
//! table out of the library; discovery filters it by declared contract.

mod dylib;
mod in_process;

pub use dylib::DylibLoader;
pub use in_process::InProcessLoader;

use fenv_sdk::{
    ConstructFn, DestroyFn, FenvTypeDescriptor, FenvTypeTable, FreeFn, HandleFn,
};
use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Error raised when a path cannot be turned into a loaded artifact.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("artifact not found at {0}")]
    NotFound(PathBuf),

    #[error("could not read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not stage artifact in {dir}: {source}")]
    Stage {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a loadable library: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("{path} does not export {symbol}: {source}")]
    MissingSymbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },
}

/// Turns a filesystem path into a [`LoadedArtifact`].
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError>;
}

/// A type found in an artifact, with the entry points it declared.
#[derive(Clone)]
pub struct Candidate {
    pub(crate) type_name: String,
    pub(crate) contract: String,
    pub(crate) abi_version: u32,
    pub(crate) construct: Option<ConstructFn>,
    pub(crate) handle: Option<HandleFn>,
    pub(crate) free: Option<FreeFn>,
    pub(crate) destroy: Option<DestroyFn>,
    pub(crate) library: Option<Arc<Library>>,
}

impl Candidate {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn abi_version(&self) -> u32 {
        self.abi_version
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("type_name", &self.type_name)
            .field("contract", &self.contract)
            .field("abi_version", &self.abi_version)
            .field("construct", &self.construct.is_some())
            .finish()
    }
}

/// Type metadata of one artifact, valid for a single specialization.
pub struct LoadedArtifact {
    origin: String,
    types: Vec<Candidate>,
}

impl LoadedArtifact {
    /// Copy a type table out of the library that produced it.
    ///
    /// # Safety
    ///
    /// `table` must point at `len` valid descriptors whose name and contract
    /// slices are valid UTF-8 byte ranges, all owned by `library` (or by the
    /// host binary when `library` is `None`).
    pub(crate) unsafe fn from_table(
        origin: impl Into<String>,
        table: FenvTypeTable,
        library: Option<Arc<Library>>,
    ) -> Self {
        let descriptors: &[FenvTypeDescriptor] = if table.ptr.is_null() || table.len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(table.ptr, table.len)
        };

        let types = descriptors
            .iter()
            .map(|d| Candidate {
                type_name: String::from_utf8_lossy(d.name.as_bytes()).to_string(),
                contract: String::from_utf8_lossy(d.contract.as_bytes()).to_string(),
                abi_version: d.abi_version,
                construct: d.construct,
                handle: d.handle,
                free: d.free,
                destroy: d.destroy,
                library: library.clone(),
            })
            .collect();

        Self {
            origin: origin.into(),
            types,
        }
    }

    /// Where the artifact came from, for logging.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Number of types the artifact exports, whatever their contract.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// All exported types declaring `contract`, in table order.
    pub fn find_implementations(&self, contract: &str) -> Vec<Candidate> {
        self.types
            .iter()
            .filter(|c| c.contract == contract)
            .cloned()
            .collect()
    }
}
