//! Loading artifacts as native dynamic libraries.

use crate::loader::{ArtifactLoader, LoadError, LoadedArtifact};
use fenv_sdk::{TypesFn, TYPES_SYMBOL};
use libloading::{Library, Symbol};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Opens artifacts with the platform dynamic loader.
///
/// Every load works on a fresh copy of the file: the platform loader
/// deduplicates by path, which would otherwise hand back the library opened
/// by an earlier specialization. Copies get a random name and are created
/// exclusively, so nothing already in the scratch directory is written to.
#[derive(Debug, Clone)]
pub struct DylibLoader {
    scratch_dir: PathBuf,
}

impl DylibLoader {
    /// Create a loader that stages copies under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    fn stage(&self, path: &Path) -> Result<NamedTempFile, LoadError> {
        let mut staged = tempfile::Builder::new()
            .prefix("fenv-artifact-")
            .suffix(".so")
            .tempfile_in(&self.scratch_dir)
            .map_err(|source| LoadError::Stage {
                dir: self.scratch_dir.clone(),
                source,
            })?;

        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut source = File::open(path).map_err(io_err)?;
        std::io::copy(&mut source, staged.as_file_mut()).map_err(io_err)?;

        debug!("Staged {} at {}", path.display(), staged.path().display());
        Ok(staged)
    }
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl ArtifactLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<LoadedArtifact, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let staged = self.stage(path)?;
        let opened = open_isolated(staged.path());

        // The mapping stays valid once the file is unlinked.
        let staged_path = staged.path().to_path_buf();
        if let Err(e) = staged.close() {
            warn!("Could not remove staged artifact {}: {}", staged_path.display(), e);
        }

        let library = Arc::new(opened.map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?);

        let table = unsafe {
            let types: Symbol<TypesFn> =
                library
                    .get(TYPES_SYMBOL)
                    .map_err(|source| LoadError::MissingSymbol {
                        path: path.to_path_buf(),
                        symbol: String::from_utf8_lossy(TYPES_SYMBOL).to_string(),
                        source,
                    })?;
            types()
        };

        Ok(unsafe { LoadedArtifact::from_table(path.display().to_string(), table, Some(library)) })
    }
}

/// Open without adding the library's symbols to the global namespace.
#[cfg(unix)]
fn open_isolated(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_isolated(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}
