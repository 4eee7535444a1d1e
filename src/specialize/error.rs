use crate::loader::LoadError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a specialization attempt failed. The container state is left as it
/// was in every case.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpecializeError {
    #[error("could not load user artifact: {0}")]
    Load(#[from] LoadError),

    #[error("no implementation of {contract} found in {path}")]
    NoImplementationFound { contract: String, path: PathBuf },

    #[error("user type {requested} not found in artifact (available: {})", available.join(", "))]
    CandidateNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("type {type_name} could not be used as {contract}: {reason}")]
    ContractMismatch {
        type_name: String,
        contract: String,
        reason: String,
    },

    #[error("could not instantiate user type {type_name}: {reason}")]
    Instantiation { type_name: String, reason: String },

    #[error("specialization timed out after {0:?}")]
    Timeout(Duration),

    #[error("specialization task failed: {0}")]
    Task(String),
}
