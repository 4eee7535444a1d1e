//! Choosing one candidate out of the types an artifact exports.

use crate::loader::Candidate;
use crate::specialize::SpecializeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// How to pick the function type when an artifact exports several.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Lowest type name in lexicographic order.
    #[default]
    FirstByName,
    /// The type with exactly this name.
    Named(String),
}

impl SelectionPolicy {
    /// Pick a candidate. `path` only feeds the error message.
    pub fn select(
        &self,
        mut candidates: Vec<Candidate>,
        contract: &str,
        path: &Path,
    ) -> Result<Candidate, SpecializeError> {
        if candidates.is_empty() {
            return Err(SpecializeError::NoImplementationFound {
                contract: contract.to_string(),
                path: path.to_path_buf(),
            });
        }

        candidates.sort_by(|a, b| a.type_name.cmp(&b.type_name));

        match self {
            SelectionPolicy::FirstByName => {
                if candidates.len() > 1 {
                    let names: Vec<&str> = candidates.iter().map(|c| c.type_name()).collect();
                    warn!(
                        "Found {} implementations of {} ({}), using {}",
                        candidates.len(),
                        contract,
                        names.join(", "),
                        names[0]
                    );
                }
                Ok(candidates.swap_remove(0))
            }
            SelectionPolicy::Named(name) => {
                match candidates.iter().position(|c| &c.type_name == name) {
                    Some(index) => Ok(candidates.swap_remove(index)),
                    None => Err(SpecializeError::CandidateNotFound {
                        requested: name.clone(),
                        available: candidates.into_iter().map(|c| c.type_name).collect(),
                    }),
                }
            }
        }
    }
}

impl From<Option<String>> for SelectionPolicy {
    fn from(function_type: Option<String>) -> Self {
        match function_type {
            Some(name) => SelectionPolicy::Named(name),
            None => SelectionPolicy::FirstByName,
        }
    }
}
