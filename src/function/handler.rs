//! Host-side view of the function contract.

use crate::http::{FenvRequest, FenvResponse};
use async_trait::async_trait;

/// A function instance the container can route requests to.
///
/// The container holds exactly one of these after specialization and shares
/// it between all concurrent requests.
#[async_trait]
pub trait FenvFunction: Send + Sync {
    /// Handle one request. Errors are reported to the client as a generic
    /// server error.
    async fn handle(&self, request: FenvRequest) -> Result<FenvResponse, FenvError>;

    /// Name of the type this instance was built from.
    fn type_name(&self) -> &str;
}

/// Error raised while invoking a function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenvError {
    /// The function itself returned an error or panicked.
    #[error("function error: {0}")]
    Handler(String),
    /// Request or response bytes could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// The call across the artifact boundary failed.
    #[error("abi error: {0}")]
    Abi(String),
}

impl From<tokio::task::JoinError> for FenvError {
    fn from(err: tokio::task::JoinError) -> Self {
        FenvError::Abi(err.to_string())
    }
}
