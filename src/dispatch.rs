//! Forwarding requests to the loaded function.

use crate::function::FenvError;
use crate::http::{FenvRequest, FenvResponse};
use crate::specialize::Specializer;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a request could not be answered by the function.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No function has been loaded yet.
    #[error("Generic container: no requests supported")]
    NotReady,

    /// The function's own error, untouched.
    #[error(transparent)]
    Handler(FenvError),

    #[error("function did not respond within {0:?}")]
    Timeout(Duration),
}

/// Routes requests to whatever the [`Specializer`] currently holds.
#[derive(Clone)]
pub struct Dispatcher {
    specializer: Arc<Specializer>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(specializer: Arc<Specializer>) -> Self {
        Self {
            specializer,
            timeout: None,
        }
    }

    /// Bound each handler call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn dispatch(&self, request: FenvRequest) -> Result<FenvResponse, DispatchError> {
        // The slot lock is released here; the call runs on a cloned handle.
        let function = self
            .specializer
            .current()
            .await
            .ok_or(DispatchError::NotReady)?;

        let call = function.handle(request);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| DispatchError::Timeout(timeout))?,
            None => call.await,
        };

        result.map_err(DispatchError::Handler)
    }
}
