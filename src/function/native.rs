//! Function instances living behind the artifact C ABI.

use crate::function::handler::{FenvError, FenvFunction};
use crate::http::{FenvRequest, FenvResponse};
use async_trait::async_trait;
use fenv_sdk::{DestroyFn, FenvSlice, FenvWireOutcome, FreeFn, HandleFn};
use libloading::Library;
use std::ffi::c_void;
use std::sync::Arc;
use tracing::debug;

/// Entry points and instance pointer of one constructed user type.
struct Instance {
    ptr: *mut c_void,
    handle: HandleFn,
    free: FreeFn,
    destroy: DestroyFn,
    // Dropped after `destroy` runs, keeps the code mapped while the instance lives.
    _library: Option<Arc<Library>>,
}

// The SDK requires `Function: Send + Sync`, so the instance may be shared.
unsafe impl Send for Instance {}
unsafe impl Sync for Instance {}

impl Instance {
    fn call(&self, request: &[u8]) -> Result<Vec<u8>, FenvError> {
        let owned = unsafe {
            (self.handle)(
                self.ptr,
                FenvSlice {
                    ptr: request.as_ptr(),
                    len: request.len(),
                },
            )
        };

        if owned.ptr.is_null() && owned.len != 0 {
            return Err(FenvError::Abi("handle returned null pointer".to_string()));
        }

        let bytes = if owned.len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(owned.ptr, owned.len).to_vec() }
        };

        unsafe { (self.free)(owned) };
        Ok(bytes)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.ptr) };
    }
}

/// A user function instantiated from an artifact's type table.
pub struct NativeFunction {
    type_name: String,
    instance: Arc<Instance>,
}

impl NativeFunction {
    /// Take ownership of a constructed instance.
    ///
    /// # Safety
    ///
    /// `ptr` must be a non-null instance returned by the `construct` entry
    /// point of the same descriptor as `handle`, `free` and `destroy`, and
    /// `library` must keep that code loaded.
    pub(crate) unsafe fn from_raw(
        type_name: String,
        ptr: *mut c_void,
        handle: HandleFn,
        free: FreeFn,
        destroy: DestroyFn,
        library: Option<Arc<Library>>,
    ) -> Self {
        Self {
            type_name,
            instance: Arc::new(Instance {
                ptr,
                handle,
                free,
                destroy,
                _library: library,
            }),
        }
    }
}

#[async_trait]
impl FenvFunction for NativeFunction {
    async fn handle(&self, request: FenvRequest) -> Result<FenvResponse, FenvError> {
        let wire = request.into_wire();
        let bytes = fenv_sdk::encode_request(&wire).map_err(|e| FenvError::Codec(e.to_string()))?;

        let instance = self.instance.clone();
        let resp_bytes = tokio::task::spawn_blocking(move || instance.call(&bytes)).await??;
        debug!("{} returned {} bytes", self.type_name, resp_bytes.len());

        match fenv_sdk::decode_outcome(&resp_bytes).map_err(|e| FenvError::Codec(e.to_string()))? {
            FenvWireOutcome::Ok(response) => Ok(response.into()),
            FenvWireOutcome::Err(message) => Err(FenvError::Handler(message)),
        }
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}
