//! `extern "C"` entry points generated for every exported [`Function`] type.
//!
//! Panics never cross the FFI boundary: a panicking constructor yields a null
//! instance and a panicking handler yields an error outcome.

use crate::{
    decode_request, encode_outcome, FenvOwned, FenvSlice, FenvWireOutcome, Function,
};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Build a `T` with its default constructor. Returns null if it panics.
pub unsafe extern "C" fn construct<T: Function + Default>() -> *mut c_void {
    match catch_unwind(T::default) {
        Ok(instance) => Box::into_raw(Box::new(instance)) as *mut c_void,
        Err(_) => std::ptr::null_mut(),
    }
}

/// Decode the request, call [`Function::handle`] and encode the outcome.
///
/// # Safety
///
/// `instance` must come from [`construct::<T>`] and `req` must be a valid
/// byte slice.
pub unsafe extern "C" fn handle<T: Function>(instance: *const c_void, req: FenvSlice) -> FenvOwned {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        if instance.is_null() {
            return FenvWireOutcome::Err("null function instance".to_string());
        }
        if req.ptr.is_null() && req.len != 0 {
            return FenvWireOutcome::Err("null request pointer with non-zero length".to_string());
        }

        let request = match decode_request(req.as_bytes()) {
            Ok(r) => r,
            Err(e) => return FenvWireOutcome::Err(format!("invalid request: {}", e)),
        };

        let function = &*(instance as *const T);
        match function.handle(request) {
            Ok(response) => FenvWireOutcome::Ok(response),
            Err(e) => FenvWireOutcome::Err(e.to_string()),
        }
    }))
    .unwrap_or_else(|panic_info| {
        let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        FenvWireOutcome::Err(format!("function panicked: {}", panic_msg))
    });

    FenvOwned::from_vec(encode_outcome(&outcome).unwrap_or_default())
}

/// Release a buffer returned by [`handle`].
///
/// # Safety
///
/// `buf` must come from [`handle`] in the same library and not be freed twice.
pub unsafe extern "C" fn free(buf: FenvOwned) {
    if buf.ptr.is_null() {
        return;
    }
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
        buf.ptr, buf.len,
    )));
}

/// Drop an instance built by [`construct::<T>`].
///
/// # Safety
///
/// `instance` must come from [`construct::<T>`] and not be destroyed twice.
pub unsafe extern "C" fn destroy<T: Function>(instance: *mut c_void) {
    if instance.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| drop(Box::from_raw(instance as *mut T))));
}
