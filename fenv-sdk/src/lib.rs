//! SDK for writing fenv user functions.
//!
//! A user artifact is a `cdylib` that implements [`Function`] for one or more
//! `Default` types and exports them with `fenv_macros::export_functions!`.
//! The container opens the library, reads the exported type table and
//! instantiates one entry.

use serde::{Deserialize, Serialize};
use std::ffi::c_void;

pub use serde_bytes::ByteBuf;

pub mod export;

/// Contract id every exported function type declares.
pub const FUNCTION_CONTRACT: &str = "fenv.function/v1";

/// Version of the descriptor/entry-point ABI.
pub const ABI_VERSION: u32 = 1;

/// Symbol under which an artifact exports its type table.
pub const TYPES_SYMBOL: &[u8] = b"fenv_types_v1";

/// Error type user functions return from [`Function::handle`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The function contract.
///
/// Implementors must also be `Default` to be instantiable by the container.
pub trait Function: Send + Sync {
    fn handle(&self, request: FenvWireRequest) -> Result<FenvWireResponse, BoxError>;
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FenvSlice {
    pub ptr: *const u8,
    pub len: usize,
}

impl FenvSlice {
    pub const fn from_static(s: &'static str) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
        }
    }

    /// # Safety
    ///
    /// `ptr` must be valid for `len` bytes, or `len` must be zero.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.ptr.is_null() || self.len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.ptr, self.len)
        }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct FenvOwned {
    pub ptr: *mut u8,
    pub len: usize,
}

impl FenvOwned {
    /// Hand a buffer over to the caller. Release it with the matching `free`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        Self { ptr, len }
    }
}

pub type ConstructFn = unsafe extern "C" fn() -> *mut c_void;
pub type HandleFn = unsafe extern "C" fn(*const c_void, FenvSlice) -> FenvOwned;
pub type FreeFn = unsafe extern "C" fn(FenvOwned);
pub type DestroyFn = unsafe extern "C" fn(*mut c_void);
pub type TypesFn = unsafe extern "C" fn() -> FenvTypeTable;

/// One exported type. Entry points are optional so that the host can tell a
/// type without a default constructor apart from a malformed one.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FenvTypeDescriptor {
    pub name: FenvSlice,
    pub contract: FenvSlice,
    pub abi_version: u32,
    pub construct: Option<ConstructFn>,
    pub handle: Option<HandleFn>,
    pub free: Option<FreeFn>,
    pub destroy: Option<DestroyFn>,
}

// Descriptors only point at 'static data and plain functions.
unsafe impl Sync for FenvTypeDescriptor {}
unsafe impl Send for FenvTypeDescriptor {}

impl FenvTypeDescriptor {
    /// Descriptor for a default-constructible [`Function`].
    pub const fn function<T: Function + Default>(name: &'static str) -> Self {
        let construct: ConstructFn = export::construct::<T>;
        Self {
            construct: Some(construct),
            ..Self::without_constructor::<T>(name)
        }
    }

    /// Descriptor for a [`Function`] that cannot be built without arguments.
    pub const fn without_constructor<T: Function>(name: &'static str) -> Self {
        let handle: HandleFn = export::handle::<T>;
        let free: FreeFn = export::free;
        let destroy: DestroyFn = export::destroy::<T>;
        Self {
            name: FenvSlice::from_static(name),
            contract: FenvSlice::from_static(FUNCTION_CONTRACT),
            abi_version: ABI_VERSION,
            construct: None,
            handle: Some(handle),
            free: Some(free),
            destroy: Some(destroy),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FenvTypeTable {
    pub ptr: *const FenvTypeDescriptor,
    pub len: usize,
}

impl FenvTypeTable {
    pub const fn from_static(types: &'static [FenvTypeDescriptor]) -> Self {
        Self {
            ptr: types.as_ptr(),
            len: types.len(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FenvWireHeader {
    pub name: ByteBuf,
    pub value: ByteBuf,
}

impl FenvWireHeader {
    pub fn new<N: AsRef<[u8]>, V: AsRef<[u8]>>(name: N, value: V) -> Self {
        Self {
            name: ByteBuf::from(name.as_ref().to_vec()),
            value: ByteBuf::from(value.as_ref().to_vec()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FenvWireRequest {
    pub method: String,
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path_and_query: String,
    pub headers: Vec<FenvWireHeader>,
    pub body: ByteBuf,
    pub request_id: Option<String>,
}

impl FenvWireRequest {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name.as_bytes()))
            .map(|h| h.value.as_slice())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FenvWireResponse {
    pub status: u16,
    pub headers: Vec<FenvWireHeader>,
    pub body: ByteBuf,
}

impl FenvWireResponse {
    pub fn new<B: Into<Vec<u8>>>(status: u16, headers: Vec<FenvWireHeader>, body: B) -> Self {
        Self {
            status,
            headers,
            body: ByteBuf::from(body.into()),
        }
    }

    /// 200 response with a `text/plain` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(
            200,
            vec![FenvWireHeader::new("content-type", "text/plain")],
            body.into().into_bytes(),
        )
    }
}

impl From<&str> for FenvWireResponse {
    fn from(body: &str) -> Self {
        Self::text(body)
    }
}

impl From<String> for FenvWireResponse {
    fn from(body: String) -> Self {
        Self::text(body)
    }
}

/// What a `handle` entry point returns to the host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum FenvWireOutcome {
    Ok(FenvWireResponse),
    Err(String),
}

pub fn encode_request(req: &FenvWireRequest) -> Result<Vec<u8>, serde_cbor::Error> {
    serde_cbor::to_vec(req)
}

pub fn decode_request(bytes: &[u8]) -> Result<FenvWireRequest, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}

pub fn encode_outcome(outcome: &FenvWireOutcome) -> Result<Vec<u8>, serde_cbor::Error> {
    serde_cbor::to_vec(outcome)
}

pub fn decode_outcome(bytes: &[u8]) -> Result<FenvWireOutcome, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}
