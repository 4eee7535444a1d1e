//! Minimal user function: answers every request with "Hello World!".
//!
//! Build with `cargo build -p example_hello --release` and copy
//! `libexample_hello.so` to the container's code path.

use fenv_macros::export_functions;
use fenv_sdk::{BoxError, FenvWireRequest, FenvWireResponse, Function};

#[derive(Default)]
pub struct HelloWorld;

impl Function for HelloWorld {
    fn handle(&self, _request: FenvWireRequest) -> Result<FenvWireResponse, BoxError> {
        Ok("Hello World!".into())
    }
}

export_functions!(HelloWorld);
