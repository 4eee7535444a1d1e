//! Function contract and the native instances built from artifacts.

pub mod handler;
pub mod native;

pub use handler::{FenvError, FenvFunction};
pub use native::NativeFunction;
