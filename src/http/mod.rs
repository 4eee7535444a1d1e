//! HTTP types exchanged between the server and the loaded function.

mod request;
mod response;

pub use request::{FenvRequest, Method};
pub use response::{FenvResponse, StatusCode};
