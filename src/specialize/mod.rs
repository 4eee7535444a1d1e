//! Specialization: turning the generic container into a function server.

mod controller;
mod error;
mod selection;

pub use controller::{instantiate, ContainerState, Specialized, Specializer};
pub use error::SpecializeError;
pub use selection::SelectionPolicy;
