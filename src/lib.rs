//! # fenv - generic function container
//!
//! fenv is the per-language container of a serverless platform. It starts
//! generic, with no function loaded. When the platform calls the load
//! trigger it reads the user artifact from a fixed path, picks the function
//! type the artifact exports and instantiates it once. From then on every
//! request to `/` goes to that instance.
//!
//! ```text
//!   platform ── POST /specialize ──▶ Specializer ──▶ ArtifactLoader
//!                                        │              (dlopen, type table)
//!                                        ▼
//!                                   function slot
//!                                        ▲
//!   client ──── GET/POST/PUT/DELETE / ──▶ Dispatcher
//! ```
//!
//! ## Writing a function
//!
//! Functions are `cdylib`s built against `fenv-sdk`:
//!
//! ```ignore
//! use fenv_sdk::{BoxError, FenvWireRequest, FenvWireResponse, Function};
//!
//! #[derive(Default)]
//! pub struct HelloWorld;
//!
//! impl Function for HelloWorld {
//!     fn handle(&self, _req: FenvWireRequest) -> Result<FenvWireResponse, BoxError> {
//!         Ok("Hello World!".into())
//!     }
//! }
//!
//! fenv_macros::export_functions!(HelloWorld);
//! ```
//!
//! ## Running the container
//!
//! ```rust,no_run
//! use fenv::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = EnvConfig::new().code_path("/userfunc/user").port(8888);
//!     EnvServer::new(config).run().await
//! }
//! ```

pub mod dispatch;
pub mod function;
pub mod http;
pub mod loader;
pub mod runtime;
pub mod specialize;
pub mod tracing_setup;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::dispatch::{DispatchError, Dispatcher};
    pub use crate::function::{FenvError, FenvFunction};
    pub use crate::http::{FenvRequest, FenvResponse, Method, StatusCode};
    pub use crate::loader::{ArtifactLoader, DylibLoader, InProcessLoader, LoadError};
    pub use crate::runtime::{EnvConfig, EnvServer, EnvService};
    pub use crate::specialize::{ContainerState, SelectionPolicy, SpecializeError, Specializer};
    pub use async_trait::async_trait;
}

pub use function::{FenvError, FenvFunction};
pub use http::{FenvRequest, FenvResponse};
pub use runtime::{EnvConfig, EnvServer};
