//! Container runtime: configuration, routing and the HTTP server.

mod config;
mod server;
mod service;

pub use config::{ConfigError, EnvConfig};
pub use server::EnvServer;
pub use service::EnvService;
