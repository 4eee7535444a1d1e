//! fenv container binary.

use clap::Parser;
use fenv::prelude::*;
use fenv::tracing_setup;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind to
    #[arg(long, env = "FENV_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for both the load trigger and function requests
    #[arg(short, long, env = "FENV_PORT", default_value_t = 8888)]
    port: u16,

    /// Path of the user artifact
    #[arg(long, env = "FENV_CODE_PATH", default_value = "/userfunc/user")]
    code_path: PathBuf,

    /// Path of the load trigger endpoint
    #[arg(long, env = "FENV_LOAD_ENDPOINT", default_value = "/specialize")]
    load_endpoint: String,

    /// Function type to instantiate when the artifact exports several
    #[arg(long, env = "FENV_FUNCTION_TYPE")]
    function_type: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "FENV_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Timeout for loading and instantiating the artifact, in seconds
    #[arg(long, env = "FENV_SPECIALIZE_TIMEOUT", default_value_t = 30)]
    specialize_timeout: u64,

    /// Directory for staged artifact copies
    #[arg(long, env = "FENV_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Maximum request body size in bytes
    #[arg(long, env = "FENV_MAX_BODY_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_body_size: usize,

    /// Disable the /_health endpoint
    #[arg(long, env = "FENV_NO_HEALTH")]
    no_health: bool,

    /// Emit logs as JSON
    #[arg(long, env = "FENV_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> EnvConfig {
        let mut config = EnvConfig::new()
            .host(self.host)
            .port(self.port)
            .code_path(self.code_path)
            .load_endpoint_path(self.load_endpoint)
            .function_type(self.function_type)
            .request_timeout(self.request_timeout)
            .specialize_timeout(self.specialize_timeout)
            .max_body_size(self.max_body_size)
            .enable_health(!self.no_health);

        if let Some(dir) = self.scratch_dir {
            config = config.scratch_dir(dir);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    tracing_setup::init_tracing(args.log_json);

    let config = args.into_config();
    config.validate()?;

    tracing::info!("Starting generic container: {:?}", config);

    EnvServer::new(config).run().await
}
