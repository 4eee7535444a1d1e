//! Request routing, independent of the transport.

use crate::dispatch::{DispatchError, Dispatcher};
use crate::http::{FenvRequest, FenvResponse, Method, StatusCode};
use crate::loader::{ArtifactLoader, DylibLoader};
use crate::runtime::EnvConfig;
use crate::specialize::{ContainerState, Specializer};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The container's HTTP surface: the load trigger, the function path and
/// the health endpoint.
#[derive(Clone)]
pub struct EnvService {
    config: Arc<EnvConfig>,
    specializer: Arc<Specializer>,
    dispatcher: Dispatcher,
}

impl EnvService {
    /// Service loading native artifacts from `config.code_path`.
    pub fn new(config: EnvConfig) -> Self {
        let loader = Arc::new(DylibLoader::new(config.scratch_dir.clone()));
        Self::with_loader(config, loader)
    }

    pub fn with_loader(config: EnvConfig, loader: Arc<dyn ArtifactLoader>) -> Self {
        let specializer = Arc::new(Specializer::new(
            loader,
            config.code_path.clone(),
            config.selection_policy(),
            config.specialize_timeout_duration(),
        ));
        let dispatcher =
            Dispatcher::new(specializer.clone()).with_timeout(config.request_timeout_duration());

        Self {
            config: Arc::new(config),
            specializer,
            dispatcher,
        }
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn specializer(&self) -> Arc<Specializer> {
        self.specializer.clone()
    }

    /// Answer one request.
    pub async fn call(&self, request: FenvRequest) -> FenvResponse {
        let path = request.path().to_string();

        if path == self.config.load_endpoint_path {
            if request.method != Method::Post {
                return method_not_allowed("POST");
            }
            return self.specialize().await;
        }

        if self.config.enable_health && path == "/_health" {
            return self.health().await;
        }

        if path == "/" {
            if !request.method.is_dispatchable() {
                return method_not_allowed("GET, POST, PUT, DELETE");
            }
            return self.invoke(request).await;
        }

        FenvResponse::error(StatusCode::NOT_FOUND, "Not Found")
    }

    async fn specialize(&self) -> FenvResponse {
        match self.specializer.specialize().await {
            Ok(outcome) => {
                info!("Container ready, serving {}", outcome.type_name);
                FenvResponse::ok()
            }
            Err(e) => FenvResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn invoke(&self, request: FenvRequest) -> FenvResponse {
        let request_id = request.request_id.clone().unwrap_or_default();

        match self.dispatcher.dispatch(request).await {
            Ok(response) => response,
            Err(e @ DispatchError::NotReady) => {
                FenvResponse::error(StatusCode::BAD_REQUEST, e.to_string())
            }
            Err(DispatchError::Handler(e)) => {
                error!("Function error: {} [{}]", e, request_id);
                FenvResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            Err(e @ DispatchError::Timeout(_)) => {
                warn!("{} [{}]", e, request_id);
                FenvResponse::error(StatusCode::GATEWAY_TIMEOUT, e.to_string())
            }
        }
    }

    async fn health(&self) -> FenvResponse {
        let body = match self.specializer.state().await {
            ContainerState::Unspecialized => serde_json::json!({
                "status": "ok",
                "state": "unspecialized",
            }),
            ContainerState::Specialized { type_name } => serde_json::json!({
                "status": "ok",
                "state": "specialized",
                "function": type_name,
            }),
        };
        FenvResponse::json(&body).unwrap_or_else(|_| FenvResponse::text("{}"))
    }
}

fn method_not_allowed(allow: &str) -> FenvResponse {
    FenvResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").header("Allow", allow)
}
