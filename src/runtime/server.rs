//! HTTP server for the container.

use crate::http::{FenvRequest, FenvResponse, Method, StatusCode};
use crate::loader::ArtifactLoader;
use crate::runtime::{EnvConfig, EnvService};
use crate::specialize::Specializer;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Generic container server.
///
/// Starts without a function and serves the load trigger until a
/// specialization succeeds, then routes `/` to the loaded function.
pub struct EnvServer {
    service: EnvService,
}

impl EnvServer {
    /// Create a server that loads native artifacts.
    pub fn new(config: EnvConfig) -> Self {
        Self {
            service: EnvService::new(config),
        }
    }

    /// Create a server with a custom artifact loader.
    pub fn with_loader(config: EnvConfig, loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            service: EnvService::with_loader(config, loader),
        }
    }

    pub fn specializer(&self) -> Arc<Specializer> {
        self.service.specializer()
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.service.config().bind_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        tokio::select! {
            result = self.serve(listener) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            "Generic container listening on {} (artifact: {})",
            listener.local_addr()?,
            self.service.config().code_path.display()
        );

        let service = self.service;
        let sequence = Arc::new(AtomicU64::new(0));

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);

            let service = service.clone();
            let sequence = sequence.clone();

            tokio::task::spawn(async move {
                let handler = service_fn(move |req| {
                    let service = service.clone();
                    let request_id = format!("{:x}", sequence.fetch_add(1, Ordering::Relaxed));
                    async move { handle_request(req, service, remote_addr, request_id).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, handler).await {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

/// Handle an incoming HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    service: EnvService,
    remote_addr: SocketAddr,
    request_id: String,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!(
        "Handling request: {} {} from {} [{}]",
        req.method(),
        req.uri().path(),
        remote_addr,
        request_id
    );

    let max_body_size = service.config().max_body_size;
    let request = match convert_request(req, max_body_size, request_id).await {
        Ok(request) => request,
        Err(response) => return Ok(build_response(response)),
    };

    Ok(build_response(service.call(request).await))
}

/// Convert a hyper Request to FenvRequest, or the response to send instead.
///
/// The body is read through a length limit, so an oversized upload is
/// rejected as soon as it crosses `max_body_size`.
async fn convert_request(
    req: Request<Incoming>,
    max_body_size: usize,
    request_id: String,
) -> Result<FenvRequest, FenvResponse> {
    let method = Method::from(req.method());
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let headers = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Bytes::copy_from_slice(value.as_bytes()),
            )
        })
        .collect();

    let body = Limited::new(req.into_body(), max_body_size);
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!("Request body over {} bytes [{}]", max_body_size, request_id);
            return Err(FenvResponse::error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
            ));
        }
        Err(e) => {
            warn!("Failed to read request body: {} [{}]", e, request_id);
            return Err(FenvResponse::error(
                StatusCode::BAD_REQUEST,
                format!("Failed to read request body: {}", e),
            ));
        }
    };

    Ok(FenvRequest {
        method,
        url,
        headers,
        body: if body_bytes.is_empty() {
            None
        } else {
            Some(body_bytes)
        },
        request_id: Some(request_id),
    })
}

/// Build a hyper Response from FenvResponse.
fn build_response(fenv_response: FenvResponse) -> Response<Full<Bytes>> {
    let status = hyper::StatusCode::from_u16(fenv_response.status.0).unwrap_or_else(|_| {
        warn!(
            "Invalid status code {}, falling back to 500 Internal Server Error",
            fenv_response.status.0
        );
        hyper::StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut response = Response::new(Full::new(fenv_response.body.unwrap_or_default()));
    *response.status_mut() = status;

    for (name, value) in fenv_response.headers {
        match (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!("Skipping invalid response header {}", name),
        }
    }

    response
}
