//! Request type handed to the loaded function.

use bytes::Bytes;
use fenv_sdk::{ByteBuf, FenvWireHeader, FenvWireRequest};
use serde::{Deserialize, Serialize};

/// HTTP method enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Other(String),
}

impl Method {
    /// Whether requests with this method are forwarded to the function.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Method::Get | Method::Post | Method::Put | Method::Delete)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
            Method::Patch => write!(f, "PATCH"),
            Method::Head => write!(f, "HEAD"),
            Method::Options => write!(f, "OPTIONS"),
            Method::Other(name) => write!(f, "{}", name),
        }
    }
}

impl From<&hyper::Method> for Method {
    fn from(method: &hyper::Method) -> Self {
        match *method {
            hyper::Method::GET => Method::Get,
            hyper::Method::POST => Method::Post,
            hyper::Method::PUT => Method::Put,
            hyper::Method::DELETE => Method::Delete,
            hyper::Method::PATCH => Method::Patch,
            hyper::Method::HEAD => Method::Head,
            hyper::Method::OPTIONS => Method::Options,
            ref other => Method::Other(other.as_str().to_string()),
        }
    }
}

/// Inbound HTTP request, passed to the function without interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FenvRequest {
    /// HTTP method.
    pub method: Method,
    /// Path and query as received.
    pub url: String,
    /// Headers in arrival order. Repeated names stay separate entries and
    /// values are raw bytes.
    pub headers: Vec<(String, Bytes)>,
    /// Request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Bytes>,
    /// Id assigned by the server for log correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl FenvRequest {
    /// Create a new FenvRequest.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            request_id: None,
        }
    }

    /// Add a header to the request.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The URL path without the query string.
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or("/")
    }

    /// Convert into the representation that crosses the artifact ABI.
    pub fn into_wire(self) -> FenvWireRequest {
        let authority = self
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("host"))
            .and_then(|(_, value)| std::str::from_utf8(value).ok())
            .map(str::to_string);
        FenvWireRequest {
            method: self.method.to_string(),
            scheme: None,
            authority,
            path_and_query: self.url,
            headers: self
                .headers
                .iter()
                .map(|(name, value)| FenvWireHeader::new(name, value))
                .collect(),
            body: ByteBuf::from(self.body.map(|b| b.to_vec()).unwrap_or_default()),
            request_id: self.request_id,
        }
    }
}
