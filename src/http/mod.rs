pub mod client;
#[cfg(test)]
pub(crate) mod testing;

pub use client::ReqwestTransport;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Request or response headers, keyed by header name
pub type Headers = BTreeMap<String, String>;

/// Errors raised by the HTTP transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// One part of a multipart upload
#[derive(Debug, Clone, PartialEq)]
pub enum HttpPart {
    Text { name: String, value: String },
    File { name: String, path: PathBuf, content_type: String },
}

impl HttpPart {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn file(name: &str, path: &Path) -> Self {
        Self::File {
            name: name.to_string(),
            path: path.to_path_buf(),
            content_type: "multipart/form-data".to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HttpPart::Text { name, .. } | HttpPart::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(BTreeMap<String, String>),
    Multipart(Vec<HttpPart>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: RequestBody,
}

/// Raw response from the backend
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub code: u16,
    /// Header names are stored lower-cased
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Best-effort JSON decoding; bodies that are not JSON yield `None`.
    pub fn json(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Write the body to `destination`, creating parent directories as needed
    pub async fn write_to_file(&self, destination: &Path) -> std::io::Result<()> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(destination, &self.body).await
    }
}

/// HTTP client used by the service providers.
///
/// Implementations only move bytes: status handling and error reporting are
/// the caller's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> TransportResult<HttpResponse>;

    async fn get(&self, url: &str, headers: Headers) -> TransportResult<HttpResponse> {
        self.send(HttpRequest {
            method: Method::Get,
            url: url.to_string(),
            headers,
            body: RequestBody::Empty,
        })
        .await
    }

    async fn post(&self, url: &str, headers: Headers, body: Value) -> TransportResult<HttpResponse> {
        self.send(HttpRequest {
            method: Method::Post,
            url: url.to_string(),
            headers,
            body: RequestBody::Json(body),
        })
        .await
    }

    async fn put(&self, url: &str, headers: Headers, body: Option<Value>) -> TransportResult<HttpResponse> {
        self.send(HttpRequest {
            method: Method::Put,
            url: url.to_string(),
            headers,
            body: body.map(RequestBody::Json).unwrap_or(RequestBody::Empty),
        })
        .await
    }

    async fn post_form(
        &self,
        url: &str,
        headers: Headers,
        form: BTreeMap<String, String>,
    ) -> TransportResult<HttpResponse> {
        self.send(HttpRequest {
            method: Method::Post,
            url: url.to_string(),
            headers,
            body: RequestBody::Form(form),
        })
        .await
    }

    async fn post_multipart(
        &self,
        url: &str,
        headers: Headers,
        parts: Vec<HttpPart>,
    ) -> TransportResult<HttpResponse> {
        self.send(HttpRequest {
            method: Method::Post,
            url: url.to_string(),
            headers,
            body: RequestBody::Multipart(parts),
        })
        .await
    }
}
