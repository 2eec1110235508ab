use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a `Transport`
#[derive(Error, Debug)]
pub enum TransportError {
    /// Server answered with a non-success status
    #[error("HTTP {status} - {body}")]
    Status { status: u16, body: String },

    /// Request could not be sent or its response could not be read
    #[error("request failed ({kind}): {source}")]
    Request {
        kind: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Call did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        // Categorize the error for better debugging
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };
        TransportError::Request { kind, source: e }
    }
}

/// One field of a multipart form
#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: String,
    pub data: Bytes,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Multipart form body
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: Vec<MultipartField>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file field
    pub fn file(
        mut self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        self.fields.push(MultipartField {
            name: name.into(),
            data: data.into(),
            file_name: Some(file_name.into()),
            mime_type: Some(mime_type.into()),
        });
        self
    }

    /// Add a plain text field
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(MultipartField {
            name: name.into(),
            data: Bytes::from(value.into()),
            file_name: None,
            mime_type: None,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&MultipartField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Total size of the field payloads, excluding multipart framing
    pub fn payload_len(&self) -> usize {
        self.fields.iter().map(|f| f.data.len()).sum()
    }

    fn into_form(self) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for field in self.fields {
            let mut part = Part::bytes(field.data.to_vec());
            if let Some(file_name) = field.file_name {
                part = part.file_name(file_name);
            }
            if let Some(mime) = field.mime_type {
                part = part.mime_str(&mime).map_err(TransportError::from_reqwest)?;
            }
            form = form.part(field.name, part);
        }
        Ok(form)
    }
}

/// Request body
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized JSON document
    Json(Vec<u8>),
    Multipart(MultipartForm),
}

/// Fully built request handed to a transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Successful (2xx) response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Sends fully built requests
///
/// Implementations report every non-2xx answer as `TransportError::Status`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `Transport` backed by a pooled reqwest client
pub struct ReqwestTransport {
    /// Shared HTTP client with connection pooling
    client: Client,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new(max_connections: usize, connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let mut builder = self.client.request(method.clone(), &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            Some(RequestBody::Json(bytes)) => builder.body(bytes),
            // reqwest computes an exact Content-Length for in-memory parts
            Some(RequestBody::Multipart(form)) => builder.multipart(form.into_form()?),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            let err = TransportError::from_reqwest(e);
            tracing::warn!(error = %err, url = %url, "HTTP request error");
            err
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "Received HTTP response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                response_body = %body,
                "Received error response"
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }
}
