//! HTTP plumbing shared by the session and the transports.
//!
//! This module re-exports some common items from the [reqwest](https://docs.rs/reqwest) crate:
//! - `header`: Types and functions for working with HTTP headers.
//! - `multipart`: Types for building multipart requests.
//! - `Method`: An enum representing HTTP methods.
//! - `StatusCode`: An HTTP status code.
//!
//! It also defines the [`Transport`] seam. Requests are described by plain data
//! ([`HttpRequest`]) rather than a built `reqwest::Request`, so a request that failed
//! with 401 can be replayed after the session recovered its credentials, including
//! multipart uploads.
pub use reqwest::{header, multipart, Method, StatusCode};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// The body of an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(JsonValue),
    Multipart(Vec<FormPart>),
}

/// One part of a multipart form.
#[derive(Debug, Clone)]
pub struct FormPart {
    /// The form field name.
    pub name: String,
    pub content: PartContent,
}

#[derive(Debug, Clone)]
pub enum PartContent {
    /// A text field, sent with an optional content type.
    Text {
        value: String,
        mime_type: Option<String>,
    },
    /// A file field.
    File {
        bytes: Bytes,
        file_name: String,
        mime_type: String,
    },
}

impl FormPart {
    pub fn text<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            content: PartContent::Text {
                value: value.into(),
                mime_type: None,
            },
        }
    }

    /// A text part carrying a JSON document.
    pub fn json<N: Into<String>>(name: N, value: &JsonValue) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Text {
                value: value.to_string(),
                mime_type: Some("application/json".into()),
            },
        }
    }

    pub fn file<N, F, M>(name: N, bytes: Bytes, file_name: F, mime_type: M) -> Self
    where
        N: Into<String>,
        F: Into<String>,
        M: Into<String>,
    {
        Self {
            name: name.into(),
            content: PartContent::File {
                bytes,
                file_name: file_name.into(),
                mime_type: mime_type.into(),
            },
        }
    }
}

/// A fully resolved request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL, without the query string.
    pub url: String,
    pub headers: header::HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    /// The bearer token carried by the request, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// The headers with credentials redacted, for logging.
    pub fn sanitized_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let value = if *name == header::AUTHORIZATION {
                    "Bearer ***".to_string()
                } else {
                    value.to_str().unwrap_or("<binary>").to_string()
                };
                (name.to_string(), value)
            })
            .collect()
    }

    /// A loggable rendition of the body; file contents are elided and
    /// credential fields are masked.
    pub fn body_summary(&self) -> String {
        match &self.body {
            RequestBody::Empty => String::new(),
            RequestBody::Json(value) => redact_json(value).to_string(),
            RequestBody::Multipart(parts) => {
                let parts: Vec<String> = parts
                    .iter()
                    .map(|part| match &part.content {
                        PartContent::Text { value, .. } => format!("{}={}", part.name, value),
                        PartContent::File {
                            bytes, file_name, ..
                        } => format!(
                            "{}=[FILE {} ({} bytes)]",
                            part.name,
                            file_name,
                            bytes.len()
                        ),
                    })
                    .collect();
                parts.join(", ")
            }
        }
    }
}

/// A response as seen by the session: the status and the raw body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new<B: Into<String>>(status: StatusCode, body: B) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The body for logging, with credential fields masked when it is JSON.
    pub fn body_summary(&self) -> String {
        match serde_json::from_str::<JsonValue>(&self.body) {
            Ok(value) => redact_json(&value).to_string(),
            Err(_) => self.body.clone(),
        }
    }
}

/// Fields whose values never reach the logs.
const SECRET_FIELDS: &[&str] = &["password", "access_token", "refresh_token", "api_key"];

/// Masks secret fields at any depth of a JSON document.
fn redact_json(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(key, value)| {
                    let value = if SECRET_FIELDS.contains(&key.as_str()) {
                        JsonValue::String("***".into())
                    } else {
                        redact_json(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}

/// Sends requests on behalf of a session.
///
/// Implementations only move bytes; status interpretation, authentication and
/// retries belong to [`Session`](crate::session::Session).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Connect timeout used when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Overall request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The production [`Transport`], backed by a `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport with the given timeouts; a zero duration disables that timeout.
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::ClientBuilder::new();
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        if !connect_timeout.is_zero() {
            builder = builder.connect_timeout(connect_timeout);
        }
        let http_client = builder.default_headers(Self::default_headers()).build()?;
        Ok(Self { http_client })
    }

    /// Wraps an already configured `reqwest::Client`.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    fn default_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    fn multipart_form(parts: Vec<FormPart>) -> Result<multipart::Form> {
        let mut form = multipart::Form::new();
        for part in parts {
            let built = match part.content {
                PartContent::Text { value, mime_type } => {
                    let p = multipart::Part::text(value);
                    match mime_type {
                        Some(mime) => p.mime_str(&mime)?,
                        None => p,
                    }
                }
                PartContent::File {
                    bytes,
                    file_name,
                    mime_type,
                } => multipart::Part::stream(bytes)
                    .file_name(file_name)
                    .mime_str(&mime_type)?,
            };
            form = form.part(part.name, built);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(parts) => builder.multipart(Self::multipart_form(parts)?),
        };

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}
