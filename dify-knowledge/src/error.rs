//! Error types returned by the Dify knowledge client.
//!
//! Every failed request surfaces as an [`Error`]. The HTTP status of a failed
//! response decides the variant, and [`Error::kind`] collapses the variants into
//! the coarse [`ErrorKind`] callers usually branch on.
//!
//! ```
//! use dify_knowledge::error::{Error, ErrorKind, ErrorResponse};
//!
//! let body = r#"{"code": "dataset_not_found", "message": "Dataset not found.", "status": 404}"#;
//! let err = Error::from_status(404, body);
//!
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert_eq!(err.status(), Some(404));
//! assert_eq!(err.response().map(|r| r.code.as_str()), Some("dataset_not_found"));
//! ```
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Result alias for request paths.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Maximum number of body bytes kept in an error built from a non-JSON response.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// 错误响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误码
    #[serde(default = "ErrorResponse::unknown_code")]
    pub code: String,
    /// 错误信息
    #[serde(default)]
    pub message: String,
    /// HTTP 状态码
    #[serde(default)]
    pub status: u16,
}

impl Display for ErrorResponse {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let json = serde_json::to_string(&self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json)
    }
}

impl ErrorResponse {
    fn unknown_code() -> String {
        "unknown_error".into()
    }

    /// Builds an error response for a body that is not a Dify error document.
    pub fn unknown<T>(message: T, status: u16) -> Self
    where
        T: ToString,
    {
        ErrorResponse {
            code: Self::unknown_code(),
            message: message.to_string(),
            status,
        }
    }

    /// Parses a Dify error body, falling back to the raw (truncated) text.
    pub fn parse(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(mut err) => {
                if err.status == 0 {
                    err.status = status;
                }
                err
            }
            Err(_) => Self::unknown(truncate_body(body), status),
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was malformed (HTTP 400 or a local argument check).
    Validation,
    /// Missing, invalid or expired credentials (HTTP 401).
    Authentication,
    /// The credentials lack permission (HTTP 403).
    Authorization,
    /// The resource does not exist (HTTP 404).
    NotFound,
    /// Too many requests (HTTP 429).
    RateLimited,
    /// 5xx, transport failures and unexpected response bodies.
    Server,
    /// An optional feature was used without being configured.
    NotConfigured,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(ErrorResponse),

    #[error("authentication failed: {0}")]
    Authentication(ErrorResponse),

    #[error("permission denied: {0}")]
    Authorization(ErrorResponse),

    #[error("resource not found: {0}")]
    NotFound(ErrorResponse),

    #[error("rate limited: {0}")]
    RateLimited(ErrorResponse),

    #[error("server error: {0}")]
    Server(ErrorResponse),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl Error {
    /// Maps a failed HTTP response to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        Self::classify(status, ErrorResponse::parse(status, body))
    }

    /// Maps a parsed error body to an error, keyed on its status.
    pub fn from_response(resp: ErrorResponse) -> Self {
        Self::classify(resp.status, resp)
    }

    fn classify(status: u16, resp: ErrorResponse) -> Self {
        match status {
            400 => Error::Validation(resp),
            401 => Error::Authentication(resp),
            403 => Error::Authorization(resp),
            404 => Error::NotFound(resp),
            429 => Error::RateLimited(resp),
            _ => Error::Server(resp),
        }
    }

    /// An authentication failure that did not come from an HTTP response.
    pub(crate) fn authentication<T: ToString>(message: T) -> Self {
        Error::Authentication(ErrorResponse {
            code: "authentication_failed".into(),
            message: message.to_string(),
            status: 401,
        })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::InvalidRequest(_) => ErrorKind::Validation,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Authorization(_) => ErrorKind::Authorization,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::NotConfigured(_) => ErrorKind::NotConfigured,
            Error::Server(_) | Error::InvalidResponse(_) | Error::Transport(_) => {
                ErrorKind::Server
            }
        }
    }

    /// The HTTP status behind this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => self.response().map(|r| r.status),
        }
    }

    /// The error body returned by the server, when there is one.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            Error::Validation(r)
            | Error::Authentication(r)
            | Error::Authorization(r)
            | Error::NotFound(r)
            | Error::RateLimited(r)
            | Error::Server(r) => Some(r),
            _ => None,
        }
    }

    /// Re-wraps errors whose message carries a "404 NOT FOUND" signature as
    /// [`Error::NotFound`]; everything else passes through.
    pub fn or_not_found(self) -> Self {
        if self.kind() == ErrorKind::NotFound {
            return self;
        }
        let message = self.to_string();
        if message.to_ascii_uppercase().contains("404 NOT FOUND") {
            let resp = match self {
                Error::Server(mut r) => {
                    r.status = 404;
                    r
                }
                _ => ErrorResponse {
                    code: "not_found".into(),
                    message,
                    status: 404,
                },
            };
            return Error::NotFound(resp);
        }
        self
    }
}
