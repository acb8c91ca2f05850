//! Error types.
//!
//! Two families live here and they never mix:
//!
//! - [`Error`]: infrastructure failures surfaced to the caller that builds
//!   or runs the server: binding a port, loading config, registering routes.
//! - [`ServiceError`]: application failures surfaced to the HTTP client.
//!   Middlewares report them through [`Context::report`](crate::Context::report),
//!   handlers return them, and the transport renders them.

use crate::response::{CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT};

/// The error type returned by weir's fallible setup and serving operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid route `{path}`: {source}")]
    InvalidRoute {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("service `{0}` is already registered")]
    DuplicateService(String),

    #[error("path `{0}` is already registered")]
    DuplicatePath(String),

    #[error("invalid service: {0}")]
    InvalidService(&'static str),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

// ── ServiceError ──────────────────────────────────────────────────────────────

/// What went wrong, independent of the human-readable message.
///
/// Derived from the status code so it always agrees with what the client sees.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    Throttled,
    Internal,
    /// Any other 4xx/5xx code.
    Other,
}

impl ErrorKind {
    fn from_code(code: u16) -> Self {
        match code {
            400 => Self::BadRequest,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            413 => Self::PayloadTooLarge,
            429 => Self::Throttled,
            500 => Self::Internal,
            _   => Self::Other,
        }
    }
}

/// An HTTP-facing error: status code, kind, and message payload.
///
/// Codes outside `400..=600` are forced to `500`, so a `ServiceError` can
/// never masquerade as a success.
///
/// ```rust
/// use weir::{ErrorKind, ServiceError};
///
/// let err = ServiceError::with_code(999, "boom");
/// assert_eq!(err.code(), 500);
/// assert_eq!(err.kind(), ErrorKind::Internal);
/// ```
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    code: u16,
    kind: ErrorKind,
    message: String,
}

impl ServiceError {
    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        let code = if (400..=600).contains(&code) { code } else { 500 };
        let message = message.into().trim().to_owned();
        Self { code, kind: ErrorKind::from_code(code), message }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_code(400, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_code(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_code(404, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::with_code(405, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::with_code(413, message)
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::with_code(429, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_code(500, message)
    }

    pub fn code(&self) -> u16 { self.code }
    pub fn kind(&self) -> ErrorKind { self.kind }
    pub fn message(&self) -> &str { &self.message }

    /// A message that already looks like a JSON object is sent as JSON.
    pub fn content_type(&self) -> &'static str {
        if self.message.starts_with('{') {
            CONTENT_TYPE_JSON
        } else {
            CONTENT_TYPE_TEXT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_codes_become_internal() {
        assert_eq!(ServiceError::with_code(999, "x").code(), 500);
        assert_eq!(ServiceError::with_code(200, "x").code(), 500);
        assert_eq!(ServiceError::with_code(399, "x").code(), 500);
        assert_eq!(ServiceError::with_code(600, "x").code(), 600);
        assert_eq!(ServiceError::with_code(418, "x").kind(), ErrorKind::Other);
    }

    #[test]
    fn kind_follows_constructor() {
        assert_eq!(ServiceError::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(ServiceError::forbidden("x").kind(), ErrorKind::Forbidden);
        assert_eq!(ServiceError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(ServiceError::method_not_allowed("x").kind(), ErrorKind::MethodNotAllowed);
        assert_eq!(ServiceError::throttled("x").kind(), ErrorKind::Throttled);
        assert_eq!(ServiceError::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn content_type_is_sniffed_from_message() {
        assert_eq!(ServiceError::internal(r#"  {"a":1}"#).content_type(), CONTENT_TYPE_JSON);
        assert_eq!(ServiceError::internal("plain").content_type(), CONTENT_TYPE_TEXT);
        assert_eq!(ServiceError::internal("").content_type(), CONTENT_TYPE_TEXT);
    }

    #[test]
    fn message_is_trimmed() {
        assert_eq!(ServiceError::bad_request("  missing id \n").to_string(), "missing id");
    }
}
