//! Outgoing response type and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] lives inside the pooled [`Context`](crate::Context) for the
//! whole request. Middlewares mutate it in place, the terminal handler's
//! return value is merged into it, and the transport drains it into a hyper
//! response at the end. Until then every field is mutable.

use std::collections::HashMap;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http_body_util::Full;
use serde::Serialize;

use crate::error::ServiceError;

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";
pub(crate) const CONTENT_TYPE_TEXT: &str = "text/plain";

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html; charset=utf-8
    Json,         // application/json; charset=UTF-8
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => CONTENT_TYPE_JSON,
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// Response body before serialization.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty    => true,
            Self::Bytes(b) => b.is_empty(),
            Self::Text(s)  => s.is_empty(),
            Self::Json(_)  => false,
        }
    }

    fn into_bytes(self) -> Result<Bytes, ServiceError> {
        match self {
            Self::Empty    => Ok(Bytes::new()),
            Self::Bytes(b) => Ok(b),
            Self::Text(s)  => Ok(Bytes::from(s)),
            Self::Json(v)  => serde_json::to_vec(&v)
                .map(Bytes::from)
                .map_err(|e| ServiceError::internal(e.to_string())),
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// A code of `0` means "nothing produced a response yet"; the transport turns
/// that into a `500`.
///
/// ```rust
/// use weir::{ContentType, Response};
///
/// Response::text("hello");
/// Response::json(serde_json::json!({ "id": 1 }));
/// Response::status(204);
/// Response::bytes(ContentType::Xml, "<ok/>");
///
/// Response::builder()
///     .code(201)
///     .header("location", "/students/42")
///     .json(serde_json::json!({ "id": 42 }));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response {
    code: u16,
    payload: Payload,
    content_type: String,
    headers: HashMap<String, String>,
}

impl Response {
    /// A response with a JSON content type, matching what most handlers send.
    pub fn new(code: u16, payload: Payload) -> Self {
        Self {
            code,
            payload,
            content_type: CONTENT_TYPE_JSON.to_owned(),
            headers: HashMap::new(),
        }
    }

    /// `200 OK`, `application/json; charset=UTF-8`.
    pub fn json(value: serde_json::Value) -> Self {
        Self::new(200, Payload::Json(value))
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK` with an explicit content type.
    pub fn bytes(content_type: ContentType, body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(content_type, body)
    }

    /// Response with no body.
    pub fn status(code: u16) -> Self {
        Self::builder().code(code).no_body()
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { code: 200, headers: HashMap::new() }
    }

    pub fn code(&self) -> u16 { self.code }
    pub fn payload(&self) -> &Payload { &self.payload }
    pub fn content_type(&self) -> &str { &self.content_type }

    pub fn set_code(&mut self, code: u16) {
        self.code = code;
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.content_type.clear();
        self.content_type.push_str(content_type);
    }

    /// Sets a header, replacing any previous value. Names are case-insensitive.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `true` until something sets a status code.
    pub fn is_unset(&self) -> bool {
        self.code == 0
    }

    /// Folds a handler's response into this one. The handler's code, payload,
    /// and content type win; headers already set here are kept unless the
    /// handler sets the same name.
    pub(crate) fn merge(&mut self, other: Response) {
        self.code = other.code;
        self.payload = other.payload;
        self.set_content_type(&other.content_type);
        self.headers.extend(other.headers);
    }

    /// Drains this response into a hyper response.
    ///
    /// Fails for an unset code, an out-of-range code, or a header that is not
    /// valid on the wire. Headers are only cleared once all of them have been
    /// accepted, so a failed conversion leaves them for the error response.
    /// The payload is moved out, so nothing of it stays behind in the pooled
    /// context.
    pub(crate) fn take_http(&mut self) -> Result<http::Response<Full<Bytes>>, ServiceError> {
        if self.is_unset() {
            return Err(ServiceError::internal("invalid handler operation"));
        }
        let status = http::StatusCode::from_u16(self.code)
            .map_err(|e| ServiceError::internal(e.to_string()))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len() + 1);
        if !self.content_type.is_empty() {
            let value = HeaderValue::from_str(&self.content_type)
                .map_err(|e| ServiceError::internal(format!("invalid content type: {e}")))?;
            headers.insert(CONTENT_TYPE, value);
        }
        for (name, value) in &self.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ServiceError::internal(format!("invalid header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ServiceError::internal(format!("invalid value for header `{name}`: {e}")))?;
            headers.insert(header, value);
        }

        let body = std::mem::take(&mut self.payload).into_bytes()?;
        self.headers.clear();

        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    pub(crate) fn reset(&mut self) {
        self.code = 0;
        self.payload = Payload::Empty;
        self.content_type.clear();
        self.headers.clear();
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200`. Terminated by a
/// typed body method.
pub struct ResponseBuilder {
    code: u16,
    headers: HashMap<String, String>,
}

impl ResponseBuilder {
    pub fn code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_owned());
        self
    }

    pub fn json(self, value: serde_json::Value) -> Response {
        self.finish(CONTENT_TYPE_JSON, Payload::Json(value))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), Payload::Text(body.into()))
    }

    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type.as_str(), Payload::Bytes(body.into()))
    }

    /// Terminate with no body (e.g. `204`, `301`).
    pub fn no_body(self) -> Response {
        self.finish("", Payload::Empty)
    }

    fn finish(self, content_type: &str, payload: Payload) -> Response {
        Response {
            code: self.code,
            payload,
            content_type: content_type.to_owned(),
            headers: self.headers,
        }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response { Response::bytes(ContentType::OctetStream, self) }
}

impl IntoResponse for serde_json::Value {
    fn into_response(self) -> Response { Response::json(self) }
}

/// `(201, body)`: any body with a custom status code.
impl<R: IntoResponse> IntoResponse for (u16, R) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        response.set_code(self.0);
        response
    }
}

/// Serializes `T` with serde. A value serde cannot represent becomes a `500`.
///
/// ```rust
/// use weir::{Json, IntoResponse};
///
/// #[derive(serde::Serialize)]
/// struct Student { id: u32, name: &'static str }
///
/// let response = Json(Student { id: 1, name: "alice" }).into_response();
/// assert_eq!(response.code(), 200);
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.0) {
            Ok(value) => Response::json(value),
            Err(e) => Response::new(500, Payload::Text(e.to_string())),
        }
    }
}
