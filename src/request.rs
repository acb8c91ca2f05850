//! Incoming request view.
//!
//! A [`Request`] is part of a pooled [`Context`](crate::Context). The
//! transport fills it right after acquisition and the pool clears it on
//! release, so the same maps serve request after request.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;

use crate::error::ServiceError;
use crate::method::Method;

/// An incoming HTTP request with its route match results.
#[derive(Debug, Default)]
pub struct Request {
    id: String,
    method: Method,
    wire_method: http::Method,
    uri: String,
    path: String,
    uri_pattern: String,
    service_id: String,
    headers: HeaderMap,
    body: Bytes,
    path_params: HashMap<String, String>,
    query_params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    extensions: http::Extensions,
}

impl Request {
    /// Per-request identifier (UUID v4), also used in error bodies and logs.
    pub fn id(&self) -> &str { &self.id }
    /// The routed method. A request whose method is not a [`Method`] only
    /// reaches the fallback `405` chain, where this stays at its default.
    pub fn method(&self) -> Method { self.method }
    /// The method token exactly as received, e.g. `"PURGE"`.
    pub fn method_str(&self) -> &str { self.wire_method.as_str() }
    /// Path plus query string, as received.
    pub fn uri(&self) -> &str { &self.uri }
    pub fn path(&self) -> &str { &self.path }
    /// The route pattern that matched, e.g. `/students/{sid}`.
    pub fn uri_pattern(&self) -> &str { &self.uri_pattern }
    /// Id of the service that owns the matched route.
    pub fn service_id(&self) -> &str { &self.service_id }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn path_params(&self) -> &HashMap<String, String> { &self.path_params }
    pub fn query_params(&self) -> &HashMap<String, String> { &self.query_params }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/students/{sid}`, `req.param("sid")` on `/students/42`
    /// returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.path_params.get(key).map(String::as_str)
    }

    /// Returns a query parameter. Repeated keys keep the last value.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    /// Deserializes the JSON body. Malformed input is a `400`.
    pub fn unmarshal_body<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ServiceError::bad_request(format!("invalid request body: {e}")))
    }

    /// A typed value stored by an earlier middleware.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Stores a typed value for later middlewares and the handler. Returns
    /// the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions.remove::<T>()
    }

    // ── Filled by the dispatcher ─────────────────────────────────────────────

    pub(crate) fn populate(
        &mut self,
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) {
        self.id = uuid::Uuid::new_v4().to_string();
        self.uri.push_str(parts.uri.path_and_query().map_or("/", |pq| pq.as_str()));
        self.path.push_str(parts.uri.path());
        if let Some(query) = parts.uri.query() {
            self.query_params.extend(
                url::form_urlencoded::parse(query.as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }
        self.wire_method = parts.method;
        self.headers = parts.headers;
        self.body = body;
        self.remote_addr = remote_addr;
    }

    pub(crate) fn set_route(&mut self, method: Option<Method>, service_id: &str, uri_pattern: &str) {
        if let Some(method) = method {
            self.method = method;
        }
        self.service_id.push_str(service_id);
        self.uri_pattern.push_str(uri_pattern);
    }

    pub(crate) fn path_params_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.path_params
    }

    pub(crate) fn reset(&mut self) {
        self.id.clear();
        self.method = Method::default();
        self.wire_method = http::Method::GET;
        self.uri.clear();
        self.path.clear();
        self.uri_pattern.clear();
        self.service_id.clear();
        self.headers.clear();
        self.body = Bytes::new();
        self.path_params.clear();
        self.query_params.clear();
        self.remote_addr = None;
        self.extensions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str) -> http::request::Parts {
        http::Request::builder()
            .uri(uri)
            .header("X-Token", "abc")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn populate_parses_query_and_keeps_last_duplicate() {
        let mut req = Request::default();
        req.populate(parts("/students?grade=3&name=a%20b&grade=4"), Bytes::new(), None);

        assert_eq!(req.path(), "/students");
        assert_eq!(req.uri(), "/students?grade=3&name=a%20b&grade=4");
        assert_eq!(req.query("name"), Some("a b"));
        assert_eq!(req.query("grade"), Some("4"));
        assert_eq!(req.header("x-token"), Some("abc"));
        assert!(!req.id().is_empty());
    }

    #[test]
    fn unmarshal_body_reports_bad_request() {
        #[derive(serde::Deserialize)]
        struct Student {
            name: String,
        }

        let mut req = Request::default();
        req.populate(parts("/"), Bytes::from_static(br#"{"name":"alice"}"#), None);
        assert_eq!(req.unmarshal_body::<Student>().unwrap().name, "alice");

        req.reset();
        req.populate(parts("/"), Bytes::from_static(b"{nope"), None);
        let err = req.unmarshal_body::<Student>().err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::BadRequest);
    }

    #[test]
    fn reset_clears_map_contents() {
        #[derive(Clone)]
        struct User;

        let mut req = Request::default();
        req.populate(parts("/a?b=c"), Bytes::from_static(b"body"), Some(([127, 0, 0, 1], 9).into()));
        req.set_route(Some(Method::Post), "svc", "/a");
        req.path_params_mut().insert("k".into(), "v".into());
        req.insert(User);

        req.reset();

        assert!(req.id().is_empty() && req.uri().is_empty() && req.uri_pattern().is_empty());
        assert!(req.headers().is_empty());
        assert!(req.body().is_empty());
        assert!(req.path_params().is_empty() && req.query_params().is_empty());
        assert!(req.get::<User>().is_none());
        assert_eq!(req.remote_addr(), None);
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.method_str(), "GET");
    }
}
