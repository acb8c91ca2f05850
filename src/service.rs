//! Services: named groups of routes sharing a middleware stack.
//!
//! ```rust
//! use weir::{Request, Route, Service, ServiceError};
//! use weir::middleware::{boxed, require};
//!
//! fn get_student(req: &Request) -> Result<String, ServiceError> {
//!     Ok(format!("student {}", req.param("sid").unwrap_or_default()))
//! }
//!
//! fn delete_student(_: &Request) -> Result<weir::Response, ServiceError> {
//!     Ok(weir::Response::status(204))
//! }
//!
//! let students = Service::builder("student")
//!     .route(
//!         Route::new("/students/{sid}")
//!             .get(get_student)
//!             .on_with(weir::Method::Delete, delete_student, vec![boxed(require().header("authorization"))]),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(students.supports_pattern("/students/{sid}"));
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::BoxedMiddleware;

/// Handlers for one path pattern, keyed by method.
pub struct Route {
    path: String,
    methods: BTreeMap<Method, Endpoint>,
}

pub(crate) struct Endpoint {
    pub(crate) middlewares: Vec<BoxedMiddleware>,
    pub(crate) handler: BoxedHandler,
}

impl Route {
    /// `path` uses `{name}` for path parameters and `{*rest}` for a catch-all.
    pub fn new(path: &str) -> Self {
        Self { path: path.to_owned(), methods: BTreeMap::new() }
    }

    /// Registers `handler` for `method`, replacing any earlier one.
    pub fn on(self, method: Method, handler: impl Handler) -> Self {
        self.on_with(method, handler, Vec::new())
    }

    /// Like [`Route::on`], with middlewares that run only for this method,
    /// after the app's and the service's middlewares.
    pub fn on_with(mut self, method: Method, handler: impl Handler, middlewares: Vec<BoxedMiddleware>) -> Self {
        let endpoint = Endpoint { middlewares, handler: handler.into_boxed_handler() };
        self.methods.insert(method, endpoint);
        self
    }

    pub fn get(self, handler: impl Handler) -> Self { self.on(Method::Get, handler) }
    pub fn post(self, handler: impl Handler) -> Self { self.on(Method::Post, handler) }
    pub fn put(self, handler: impl Handler) -> Self { self.on(Method::Put, handler) }
    pub fn patch(self, handler: impl Handler) -> Self { self.on(Method::Patch, handler) }
    pub fn delete(self, handler: impl Handler) -> Self { self.on(Method::Delete, handler) }
    pub fn head(self, handler: impl Handler) -> Self { self.on(Method::Head, handler) }
    pub fn options(self, handler: impl Handler) -> Self { self.on(Method::Options, handler) }
    pub fn connect(self, handler: impl Handler) -> Self { self.on(Method::Connect, handler) }
    pub fn trace(self, handler: impl Handler) -> Self { self.on(Method::Trace, handler) }
}

/// A named, immutable set of routes. Build with [`Service::builder`].
pub struct Service {
    id: String,
    middlewares: Vec<BoxedMiddleware>,
    routes: HashMap<String, BTreeMap<Method, Endpoint>>,
}

impl Service {
    pub fn builder(id: &str) -> ServiceBuilder {
        ServiceBuilder {
            id: id.to_owned(),
            middlewares: Vec::new(),
            routes: HashMap::new(),
            err: None,
        }
    }

    pub fn id(&self) -> &str { &self.id }

    pub fn uri_patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn supports_pattern(&self, pattern: &str) -> bool {
        self.routes.contains_key(pattern)
    }

    pub fn supports_method(&self, pattern: &str, method: Method) -> bool {
        self.routes.get(pattern).is_some_and(|m| m.contains_key(&method))
    }

    /// Methods registered for `pattern`, in a stable order.
    pub fn supported_methods(&self, pattern: &str) -> Vec<Method> {
        self.routes.get(pattern).map(|m| m.keys().copied().collect()).unwrap_or_default()
    }

    pub(crate) fn into_parts(self) -> (String, Vec<BoxedMiddleware>, HashMap<String, BTreeMap<Method, Endpoint>>) {
        (self.id, self.middlewares, self.routes)
    }
}

/// Collects routes and middlewares; the first mistake is kept and returned
/// by [`ServiceBuilder::build`].
pub struct ServiceBuilder {
    id: String,
    middlewares: Vec<BoxedMiddleware>,
    routes: HashMap<String, BTreeMap<Method, Endpoint>>,
    err: Option<Error>,
}

impl ServiceBuilder {
    /// Adds a middleware that runs for every route of this service.
    pub fn middleware(mut self, middleware: BoxedMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        if self.err.is_some() {
            return self;
        }
        if self.routes.contains_key(&route.path) {
            self.err = Some(Error::DuplicatePath(route.path));
            return self;
        }
        self.routes.insert(route.path, route.methods);
        self
    }

    pub fn build(self) -> Result<Service, Error> {
        if let Some(err) = self.err {
            return Err(err);
        }
        if self.id.is_empty() {
            return Err(Error::InvalidService("service id is empty"));
        }
        if self.routes.is_empty() || self.routes.values().all(BTreeMap::is_empty) {
            return Err(Error::InvalidService("service has no handlers"));
        }
        Ok(Service { id: self.id, middlewares: self.middlewares, routes: self.routes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::request::Request;

    fn ok(_: &Request) -> Result<&'static str, ServiceError> {
        Ok("ok")
    }

    #[test]
    fn supported_methods_are_sorted() {
        let svc = Service::builder("student")
            .route(Route::new("/students").post(ok).get(ok))
            .build()
            .unwrap();

        assert_eq!(svc.supported_methods("/students"), [Method::Get, Method::Post]);
        assert!(svc.supports_method("/students", Method::Get));
        assert!(!svc.supports_method("/students", Method::Delete));
        assert!(svc.supported_methods("/nope").is_empty());
        assert_eq!(svc.uri_patterns().collect::<Vec<_>>(), ["/students"]);
    }

    #[test]
    fn build_rejects_bad_definitions() {
        let dup = Service::builder("s")
            .route(Route::new("/a").get(ok))
            .route(Route::new("/a").post(ok))
            .build();
        assert!(matches!(dup, Err(Error::DuplicatePath(p)) if p == "/a"));

        let no_id = Service::builder("").route(Route::new("/a").get(ok)).build();
        assert!(matches!(no_id, Err(Error::InvalidService(_))));

        let empty = Service::builder("s").route(Route::new("/a")).build();
        assert!(matches!(empty, Err(Error::InvalidService(_))));
    }
}
