//! App assembly and request dispatch.
//!
//! [`App`] collects app-wide middlewares and services. [`App::build`]
//! flattens every `(pattern, method)` into one [`Chain`]:
//!
//! ```text
//! app middlewares ─► service middlewares ─► route middlewares ─► handler
//! ```
//!
//! The resulting [`Dispatcher`] is immutable and shared by all connections.
//! It owns the context pool; each request borrows one context, runs its
//! chain, and the context goes back clean when the response is built.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http_body_util::Full;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, ServiceError};
use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, Chain};
use crate::pool::Pool;
use crate::request::Request;
use crate::response::{CONTENT_TYPE_JSON, Response};
use crate::router::Router;
use crate::service::Service;

/// Builder for a [`Dispatcher`].
///
/// ```rust
/// use weir::{App, Request, Route, Service, ServiceError};
/// use weir::middleware::{boxed, trace};
///
/// fn hello(_: &Request) -> Result<&'static str, ServiceError> {
///     Ok("hello")
/// }
///
/// let dispatcher = App::new()
///     .middleware(boxed(trace))
///     .service(Service::builder("hello").route(Route::new("/hello").get(hello)).build().unwrap())
///     .build()
///     .unwrap();
///
/// let res = dispatcher.handle(http::Request::get("/hello").body(Default::default()).unwrap(), None);
/// assert_eq!(res.status(), 200);
/// ```
pub struct App {
    middlewares: Vec<BoxedMiddleware>,
    services: Vec<Service>,
    max_idle_contexts: usize,
    attach_error_context: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
            services: Vec::new(),
            max_idle_contexts: 1024,
            attach_error_context: false,
        }
    }

    /// Takes the pool size and error rendering from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .max_idle_contexts(config.pool.max_idle)
            .attach_error_context(config.server.attach_error_context)
    }

    /// Adds a middleware that runs for every request, including ones that
    /// end in `405`.
    pub fn middleware(mut self, middleware: BoxedMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn max_idle_contexts(mut self, n: usize) -> Self {
        self.max_idle_contexts = n;
        self
    }

    /// Sends errors as `{"message", "request_id", "path"}` JSON instead of
    /// the bare message.
    pub fn attach_error_context(mut self, on: bool) -> Self {
        self.attach_error_context = on;
        self
    }

    /// Compiles every route into a chain and registers it in the router.
    ///
    /// Fails on a repeated service id, or on a pattern that is malformed or
    /// collides with another service's pattern.
    pub fn build(self) -> Result<Dispatcher, Error> {
        let mut ids = HashSet::new();
        let mut router = Router::new();

        for service in self.services {
            let (id, service_middlewares, routes) = service.into_parts();
            if !ids.insert(id.clone()) {
                return Err(Error::DuplicateService(id));
            }

            let patterns = routes.len();
            for (pattern, endpoints) in routes {
                let allow = endpoints.keys().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                let chains = endpoints
                    .into_iter()
                    .map(|(method, endpoint)| {
                        let middlewares = self
                            .middlewares
                            .iter()
                            .chain(&service_middlewares)
                            .chain(&endpoint.middlewares)
                            .cloned()
                            .collect();
                        (method, Chain::from_parts(middlewares, endpoint.handler))
                    })
                    .collect();
                let mount = Mount { service_id: id.clone(), pattern: pattern.clone(), allow, chains };
                router.insert(&pattern, mount)?;
            }
            info!(service = %id, patterns, "service registered");
        }

        let not_allowed = Chain::from_parts(self.middlewares, method_not_allowed.into_boxed_handler());

        Ok(Dispatcher {
            router,
            not_allowed,
            pool: Pool::new(self.max_idle_contexts),
            attach_error_context: self.attach_error_context,
        })
    }
}

/// Everything registered under one path pattern.
struct Mount {
    service_id: String,
    pattern: String,
    /// Value of the `Allow` header sent with a `405`.
    allow: String,
    chains: BTreeMap<Method, Chain>,
}

fn method_not_allowed(req: &Request) -> Result<Response, ServiceError> {
    Err(ServiceError::method_not_allowed(format!(
        "method {} is not allowed for uri pattern {}",
        req.method_str(),
        req.uri_pattern(),
    )))
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Routes requests to compiled chains. Built by [`App::build`].
///
/// Transport-agnostic: [`Server`](crate::Server) feeds it from hyper, tests
/// can call [`Dispatcher::handle`] directly.
pub struct Dispatcher {
    router: Router<Mount>,
    not_allowed: Chain,
    pool: Pool<Context>,
    attach_error_context: bool,
}

impl Dispatcher {
    /// Runs one request to completion. Never fails: routing misses, reported
    /// errors and handler panics all become error responses.
    pub fn handle(&self, req: http::Request<Bytes>, remote_addr: Option<SocketAddr>) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let mut ctx = self.pool.acquire();

        let mount = self.router.lookup(parts.uri.path(), ctx.request_mut().path_params_mut());
        let method = Method::from_http(&parts.method);
        ctx.request_mut().populate(parts, body, remote_addr);

        let Some(mount) = mount else {
            let err = ServiceError::not_found(format!("route {} is undefined", ctx.request().uri()));
            return self.render_error(&err, &ctx);
        };
        ctx.request_mut().set_route(method, &mount.service_id, &mount.pattern);

        // Unknown tokens and registered tokens without a handler share the
        // fallback chain.
        let chain = match method.and_then(|m| mount.chains.get(&m)) {
            Some(chain) => chain,
            None => {
                ctx.response_mut().set_header("allow", &mount.allow);
                &self.not_allowed
            }
        };
        debug!(
            request_id = ctx.request().id(),
            service = %mount.service_id,
            method = ctx.request().method_str(),
            pattern = %mount.pattern,
            "dispatching"
        );

        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = chain.run(&mut ctx);
        }));
        if let Err(panic) = run {
            let message = panic_message(panic.as_ref());
            error!(request_id = ctx.request().id(), "handler panicked: {message}");
            return self.render_error(&ServiceError::internal(message), &ctx);
        }

        if let Some(err) = ctx.error().cloned() {
            return self.render_error(&err, &ctx);
        }
        match ctx.response_mut().take_http() {
            Ok(response) => response,
            Err(err) => {
                warn!(request_id = ctx.request().id(), "unusable response: {err}");
                self.render_error(&err, &ctx)
            }
        }
    }

    /// Renders an error raised before a context exists, such as an oversized
    /// body.
    pub fn reject(&self, err: &ServiceError) -> http::Response<Full<Bytes>> {
        error_response(err.code(), err.content_type(), Bytes::from(err.message().to_owned()))
    }

    /// Contexts waiting in the pool.
    pub fn idle_contexts(&self) -> usize {
        self.pool.idle()
    }

    /// Error body plus whatever headers middlewares already stamped on the
    /// context's response, so a `429` still carries the throttle headers.
    fn render_error(&self, err: &ServiceError, ctx: &Context) -> http::Response<Full<Bytes>> {
        let mut response = if self.attach_error_context {
            let body = serde_json::json!({
                "message": err.message(),
                "request_id": ctx.request().id(),
                "path": ctx.request().path(),
            });
            error_response(err.code(), CONTENT_TYPE_JSON, Bytes::from(body.to_string()))
        } else {
            self.reject(err)
        };

        for (name, value) in ctx.response().headers() {
            let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) else {
                continue;
            };
            if name != CONTENT_TYPE {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

fn error_response(code: u16, content_type: &'static str, body: Bytes) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = http::StatusCode::from_u16(code).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}
