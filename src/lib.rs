//! # weir
//!
//! A small HTTP service toolkit built on hyper.
//!
//! - **Onion middleware chains.** A middleware calls
//!   [`Context::next`] to run the rest of the chain and can act on both
//!   sides of it. [`Context::report`] stops the chain, and the first error
//!   reported is the one the client sees.
//! - **Pooled contexts.** Every request borrows a [`Context`] from a
//!   bounded [`Pool`] and returns it clean, so steady-state traffic
//!   reuses the same maps and buffers.
//! - **Services.** Named groups of routes with their own middlewares,
//!   compiled into one radix tree ([`matchit`]) when the [`App`] is built.
//! - **Throttling.** A sliding-window limiter keyed by anything (remote IP
//!   by default) where overshoot in one window is carried into the next as
//!   a penalty. See [`throttle`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use weir::middleware::{Throttling, boxed, trace};
//! use weir::throttle::Throttle;
//! use weir::{App, Json, Request, Route, Server, Service, ServiceError, health};
//!
//! #[derive(serde::Serialize)]
//! struct Student {
//!     id: String,
//! }
//!
//! fn get_student(req: &Request) -> Result<Json<Student>, ServiceError> {
//!     let id = req.param("sid").ok_or_else(|| ServiceError::bad_request("missing sid"))?;
//!     Ok(Json(Student { id: id.to_owned() }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), weir::Error> {
//!     let throttle = Arc::new(Throttle::new());
//!     throttle.spawn_sweeper(Duration::from_secs(300));
//!
//!     let students = Service::builder("student")
//!         .middleware(boxed(Throttling::by_remote_ip(throttle, 60, Duration::from_secs(60))))
//!         .route(Route::new("/students/{sid}").get(get_student))
//!         .build()?;
//!
//!     let app = App::new()
//!         .middleware(boxed(trace))
//!         .service(health::service("/healthz")?)
//!         .service(students);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//! ```

mod app;
mod config;
mod context;
mod error;
mod handler;
mod method;
mod pool;
mod request;
mod response;
mod router;
mod server;
mod service;

pub mod health;
pub mod middleware;
pub mod throttle;

pub use app::{App, Dispatcher};
pub use config::{Config, PoolConfig, ServerConfig};
pub use context::Context;
pub use error::{Error, ErrorKind, ServiceError};
pub use handler::Handler;
pub use method::Method;
pub use pool::{Pool, Poolable, Pooled};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Json, Payload, Response, ResponseBuilder};
pub use server::{Server, shutdown_signal};
pub use service::{Route, Service, ServiceBuilder};
