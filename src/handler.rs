//! Handler trait and type erasure.
//!
//! # How terminal handlers are stored
//!
//! A service holds handlers of *different* types per `(pattern, method)`.
//! Rust collections can only hold one concrete type, so each handler is put
//! behind a trait object (`dyn ErasedHandler`) and stored uniformly.
//!
//! ```text
//! fn get_student(req: &Request) -> Result<Json<Student>, ServiceError>   ← user writes this
//!        ↓ Route::new("/students/{sid}").get(get_student)
//! get_student.into_boxed_handler()                                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_student))                                        ← shared by every chain
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(&request)  as the last link of the chain                   ← one vtable dispatch
//! ```
//!
//! Handlers are synchronous. The transport has already collected the body by
//! the time a chain runs, so there is nothing left to await.

use std::sync::Arc;

use crate::error::ServiceError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: &Request) -> Result<Response, ServiceError>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid terminal handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the signature:
///
/// ```text
/// fn name(req: &Request) -> Result<impl IntoResponse, ServiceError>
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, R> private::Sealed for F
where
    F: Fn(&Request) -> Result<R, ServiceError> + Send + Sync + 'static,
    R: IntoResponse,
{
}

impl<F, R> Handler for F
where
    F: Fn(&Request) -> Result<R, ServiceError> + Send + Sync + 'static,
    R: IntoResponse,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, R> ErasedHandler for FnHandler<F>
where
    F: Fn(&Request) -> Result<R, ServiceError> + Send + Sync,
    R: IntoResponse,
{
    fn call(&self, req: &Request) -> Result<Response, ServiceError> {
        (self.0)(req).map(IntoResponse::into_response)
    }
}
