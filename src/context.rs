//! Per-request context and the chain cursor.
//!
//! The context is the only mutable state a chain touches: the request view,
//! the response being built, the sticky error slot, and the continuation
//! (the chain being run plus a cursor into it).
//!
//! # Onion order
//!
//! [`Context::next`] calls the next link *directly*, so a middleware that
//! does work on both sides of `next()` nests around everything after it:
//!
//! ```text
//! m1 pre ─► m2 pre ─► m3 pre ─► handler
//!                                  │
//! m1 post ◄─ m2 post ◄─ m3 post ◄──┘
//! ```
//!
//! # Short-circuit
//!
//! Once [`Context::report`] has been called, `next()` does nothing for the
//! rest of the request. Middlewares already on the stack still run their
//! post-`next()` code as it unwinds.

use crate::error::ServiceError;
use crate::middleware::{Chain, Link};
use crate::pool::Poolable;
use crate::request::Request;
use crate::response::Response;

/// State for one in-flight request. Owned by exactly one request at a time.
#[derive(Default)]
pub struct Context {
    request: Request,
    response: Response,
    error: Option<ServiceError>,
    chain: Option<Chain>,
    cursor: usize,
}

impl Context {
    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }
    pub fn error(&self) -> Option<&ServiceError> { self.error.as_ref() }

    /// Runs the rest of the chain, then returns.
    ///
    /// Does nothing once an error has been reported or once the terminal
    /// handler has been reached, so calling it twice can never run the
    /// handler twice.
    pub fn next(&mut self) {
        if self.error.is_some() {
            return;
        }
        // The chain is shared by every request on this route; cloning the
        // handle lets the link borrow `self` mutably.
        let Some(chain) = self.chain.clone() else { return };
        let Some(link) = chain.link(self.cursor) else { return };
        self.cursor += 1;

        match link {
            Link::Middleware(middleware) => middleware.handle(self),
            Link::Terminal(handler) => match handler.call(&self.request) {
                Ok(response) => self.response.merge(response),
                Err(err) => self.report(err),
            },
        }
    }

    /// Records an error and stops forward progress of the chain.
    ///
    /// The first report wins. The slot is never cleared while the request
    /// is in flight.
    pub fn report(&mut self, err: ServiceError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn drive(&mut self, chain: Chain) {
        self.chain = Some(chain);
        self.cursor = 0;
        self.next();
        self.chain = None;
    }

    pub(crate) fn outcome(&mut self) -> Result<&mut Response, &ServiceError> {
        match self.error {
            Some(ref err) => Err(err),
            None => Ok(&mut self.response),
        }
    }
}

impl Poolable for Context {
    fn reset(&mut self) {
        self.request.reset();
        self.response.reset();
        self.error = None;
        self.chain = None;
        self.cursor = 0;
    }
}
