//! Middleware and the chain executor.
//!
//! A middleware is anything that can look at a [`Context`] and decide
//! whether the rest of the chain runs. Plain functions qualify:
//!
//! ```rust
//! use weir::Context;
//!
//! fn powered_by(ctx: &mut Context) {
//!     ctx.next();
//!     ctx.response_mut().set_header("x-powered-by", "weir");
//! }
//! ```
//!
//! A [`Chain`] is an ordered list of middlewares plus one terminal handler.
//! Chains are built once per `(route, method)` when the app is compiled and
//! shared by every request on that route.
//!
//! Built-in middleware:
//! - [`trace`]: request id, per-request span, latency log
//! - [`require`]: required params, headers, and body
//! - [`throttle`]: per-key sliding-window rate limit

use std::sync::Arc;

use crate::context::Context;
use crate::error::ServiceError;
use crate::handler::{BoxedHandler, Handler};
use crate::response::Response;

pub mod require;
pub mod throttle;
pub mod trace;

pub use require::{Require, require};
pub use throttle::{ByRemoteIp, ThrottleKey, Throttling};
pub use trace::{TraceId, trace};

/// A link in a chain.
///
/// Call [`Context::next`] to hand over to the rest of the chain; skip it to
/// stop here.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: &mut Context);
}

impl<F> Middleware for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut Context) {
        self(ctx)
    }
}

/// A type-erased middleware, cheap to share between chains.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Erases a middleware so it can be stored alongside others.
pub fn boxed(middleware: impl Middleware) -> BoxedMiddleware {
    Arc::new(middleware)
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Ordered middlewares followed by a terminal handler. Immutable once built.
#[derive(Clone)]
pub struct Chain(Arc<Links>);

struct Links {
    middlewares: Vec<BoxedMiddleware>,
    terminal: BoxedHandler,
}

pub(crate) enum Link<'a> {
    Middleware(&'a BoxedMiddleware),
    Terminal(&'a BoxedHandler),
}

impl Chain {
    pub fn new(middlewares: Vec<BoxedMiddleware>, terminal: impl Handler) -> Self {
        Self::from_parts(middlewares, terminal.into_boxed_handler())
    }

    pub(crate) fn from_parts(middlewares: Vec<BoxedMiddleware>, terminal: BoxedHandler) -> Self {
        Self(Arc::new(Links { middlewares, terminal }))
    }

    /// Number of middlewares, not counting the terminal handler.
    pub fn len(&self) -> usize {
        self.0.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.middlewares.is_empty()
    }

    /// Runs the chain over `ctx` and yields what it produced.
    ///
    /// The first middleware is entered once; everything after that is up to
    /// the middlewares themselves via [`Context::next`].
    pub fn run<'c>(&self, ctx: &'c mut Context) -> Result<&'c mut Response, &'c ServiceError> {
        ctx.drive(self.clone());
        ctx.outcome()
    }

    pub(crate) fn link(&self, cursor: usize) -> Option<Link<'_>> {
        let links = &*self.0;
        match cursor.cmp(&links.middlewares.len()) {
            std::cmp::Ordering::Less => Some(Link::Middleware(&links.middlewares[cursor])),
            std::cmp::Ordering::Equal => Some(Link::Terminal(&links.terminal)),
            std::cmp::Ordering::Greater => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::request::Request;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> BoxedMiddleware {
        let log = Arc::clone(log);
        boxed(move |ctx: &mut Context| {
            log.lock().unwrap().push(format!("{name} pre"));
            ctx.next();
            log.lock().unwrap().push(format!("{name} post"));
        })
    }

    fn counting_handler(hits: &Arc<AtomicUsize>) -> impl Handler {
        let hits = Arc::clone(hits);
        move |_: &Request| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ServiceError>("done")
        }
    }

    #[test]
    fn onion_order() {
        let log = Log::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new(
            vec![recorder(&log, "m1"), recorder(&log, "m2"), recorder(&log, "m3")],
            counting_handler(&hits),
        );

        let mut ctx = Context::default();
        let response = chain.run(&mut ctx).unwrap();

        assert_eq!(response.code(), 200);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            *log.lock().unwrap(),
            ["m1 pre", "m2 pre", "m3 pre", "m3 post", "m2 post", "m1 post"]
        );
    }

    #[test]
    fn report_without_next_short_circuits() {
        let log = Log::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let deny = boxed(|ctx: &mut Context| ctx.report(ServiceError::forbidden("no token")));
        let chain = Chain::new(
            vec![recorder(&log, "m1"), deny, recorder(&log, "m3")],
            counting_handler(&hits),
        );

        let mut ctx = Context::default();
        let err = chain.run(&mut ctx).unwrap_err();

        assert_eq!(err.code(), 403);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock().unwrap(), ["m1 pre", "m1 post"]);
    }

    #[test]
    fn report_then_next_is_still_a_no_op() {
        let hits = Arc::new(AtomicUsize::new(0));
        let deny = boxed(|ctx: &mut Context| {
            ctx.report(ServiceError::bad_request("nope"));
            ctx.next();
        });
        let chain = Chain::new(vec![deny], counting_handler(&hits));

        let mut ctx = Context::default();
        assert!(chain.run(&mut ctx).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn next_twice_runs_terminal_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let greedy = boxed(|ctx: &mut Context| {
            ctx.next();
            ctx.next();
            ctx.next();
        });
        let chain = Chain::new(vec![greedy], counting_handler(&hits));

        let mut ctx = Context::default();
        chain.run(&mut ctx).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn middleware_without_next_owns_the_response() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cached = boxed(|ctx: &mut Context| {
            ctx.response_mut().set_code(304);
        });
        let chain = Chain::new(vec![cached], counting_handler(&hits));

        let mut ctx = Context::default();
        assert_eq!(chain.run(&mut ctx).unwrap().code(), 304);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_error_is_sticky_and_first_report_wins() {
        let overwrite = boxed(|ctx: &mut Context| {
            ctx.next();
            ctx.report(ServiceError::internal("late"));
        });
        let chain = Chain::new(vec![overwrite], |_: &Request| {
            Err::<Response, _>(ServiceError::not_found("student 7 is not found"))
        });

        let mut ctx = Context::default();
        let err = chain.run(&mut ctx).unwrap_err();
        assert_eq!(err.code(), 404);
        assert_eq!(err.message(), "student 7 is not found");
    }

    #[test]
    fn empty_chain_runs_terminal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new(Vec::new(), counting_handler(&hits));
        assert!(chain.is_empty());

        let mut ctx = Context::default();
        chain.run(&mut ctx).unwrap();
        // The chain is detached after `run`; stray calls do nothing.
        ctx.next();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
