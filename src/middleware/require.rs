//! Request preconditions checked before the handler runs.
//!
//! ```rust
//! use weir::middleware::{boxed, require};
//!
//! let status_check = boxed(
//!     require()
//!         .query_param("timestamp")
//!         .header("authorization")
//!         .body(),
//! );
//! ```
//!
//! The first missing item is reported as a `400` and the chain stops.

use crate::context::Context;
use crate::error::ServiceError;
use crate::middleware::Middleware;
use crate::request::Request;

/// Builder and middleware in one. See [`require`].
#[derive(Clone, Debug, Default)]
pub struct Require {
    body: bool,
    path_params: Vec<String>,
    query_params: Vec<String>,
    headers: Vec<String>,
}

/// Starts an empty set of requirements.
pub fn require() -> Require {
    Require::default()
}

impl Require {
    /// Rejects an empty body.
    pub fn body(mut self) -> Self {
        self.body = true;
        self
    }

    pub fn path_param(mut self, name: &str) -> Self {
        self.path_params.push(name.to_owned());
        self
    }

    pub fn query_param(mut self, name: &str) -> Self {
        self.query_params.push(name.to_owned());
        self
    }

    pub fn header(mut self, name: &str) -> Self {
        self.headers.push(name.to_owned());
        self
    }

    fn check(&self, req: &Request) -> Result<(), ServiceError> {
        if self.body && req.body().is_empty() {
            return Err(ServiceError::bad_request("request body is missing"));
        }
        let missing = |kind: &str, name: &str| {
            ServiceError::bad_request(format!("required {kind} {name} is missing"))
        };
        for name in &self.path_params {
            if req.param(name).is_none_or(str::is_empty) {
                return Err(missing("path parameter", name));
            }
        }
        for name in &self.query_params {
            if req.query(name).is_none_or(str::is_empty) {
                return Err(missing("query parameter", name));
            }
        }
        for name in &self.headers {
            if req.header(name).is_none_or(str::is_empty) {
                return Err(missing("header field", name));
            }
        }
        Ok(())
    }
}

impl Middleware for Require {
    fn handle(&self, ctx: &mut Context) {
        match self.check(ctx.request()) {
            Ok(()) => ctx.next(),
            Err(err) => ctx.report(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::ErrorKind;
    use crate::middleware::{Chain, boxed};

    fn context(uri: &str, body: &'static [u8]) -> Context {
        let parts = http::Request::builder().uri(uri).body(()).unwrap().into_parts().0;
        let mut ctx = Context::default();
        ctx.request_mut().populate(parts, Bytes::from_static(body), None);
        ctx
    }

    fn chain(require: Require) -> Chain {
        Chain::new(vec![boxed(require)], |_: &Request| Ok::<_, ServiceError>("ok"))
    }

    #[test]
    fn missing_query_param_is_a_bad_request() {
        let chain = chain(require().query_param("timestamp").body());

        let mut ctx = context("/status", b"{}");
        let err = chain.run(&mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "required query parameter timestamp is missing");

        let mut ctx = context("/status?timestamp=1", b"");
        assert_eq!(chain.run(&mut ctx).unwrap_err().message(), "request body is missing");

        let mut ctx = context("/status?timestamp=1", b"{}");
        assert!(chain.run(&mut ctx).is_ok());
    }

    #[test]
    fn missing_header_is_a_bad_request() {
        let chain = chain(require().header("authorization"));
        let mut ctx = context("/", b"");
        assert_eq!(
            chain.run(&mut ctx).unwrap_err().message(),
            "required header field authorization is missing"
        );
    }
}
