//! Built-in health-check service.
//!
//! | Probe | Question |
//! |---|---|
//! | **Liveness** | Is the process alive? Failure → restart. |
//! | **Readiness** | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Mount both on one path, or write your own readiness handler if it has
//! to gate on dependencies:
//!
//! ```rust
//! use weir::{App, health};
//!
//! let app = App::new().service(health::service("/healthz").unwrap());
//! ```

use crate::error::{Error, ServiceError};
use crate::request::Request;
use crate::response::Response;
use crate::service::{Route, Service};

/// Id of the service returned by [`service`].
pub const SERVICE_ID: &str = "health-check";

/// Always `200 ok`. If the process can answer at all, it is alive.
pub fn liveness(_req: &Request) -> Result<Response, ServiceError> {
    Ok(Response::text("ok"))
}

/// `200 ready`. Replace it when the app needs a warm-up period.
pub fn readiness(_req: &Request) -> Result<Response, ServiceError> {
    Ok(Response::text("ready"))
}

/// A service answering `GET` and `HEAD` on `path` with [`liveness`].
pub fn service(path: &str) -> Result<Service, Error> {
    Service::builder(SERVICE_ID)
        .route(Route::new(path).get(liveness).head(liveness))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::response::Payload;

    #[test]
    fn service_answers_get_and_head() {
        let svc = service("/healthz").unwrap();
        assert_eq!(svc.id(), SERVICE_ID);
        assert_eq!(svc.supported_methods("/healthz"), [Method::Get, Method::Head]);
    }

    #[test]
    fn probes_answer_ok() {
        let req = Request::default();
        assert_eq!(liveness(&req).unwrap().payload(), &Payload::Text("ok".to_owned()));
        assert_eq!(readiness(&req).unwrap().code(), 200);
    }
}
