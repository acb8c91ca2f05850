//! Rate-limit middleware on top of [`Throttle`].
//!
//! Every response on a throttled route carries two headers:
//!
//! | Header | Value |
//! |---|---|
//! | `X-Next-Window` | RFC 3339 UTC instant the current window ends |
//! | `X-Hit-Remain` | hits left in the window, never negative |
//!
//! A hit in a full window is reported as a `429` and the chain stops.

use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use tracing::warn;

use crate::context::Context;
use crate::error::ServiceError;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;
use crate::throttle::{Record, Throttle, ThrottleConfig};

pub const NEXT_WINDOW_HEADER: &str = "X-Next-Window";
pub const HIT_REMAIN_HEADER: &str = "X-Hit-Remain";

/// Picks the throttle key for a request. `None` lets the request through
/// unthrottled.
pub trait ThrottleKey: Send + Sync + 'static {
    fn key(&self, req: &Request) -> Option<String>;
}

impl<F> ThrottleKey for F
where
    F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
{
    fn key(&self, req: &Request) -> Option<String> {
        self(req)
    }
}

/// Keys on the client IP, ignoring the port.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByRemoteIp;

impl ThrottleKey for ByRemoteIp {
    fn key(&self, req: &Request) -> Option<String> {
        req.remote_addr().map(|addr| addr.ip().to_string())
    }
}

/// Throttling middleware. Several instances may share one [`Throttle`].
pub struct Throttling<K> {
    throttle: Arc<Throttle>,
    key: K,
    limit: u32,
    window: Duration,
}

impl Throttling<ByRemoteIp> {
    /// `limit` hits per `window` per client IP.
    pub fn by_remote_ip(throttle: Arc<Throttle>, limit: u32, window: Duration) -> Self {
        Self::by_key(throttle, ByRemoteIp, limit, window)
    }

    pub fn from_config(throttle: Arc<Throttle>, config: &ThrottleConfig) -> Self {
        Self::by_remote_ip(throttle, config.limit, config.window())
    }
}

impl<K: ThrottleKey> Throttling<K> {
    pub fn by_key(throttle: Arc<Throttle>, key: K, limit: u32, window: Duration) -> Self {
        Self { throttle, key, limit, window }
    }
}

impl<K: ThrottleKey> Middleware for Throttling<K> {
    fn handle(&self, ctx: &mut Context) {
        let Some(key) = self.key.key(ctx.request()) else {
            ctx.next();
            return;
        };

        match self.throttle.hit(&key, self.limit, self.window) {
            Ok(record) => {
                ctx.next();
                stamp(ctx.response_mut(), &record);
            }
            Err(throttled) => {
                warn!(
                    key = %key,
                    path = ctx.request().path(),
                    excess = throttled.record.excess(),
                    "throttled"
                );
                stamp(ctx.response_mut(), &throttled.record);
                ctx.report(ServiceError::throttled(throttled.to_string()));
            }
        }
    }
}

fn stamp(response: &mut Response, record: &Record) {
    response.set_header(
        NEXT_WINDOW_HEADER,
        record.window_expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    response.set_header(HIT_REMAIN_HEADER, record.remaining().to_string());
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::middleware::{Chain, boxed};
    use crate::throttle::ManualClock;

    #[test]
    fn headers_and_rejection() {
        let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let throttle = Arc::new(Throttle::with_clock(clock.clone()));
        let key = |_: &Request| Some("client".to_owned());
        let chain = Chain::new(
            vec![boxed(Throttling::by_key(throttle, key, 2, Duration::from_secs(60)))],
            |_: &Request| Ok::<_, ServiceError>("ok"),
        );

        let mut remains = Vec::new();
        for _ in 0..2 {
            let mut ctx = Context::default();
            let response = chain.run(&mut ctx).unwrap();
            assert_eq!(response.header(NEXT_WINDOW_HEADER), Some("2026-10-19T12:01:00Z"));
            remains.push(response.header(HIT_REMAIN_HEADER).unwrap().to_owned());
            clock.advance(Duration::from_secs(10));
        }
        assert_eq!(remains, ["1", "0"]);

        let mut ctx = Context::default();
        let err = chain.run(&mut ctx).unwrap_err().clone();
        assert_eq!(err.code(), 429);
        assert_eq!(ctx.response().header(HIT_REMAIN_HEADER), Some("0"));
        assert_eq!(ctx.response().header(NEXT_WINDOW_HEADER), Some("2026-10-19T12:01:00Z"));
    }

    #[test]
    fn requests_without_a_key_pass_through() {
        let throttle = Arc::new(Throttle::new());
        let chain = Chain::new(
            vec![boxed(Throttling::by_remote_ip(throttle.clone(), 0, Duration::from_secs(60)))],
            |_: &Request| Ok::<_, ServiceError>("ok"),
        );

        let mut ctx = Context::default();
        let response = chain.run(&mut ctx).unwrap();
        assert_eq!(response.header(HIT_REMAIN_HEADER), None);
        assert!(throttle.is_empty());
    }
}
