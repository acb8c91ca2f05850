//! Per-request tracing: a trace id, a span around the rest of the chain, and
//! one log line with status and latency when it unwinds.

use std::time::Instant;

use tracing::{debug, info_span};

use crate::context::Context;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Trace id of the current request, readable by later middlewares and the
/// handler via `req.get::<TraceId>()`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceId(pub String);

/// Install first so the span covers every other middleware.
pub fn trace(ctx: &mut Context) {
    let trace_id = uuid::Uuid::new_v4().to_string();
    ctx.request_mut().insert(TraceId(trace_id.clone()));

    let started = Instant::now();
    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = ctx.request().method_str(),
        path = ctx.request().path(),
    );
    let _entered = span.enter();

    ctx.next();

    let status = ctx.error().map_or(ctx.response().code(), |e| e.code());
    debug!(status, elapsed_us = started.elapsed().as_micros() as u64, "request finished");
    ctx.response_mut().set_header(TRACE_ID_HEADER, trace_id);
}
