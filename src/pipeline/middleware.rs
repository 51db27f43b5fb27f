//! axum middleware stages of the request pipeline
//!
//! Each stage owns its own state, passed with `from_fn_with_state`. Stages
//! that need the request body go through `capture_request`, so the transport
//! is read once no matter how many stages are enabled.

use crate::pipeline::audit::AuditLogger;
use crate::pipeline::auth::BasicAuth;
use crate::pipeline::body_capture::capture_request;
use crate::pipeline::forwarder::{FanOutForwarder, MirrorRequest};
use crate::pipeline::truncate::Truncator;
use crate::pipeline::types::*;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    info!(method = %method, path = %uri.path(), "Incoming request");

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %uri.path(),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// Basic authentication. Bypass paths skip the check entirely.
pub async fn auth_middleware(
    State(auth): State<Arc<BasicAuth>>,
    mut request: Request,
    next: Next,
) -> Result<Response, PipelineError> {
    if auth.bypasses(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let user = auth.authenticate(request.headers()).await?;
    debug!(user_name = %user.user_name, role = %user.role, "Authenticated caller");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Audit logging: insert on arrival, update once the response is fully sent
pub async fn audit_middleware(
    State(logger): State<Arc<AuditLogger>>,
    request: Request,
    next: Next,
) -> Result<Response, PipelineError> {
    let (mut request, captured) = capture_request(request, logger.max_request_size()).await?;

    let method = request.method().clone();
    let record = logger.arrival_record(&request, captured.as_deref());
    let request_id = record.request_id;
    request.extensions_mut().insert(request_id);
    logger.record_arrival(&record).await;

    let response = next.run(request).await;
    Ok(logger.observe(request_id, &method, response))
}

/// Mirror the request to every target, then carry on without waiting
pub async fn mirror_middleware(
    State(forwarder): State<Arc<FanOutForwarder>>,
    request: Request,
    next: Next,
) -> Result<Response, PipelineError> {
    if forwarder.targets().is_empty() {
        return Ok(next.run(request).await);
    }

    let (request, captured) = capture_request(request, forwarder.max_request_size()).await?;
    let mirrored = MirrorRequest::from_request(&request, captured.as_deref());

    // Dropping the handles detaches the calls
    drop(forwarder.dispatch(&mirrored));

    Ok(next.run(request).await)
}

/// Truncate one oversized JSON field before the handler sees it
pub async fn truncate_middleware(
    State(truncator): State<Arc<Truncator>>,
    request: Request,
    next: Next,
) -> Result<Response, PipelineError> {
    let request = truncator.apply(request).await?;
    Ok(next.run(request).await)
}
