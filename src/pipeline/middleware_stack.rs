//! Middleware stack builder for explicit, ordered composition
//!
//! Stages are optional and each one owns its state. The order, outer to
//! inner, is fixed:
//! 1. Primary request timeout
//! 2. Request logging
//! 3. Basic authentication
//! 4. Audit logging
//! 5. Mirror fan-out
//! 6. Field truncation
//!
//! Authentication runs before the audit logger so the log carries the
//! caller's name. Truncation is innermost so mirrors and the log see the
//! body as sent.

use crate::pipeline::audit::AuditLogger;
use crate::pipeline::auth::BasicAuth;
use crate::pipeline::forwarder::FanOutForwarder;
use crate::pipeline::middleware::*;
use crate::pipeline::truncate::Truncator;
use crate::pipeline::types::DEFAULT_REQUEST_TIMEOUT_MS;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

/// Builder for composing the pipeline around an application router
pub struct PipelineStack {
    request_timeout: Duration,
    request_logging: bool,
    auth: Option<Arc<BasicAuth>>,
    audit: Option<Arc<AuditLogger>>,
    mirror: Option<Arc<FanOutForwarder>>,
    truncate: Option<Arc<Truncator>>,
}

impl Default for PipelineStack {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStack {
    /// A stack with only the timeout and request logging enabled
    pub fn new() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            request_logging: true,
            auth: None,
            audit: None,
            mirror: None,
            truncate: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn without_request_logging(mut self) -> Self {
        self.request_logging = false;
        self
    }

    pub fn with_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(Arc::new(logger));
        self
    }

    pub fn with_mirror(mut self, forwarder: FanOutForwarder) -> Self {
        self.mirror = Some(Arc::new(forwarder));
        self
    }

    pub fn with_truncate(mut self, truncator: Truncator) -> Self {
        self.truncate = Some(Arc::new(truncator));
        self
    }

    /// Apply the configured stages to a router
    #[allow(deprecated)]
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Layers wrap what is already there, so innermost goes first
        let mut router = router;

        if let Some(truncator) = self.truncate {
            router = router.layer(from_fn_with_state(truncator, truncate_middleware));
        }
        if let Some(forwarder) = self.mirror {
            router = router.layer(from_fn_with_state(forwarder, mirror_middleware));
        }
        if let Some(logger) = self.audit {
            router = router.layer(from_fn_with_state(logger, audit_middleware));
        }
        if let Some(auth) = self.auth {
            router = router.layer(from_fn_with_state(auth, auth_middleware));
        }
        if self.request_logging {
            router = router.layer(from_fn(logging_middleware));
        }

        router.layer(TimeoutLayer::new(self.request_timeout))
    }
}
