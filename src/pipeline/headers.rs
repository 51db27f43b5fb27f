//! HTTP header constants and request classification helpers
//!
//! Centralizes header names, well-known paths and the set of verbs whose
//! body is captured by the pipeline.

use ::http::Method;

/// Authorization scheme accepted by the auth stage
pub const BASIC_PREFIX: &str = "Basic ";

/// Challenge sent back with 401 responses
pub const BASIC_CHALLENGE: &str = "Basic";

/// Standard header re-exports for convenience
pub use ::http::header::{AUTHORIZATION, CONTENT_LENGTH, TRANSFER_ENCODING, WWW_AUTHENTICATE};

/// Well-known paths
pub mod paths {
    /// Path used when a request carries none
    pub const ROOT: &str = "/";

    /// Liveness endpoint, always reachable without credentials
    pub const IS_ALIVE: &str = "/is_alive";
}

/// Verbs whose request body is captured, mirrored and logged
pub const BODY_BEARING_METHODS: [Method; 3] = [Method::POST, Method::PUT, Method::PATCH];

/// Whether a request with this verb carries a body worth capturing
pub fn is_body_bearing(method: &Method) -> bool {
    BODY_BEARING_METHODS.contains(method)
}
