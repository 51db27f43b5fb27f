//! Type definitions for the request pipeline

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ========== Size and Capacity Types ==========

/// Maximum size of a captured request body in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0)
)]
pub struct RequestSizeLimit(usize);

impl Default for RequestSizeLimit {
    fn default() -> Self {
        Self::try_new(DEFAULT_MAX_REQUEST_SIZE).expect("10MB is a valid request size limit")
    }
}

/// Number of mirror calls allowed in flight across all requests
#[nutype(
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |count: &usize| *count > 0)
)]
pub struct MaxInFlightMirrors(usize);

impl Default for MaxInFlightMirrors {
    fn default() -> Self {
        Self::try_new(DEFAULT_MAX_IN_FLIGHT_MIRRORS).expect("256 is a valid in-flight bound")
    }
}

/// Upper bound for a single mirror call, distinct from the primary request timeout
#[nutype(
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |millis: &u64| *millis > 0)
)]
pub struct MirrorTimeoutMillis(u64);

impl MirrorTimeoutMillis {
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(*self.as_ref())
    }
}

impl Default for MirrorTimeoutMillis {
    fn default() -> Self {
        Self::try_new(DEFAULT_MIRROR_TIMEOUT_MS).expect("5000ms is a valid mirror timeout")
    }
}

// ========== Identity Types ==========

/// Login name presented through basic auth
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(Clone, Debug, Display, PartialEq, Eq, Hash, Deserialize, Serialize, AsRef)
)]
pub struct UserName(String);

/// Role string attached to a user record, e.g. `admin`
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(Clone, Debug, Display, PartialEq, Eq, Hash, Deserialize, Serialize, AsRef)
)]
pub struct Role(String);

/// Path that bypasses authentication
#[nutype(
    validate(predicate = |s: &str| s.starts_with('/')),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct BypassPath(String);

/// Identity established by the auth stage, read by the audit logger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_name: UserName,
    pub role: Role,
}

/// Correlates the arrival and completion writes of one request
#[nutype(derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    From,
    AsRef
))]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new, never reused request id (UUID v7)
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        self.as_ref()
    }
}

// ========== Constants ==========

/// Default request body bound (10MB)
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// Default number of concurrent mirror calls
pub const DEFAULT_MAX_IN_FLIGHT_MIRRORS: usize = 256;

/// Default mirror call timeout
pub const DEFAULT_MIRROR_TIMEOUT_MS: u64 = 5_000;

/// Default primary request timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// ========== Errors ==========

/// Errors that can occur on the request path
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Request too large: more than {max_size} bytes")]
    RequestTooLarge { max_size: RequestSizeLimit },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Invalid mirror target: {0}")]
    InvalidMirrorTarget(String),

    #[error("Mirror call failed: {0}")]
    MirrorFailed(String),

    #[error("Missing or malformed Authorization header")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Audit store error: {0}")]
    AuditStore(String),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
