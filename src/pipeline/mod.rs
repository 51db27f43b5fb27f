//! Request pipeline placed in front of the API handlers
//!
//! The pipeline captures request bodies once, mirrors traffic to secondary
//! servers, and writes a two-phase audit log:
//! - Body capture: read the transport once, replay to the handler
//! - Fan-out: detached, bounded, best-effort copies to mirror targets
//! - Audit: insert on arrival, update when the final response chunk is sent

pub mod audit;
pub mod audit_store;
pub mod auth;
pub mod body_capture;
pub mod clock;
pub mod credentials;
pub mod error_response;
pub mod forwarder;
pub mod headers;
pub mod middleware;
pub mod middleware_stack;
pub mod truncate;
pub mod types;

#[cfg(test)]
mod pipeline_tests;

pub use audit::AuditLogger;
pub use audit_store::{AuditLogStore, InMemoryAuditLogStore};
pub use auth::{AuthConfig, Authenticator, BasicAuth};
pub use forwarder::{FanOutForwarder, HyperMirrorTransport, MirrorConfig, MirrorTarget};
pub use middleware_stack::PipelineStack;
pub use truncate::{TruncateConfig, Truncator};
pub use types::{PipelineError, PipelineResult};
