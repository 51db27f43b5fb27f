//! Application wiring
//!
//! Builds the pipeline collaborators from settings and serves the wrapped
//! router with graceful shutdown.

pub mod app;

pub use app::Application;
