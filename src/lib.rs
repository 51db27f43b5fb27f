//! Caretimes pipeline - request capture, mirroring and audit logging
//!
//! An axum middleware pipeline placed in front of the children/caretimes
//! API. Request bodies are read once and shared, traffic is mirrored to
//! secondary servers without delaying the caller, and every request is
//! logged on arrival and again when its response has been fully sent.

pub mod application;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod pipeline;

pub use application::Application;
pub use error::{Error, Result};
