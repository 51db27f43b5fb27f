//! Infrastructure layer
//!
//! Postgres implementations of the pipeline's persistence and credential
//! collaborators, plus the connection pool wrapper.

pub mod audit_log_store;
pub mod database;
pub mod user_store;

pub use audit_log_store::PostgresAuditLogStore;
pub use database::Database;
pub use user_store::PostgresAuthenticator;
