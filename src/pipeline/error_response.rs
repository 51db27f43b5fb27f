//! JSON error bodies for failures on the request path
//!
//! Every stage reports failures as `PipelineError`; this module turns them
//! into a consistent `{code, message}` body with the right status.

use crate::pipeline::headers::{BASIC_CHALLENGE, WWW_AUTHENTICATE};
use crate::pipeline::types::PipelineError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Standard error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    fn to_error_response(&self) -> ErrorResponse;

    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for PipelineError {
    fn to_error_response(&self) -> ErrorResponse {
        use PipelineError::*;

        match self {
            RequestTooLarge { max_size } => ErrorResponse::new(
                "REQUEST_TOO_LARGE",
                format!("Request body exceeds maximum of {max_size} bytes"),
            ),
            BodyRead(msg) => {
                ErrorResponse::new("BODY_READ_ERROR", format!("Could not read request body: {msg}"))
            }
            MissingCredentials | InvalidCredentials => {
                ErrorResponse::new("NOT_AUTHORIZED", "Not authorized")
            }
            PermissionDenied => ErrorResponse::new("PERMISSION_DENIED", "Permission denied"),
            // Collaborator failures are logged, never echoed to the caller
            InvalidMirrorTarget(_) | MirrorFailed(_) | AuditStore(_) | CredentialStore(_)
            | Http(_) | Serialization(_) => {
                ErrorResponse::new("INTERNAL_ERROR", "Internal server error")
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        use PipelineError::*;

        match self {
            RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BodyRead(_) => StatusCode::BAD_REQUEST,
            MissingCredentials | InvalidCredentials => StatusCode::UNAUTHORIZED,
            PermissionDenied => StatusCode::FORBIDDEN,
            InvalidMirrorTarget(_) | MirrorFailed(_) | AuditStore(_) | CredentialStore(_)
            | Http(_) | Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request pipeline failed");
        }

        let mut response = self.to_error_response().into_response_with_status(status);
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static(BASIC_CHALLENGE),
            );
        }
        response
    }
}
