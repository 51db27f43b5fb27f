//! Truncation of one oversized JSON string field before the handler sees it
//!
//! Runs innermost, after mirroring and audit logging, so those stages keep
//! the bytes the caller actually sent.

use crate::pipeline::body_capture::capture_request;
use crate::pipeline::headers::CONTENT_LENGTH;
use crate::pipeline::types::*;
use axum::body::Body;
use bytes::Bytes;
use http::{HeaderValue, Request};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Which JSON field to cut, and to how many characters
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TruncateConfig {
    pub field: String,
    pub limit: usize,
}

pub struct Truncator {
    config: TruncateConfig,
    max_request_size: RequestSizeLimit,
}

impl Truncator {
    pub fn new(config: TruncateConfig, max_request_size: RequestSizeLimit) -> Self {
        Self {
            config,
            max_request_size,
        }
    }

    pub fn config(&self) -> &TruncateConfig {
        &self.config
    }

    /// Rewrite `body` if it is a JSON object whose field is too long.
    ///
    /// Returns `None` when the body should pass through unchanged.
    pub fn truncate_body(&self, body: &[u8]) -> Option<Bytes> {
        let mut document: Value = serde_json::from_slice(body).ok()?;
        let field = document.as_object_mut()?.get_mut(&self.config.field)?;
        let text = field.as_str()?;

        // Cut on a char boundary; limit counts characters, not bytes
        let (cut, _) = text.char_indices().nth(self.config.limit)?;
        *field = Value::String(text[..cut].to_string());

        serde_json::to_vec(&document).ok().map(Bytes::from)
    }

    /// Apply truncation to a request, reusing any capture made upstream
    pub async fn apply(&self, request: Request<Body>) -> PipelineResult<Request<Body>> {
        let (request, captured) = capture_request(request, self.max_request_size).await?;
        let Some(captured) = captured else {
            return Ok(request);
        };
        let Some(truncated) = self.truncate_body(&captured.to_bytes()) else {
            return Ok(request);
        };

        debug!(
            field = %self.config.field,
            limit = self.config.limit,
            original_bytes = captured.len(),
            truncated_bytes = truncated.len(),
            "Truncated request field"
        );

        let (mut parts, _) = request.into_parts();
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(truncated.len()));

        Ok(Request::from_parts(parts, Body::from(truncated)))
    }
}
