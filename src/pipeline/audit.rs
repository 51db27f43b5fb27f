//! Request/response audit logging
//!
//! Every request walks `ARRIVED -> COMPLETED`. The arrival row is inserted
//! before the handler runs; the completion update is issued when the final
//! chunk of the response body has been observed, or once as many bytes as the
//! response declared in `Content-Length` have gone out. HEAD responses carry
//! no body and complete when the server discards it. A response that is
//! dropped before any of that (client disconnect, cancellation) leaves the row
//! in `ARRIVED` for good.

use crate::pipeline::audit_store::{ArrivalRecord, AuditLogStore, CompletionRecord};
use crate::pipeline::body_capture::BufferedRequest;
use crate::pipeline::clock::Clock;
use crate::pipeline::types::*;
use axum::body::Body;
use axum::extract::OriginalUri;
use bytes::Bytes;
use http::{header::CONTENT_LENGTH, Method, Request, Response, StatusCode};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, error, warn};

/// Builds audit records for requests and watches their responses
pub struct AuditLogger {
    store: Arc<dyn AuditLogStore>,
    clock: Arc<dyn Clock>,
    max_request_size: RequestSizeLimit,
}

impl AuditLogger {
    pub fn new(
        store: Arc<dyn AuditLogStore>,
        clock: Arc<dyn Clock>,
        max_request_size: RequestSizeLimit,
    ) -> Self {
        Self {
            store,
            clock,
            max_request_size,
        }
    }

    pub fn max_request_size(&self) -> RequestSizeLimit {
        self.max_request_size
    }

    /// Describe an arriving request under a freshly generated id
    pub fn arrival_record<B>(
        &self,
        request: &Request<B>,
        captured: Option<&BufferedRequest>,
    ) -> ArrivalRecord {
        // Nested routers rewrite the uri; the log keeps what the caller sent
        let uri = request
            .extensions()
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or_else(|| request.uri());

        ArrivalRecord {
            request_id: RequestId::generate(),
            user_name: request
                .extensions()
                .get::<AuthenticatedUser>()
                .map(|user| user.user_name.clone()),
            endpoint: uri.path().to_string(),
            method: request.method().as_str().to_string(),
            request_timestamp: self.clock.now(),
            body: captured.and_then(BufferedRequest::text),
            query: uri.query().unwrap_or_default().to_string(),
        }
    }

    /// Insert the arrival row. Failures are logged and never reach the caller.
    pub async fn record_arrival(&self, record: &ArrivalRecord) {
        if let Err(e) = self.store.insert(record).await {
            error!(
                request_id = %record.request_id,
                error = %e,
                "Failed to write arrival audit entry"
            );
        }
    }

    /// Wrap the response body so its final chunk triggers the completion update.
    ///
    /// Status and headers are passed through untouched.
    pub fn observe(
        &self,
        request_id: RequestId,
        method: &Method,
        response: Response<Body>,
    ) -> Response<Body> {
        let (parts, body) = response.into_parts();
        let hook = CompletionHook {
            request_id,
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        };
        let declared_len = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        let mut observed = ObservedBody::new(body, parts.status, hook);
        observed.declared_len = declared_len.or(observed.declared_len);
        observed.head_only = *method == Method::HEAD;
        Response::from_parts(parts, Body::new(observed))
    }
}

/// Per-response accumulator used to recognise the terminal chunk
#[derive(Clone, Debug)]
pub struct ResponseAssemblyState {
    status: StatusCode,
    chunks_seen: usize,
    bytes_seen: u64,
}

impl ResponseAssemblyState {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            chunks_seen: 0,
            bytes_seen: 0,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn chunks_seen(&self) -> usize {
        self.chunks_seen
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    fn record_chunk(&mut self, len: usize) {
        self.chunks_seen += 1;
        self.bytes_seen += len as u64;
    }
}

/// The pending completion write of one request
struct CompletionHook {
    request_id: RequestId,
    store: Arc<dyn AuditLogStore>,
    clock: Arc<dyn Clock>,
}

impl CompletionHook {
    fn fire(self, state: &ResponseAssemblyState) {
        let record = CompletionRecord {
            request_id: self.request_id,
            status_code: state.status().as_u16(),
            response_timestamp: self.clock.now(),
        };

        debug!(
            request_id = %record.request_id,
            status = record.status_code,
            chunks = state.chunks_seen(),
            bytes = state.bytes_seen(),
            "Response completed"
        );

        let store = self.store;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = store.update(&record).await {
                        error!(
                            request_id = %record.request_id,
                            error = %e,
                            "Failed to write completion audit entry"
                        );
                    }
                });
            }
            Err(_) => warn!(
                request_id = %record.request_id,
                "No async runtime available, completion audit entry dropped"
            ),
        }
    }
}

/// Response body that reports its terminal chunk exactly once
pub struct ObservedBody {
    inner: Body,
    state: ResponseAssemblyState,
    hook: Option<CompletionHook>,
    declared_len: Option<u64>,
    head_only: bool,
}

impl ObservedBody {
    fn new(inner: Body, status: StatusCode, hook: CompletionHook) -> Self {
        let declared_len = inner.size_hint().exact();
        Self {
            inner,
            state: ResponseAssemblyState::new(status),
            hook: Some(hook),
            declared_len,
            head_only: false,
        }
    }

    /// The server stops reading once the declared length has been written
    fn reached_declared_len(&self) -> bool {
        self.declared_len
            .is_some_and(|len| self.state.bytes_seen() >= len)
    }

    fn complete(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook.fire(&self.state);
        }
    }
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.state.record_chunk(data.len());
                }
                if this.inner.is_end_stream() || this.reached_declared_len() {
                    this.complete();
                }
            }
            Poll::Ready(None) => this.complete(),
            Poll::Ready(Some(Err(e))) => {
                if let Some(hook) = this.hook.take() {
                    debug!(
                        request_id = %hook.request_id,
                        error = %e,
                        "Response stream failed before its final chunk"
                    );
                }
            }
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        let Some(hook) = self.hook.as_ref() else {
            return;
        };

        // Empty and HEAD bodies are discarded by the server without a poll
        if self.head_only || self.inner.is_end_stream() || self.reached_declared_len() {
            self.complete();
        } else {
            debug!(
                request_id = %hook.request_id,
                "Response dropped before its final chunk, audit entry stays ARRIVED"
            );
        }
    }
}
