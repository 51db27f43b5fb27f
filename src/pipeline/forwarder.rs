//! Best-effort fan-out of inbound requests to mirror servers
//!
//! Every configured mirror receives a copy of the request (method, path,
//! query, headers and, for body-bearing verbs, the captured body). Calls are
//! detached from the primary path, bounded by a timeout and by a shared
//! in-flight limit, and their failures are only ever logged.

use crate::pipeline::body_capture::BufferedRequest;
use crate::pipeline::headers::{paths, CONTENT_LENGTH, TRANSFER_ENCODING};
use crate::pipeline::types::*;
use async_trait::async_trait;
use axum::extract::OriginalUri;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use nutype::nutype;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Base URL of a mirror server, fixed at startup
#[nutype(
    sanitize(trim),
    validate(predicate = |s: &str| s.starts_with("http://") && s.parse::<Uri>().is_ok()),
    derive(Clone, Debug, Display, PartialEq, Eq, TryFrom, AsRef)
)]
pub struct MirrorTarget(String);

impl MirrorTarget {
    /// Append the original path and query to this base URL
    pub fn resolve(&self, original_uri: &Uri) -> PipelineResult<Uri> {
        let path_and_query = original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(paths::ROOT);

        let resolved = format!("{}{}", self.as_ref().trim_end_matches('/'), path_and_query);

        resolved
            .parse()
            .map_err(|_| PipelineError::InvalidMirrorTarget(resolved))
    }
}

/// Copy of an inbound request, ready to be sent to every mirror
#[derive(Clone, Debug)]
pub struct MirrorRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl MirrorRequest {
    pub fn from_request<B>(request: &Request<B>, captured: Option<&BufferedRequest>) -> Self {
        let uri = request
            .extensions()
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| request.uri().clone());

        let mut headers = request.headers().clone();
        // Without a captured body the copy is sent empty, so drop the framing
        if captured.is_none() {
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
        }

        Self {
            method: request.method().clone(),
            uri,
            headers,
            body: captured.map(BufferedRequest::to_bytes),
        }
    }

    /// Build the outgoing request for one mirror
    pub fn to_outgoing(&self, target: &MirrorTarget) -> PipelineResult<Request<Bytes>> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(target.resolve(&self.uri)?);

        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }

        Ok(builder.body(self.body.clone().unwrap_or_default())?)
    }
}

/// Sends one mirrored request and reports the mirror's status
#[async_trait]
pub trait MirrorTransport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> PipelineResult<StatusCode>;
}

/// Plain-HTTP transport built on the hyper-util pooled client
#[derive(Clone)]
pub struct HyperMirrorTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperMirrorTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build_http();

        Self { client }
    }
}

impl Default for HyperMirrorTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MirrorTransport for HyperMirrorTransport {
    async fn send(&self, request: Request<Bytes>) -> PipelineResult<StatusCode> {
        let (parts, body) = request.into_parts();
        let response: hyper::Response<hyper::body::Incoming> = self
            .client
            .request(Request::from_parts(parts, Full::new(body)))
            .await
            .map_err(|e| PipelineError::MirrorFailed(e.to_string()))?;

        let status = response.status();
        // Drain so the pooled connection can be reused
        response
            .into_body()
            .collect()
            .await
            .map_err(|e| PipelineError::MirrorFailed(e.to_string()))?;

        Ok(status)
    }
}

/// What became of one mirror call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorOutcome {
    Delivered(StatusCode),
    Failed,
    TimedOut,
    /// Dropped because the in-flight bound was reached
    Shed,
}

/// Mirror configuration, fixed for the lifetime of the forwarder
#[derive(Clone, Debug, Default)]
pub struct MirrorConfig {
    pub targets: Vec<MirrorTarget>,
    pub timeout: MirrorTimeoutMillis,
    pub max_in_flight: MaxInFlightMirrors,
}

pub struct FanOutForwarder {
    targets: Arc<[MirrorTarget]>,
    transport: Arc<dyn MirrorTransport>,
    in_flight: Arc<Semaphore>,
    timeout: MirrorTimeoutMillis,
    max_request_size: RequestSizeLimit,
}

impl FanOutForwarder {
    pub fn new(
        config: MirrorConfig,
        transport: Arc<dyn MirrorTransport>,
        max_request_size: RequestSizeLimit,
    ) -> Self {
        Self {
            targets: config.targets.into(),
            transport,
            in_flight: Arc::new(Semaphore::new(*config.max_in_flight.as_ref())),
            timeout: config.timeout,
            max_request_size,
        }
    }

    pub fn targets(&self) -> &[MirrorTarget] {
        &self.targets
    }

    pub fn max_request_size(&self) -> RequestSizeLimit {
        self.max_request_size
    }

    /// Spawn one detached call per mirror target.
    ///
    /// Returns immediately. The handles may be awaited (tests) or dropped,
    /// which leaves the calls running in the background.
    pub fn dispatch(&self, request: &MirrorRequest) -> Vec<JoinHandle<MirrorOutcome>> {
        self.targets
            .iter()
            .map(|target| {
                let permit = Arc::clone(&self.in_flight).try_acquire_owned();
                let outgoing = request.to_outgoing(target);
                let transport = Arc::clone(&self.transport);
                let timeout = self.timeout.as_duration();
                let target = target.clone();

                tokio::spawn(async move {
                    let Ok(_permit) = permit else {
                        warn!(mirror = %target, "Mirror call shed, too many in flight");
                        return MirrorOutcome::Shed;
                    };

                    let outgoing = match outgoing {
                        Ok(outgoing) => outgoing,
                        Err(e) => {
                            warn!(mirror = %target, error = %e, "Could not build mirror request");
                            return MirrorOutcome::Failed;
                        }
                    };
                    let method = outgoing.method().clone();
                    let uri = outgoing.uri().clone();

                    match tokio::time::timeout(timeout, transport.send(outgoing)).await {
                        Ok(Ok(status)) => {
                            if status.is_success() {
                                debug!(%method, %uri, status = status.as_u16(), "Mirror call delivered");
                            } else {
                                warn!(%method, %uri, status = status.as_u16(), "Mirror answered with an error status");
                            }
                            MirrorOutcome::Delivered(status)
                        }
                        Ok(Err(e)) => {
                            warn!(%method, %uri, error = %e, "Mirror call failed");
                            MirrorOutcome::Failed
                        }
                        Err(_) => {
                            warn!(%method, %uri, timeout_ms = timeout.as_millis(), "Mirror call timed out");
                            MirrorOutcome::TimedOut
                        }
                    }
                })
            })
            .collect()
    }
}
