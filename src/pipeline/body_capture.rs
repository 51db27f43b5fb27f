//! Request body capture and replay
//!
//! The inbound body is read from the transport exactly once, chunk by chunk,
//! before any downstream stage sees it. The captured chunks are shared
//! read-only (mirror fan-out, audit log) and replayed once to the handler.

use crate::pipeline::headers::is_body_bearing;
use crate::pipeline::types::*;
use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http::Request;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// A fully captured request body, kept as the chunks it arrived in
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferedRequest {
    chunks: Vec<Bytes>,
}

impl BufferedRequest {
    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        Self { chunks }
    }

    /// Drain `body` to completion, keeping every data frame in arrival order.
    ///
    /// A body that already reports end-of-stream is not read at all. On a
    /// transport error or when `limit` is exceeded nothing is returned.
    pub async fn capture<B>(body: B, limit: RequestSizeLimit) -> PipelineResult<Self>
    where
        B: HttpBody<Data = Bytes> + Unpin,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if body.is_end_stream() {
            return Ok(Self::default());
        }

        let mut limited = Limited::new(body, *limit.as_ref());
        let mut chunks = Vec::new();

        while let Some(frame) = limited.frame().await {
            let frame = frame.map_err(|e| {
                if e.is::<LengthLimitError>() {
                    PipelineError::RequestTooLarge { max_size: limit }
                } else {
                    PipelineError::BodyRead(e.to_string())
                }
            })?;

            // Trailers are not part of the replayed payload
            if let Ok(data) = frame.into_data() {
                chunks.push(data);
            }
        }

        Ok(Self { chunks })
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole body as one contiguous buffer
    pub fn to_bytes(&self) -> Bytes {
        match self.chunks.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            many => {
                let mut joined = BytesMut::with_capacity(self.len());
                for chunk in many {
                    joined.extend_from_slice(chunk);
                }
                joined.freeze()
            }
        }
    }

    /// Body decoded as UTF-8 (lossy), `None` when nothing was sent
    pub fn text(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.to_bytes()).into_owned())
        }
    }
}

/// Replays captured chunks from a cursor, then whatever is left on the live body.
///
/// When capture ran to completion there is no live remainder and the stream
/// ends once the cursor passes the last chunk.
#[derive(Debug)]
pub struct ReplayBody {
    buffered: Arc<BufferedRequest>,
    cursor: usize,
    remainder: Option<Body>,
}

impl ReplayBody {
    pub fn new(buffered: Arc<BufferedRequest>) -> Self {
        Self {
            buffered,
            cursor: 0,
            remainder: None,
        }
    }

    /// Replay `buffered` first, then continue reading from `remainder`
    pub fn with_remainder(buffered: Arc<BufferedRequest>, remainder: Body) -> Self {
        Self {
            buffered,
            cursor: 0,
            remainder: Some(remainder),
        }
    }

    fn replayed_all(&self) -> bool {
        self.cursor >= self.buffered.chunk_count()
    }

    fn pending_bytes(&self) -> u64 {
        self.buffered.chunks()[self.cursor.min(self.buffered.chunk_count())..]
            .iter()
            .map(|chunk| chunk.len() as u64)
            .sum()
    }
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(chunk) = this.buffered.chunks().get(this.cursor) {
            this.cursor += 1;
            return Poll::Ready(Some(Ok(Frame::data(chunk.clone()))));
        }

        match this.remainder.as_mut() {
            Some(live) => Pin::new(live).poll_frame(cx),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.replayed_all()
            && self
                .remainder
                .as_ref()
                .is_none_or(|live| live.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        let pending = self.pending_bytes();
        match &self.remainder {
            None => SizeHint::with_exact(pending),
            Some(live) => {
                let live_hint = live.size_hint();
                let mut hint = SizeHint::new();
                hint.set_lower(pending + live_hint.lower());
                if let Some(upper) = live_hint.upper() {
                    hint.set_upper(pending + upper);
                }
                hint
            }
        }
    }
}

/// Request extension holding the shared capture of the current request
#[derive(Clone, Debug)]
pub struct CapturedBody(pub Arc<BufferedRequest>);

/// Capture the body of `request` once and hand back a request that replays it.
///
/// Only body-bearing verbs are captured; other requests are returned untouched
/// with `None`. When an earlier stage already captured this request, its
/// buffer is reused and the transport is not read again.
pub async fn capture_request(
    request: Request<Body>,
    limit: RequestSizeLimit,
) -> PipelineResult<(Request<Body>, Option<Arc<BufferedRequest>>)> {
    if !is_body_bearing(request.method()) {
        return Ok((request, None));
    }

    if let Some(CapturedBody(buffered)) = request.extensions().get::<CapturedBody>() {
        let buffered = Arc::clone(buffered);
        return Ok((request, Some(buffered)));
    }

    let (mut parts, body) = request.into_parts();
    let buffered = Arc::new(BufferedRequest::capture(body, limit).await?);

    debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        bytes = buffered.len(),
        chunks = buffered.chunk_count(),
        "Captured request body"
    );

    parts.extensions.insert(CapturedBody(Arc::clone(&buffered)));
    let replay = ReplayBody::new(Arc::clone(&buffered));

    Ok((Request::from_parts(parts, Body::new(replay)), Some(buffered)))
}
