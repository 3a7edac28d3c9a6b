//! Chunked response streaming with backpressure (§4.3).
//!
//! A [`StreamContext`] is created per streaming response. Handlers push
//! chunks through it; each call to [`StreamContext::write_chunk`] frames the
//! bytes as `<hexlen>\r\n<data>\r\n` and pushes the frame onto an internal
//! channel that the connection's write path drains. `finish` appends the
//! terminating `0\r\n\r\n` chunk. The frames this module produces are the
//! literal wire bytes (§6 "Response framing invariants") — nothing
//! downstream re-encodes them.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, StatusCode, header::CONNECTION};
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::body::CoreBody;
use crate::platform::{AtomicBool, AtomicUsize, Mutex};
use crate::types::Response;

/// Lifecycle state of a stream (§3 "StreamContext").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Draining,
    Finished,
    Error,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Ok,
    Backpressure,
}

#[derive(Debug, Clone, Copy)]
pub struct WatermarkConfig {
    pub high: usize,
    pub low: usize,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            high: 256 * 1024,
            low: 64 * 1024,
        }
    }
}

type ChunkCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;
type BackpressureCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// A chunked HTTP response stream attached to one connection.
pub struct StreamContext {
    state: Mutex<StreamState>,
    pending_bytes: AtomicUsize,
    watermark: WatermarkConfig,
    backpressure_active: AtomicBool,
    sender: mpsc::UnboundedSender<Bytes>,
    drain_notify: Arc<Notify>,
    on_chunk: Mutex<Option<ChunkCallback>>,
    on_backpressure: Mutex<Option<BackpressureCallback>>,
}

impl StreamContext {
    /// Creates a stream context and the receiver half that the connection's
    /// write path should drain into the socket (already-framed bytes).
    pub fn new(watermark: WatermarkConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let ctx = Arc::new(Self {
            state: Mutex::new(StreamState::Open),
            pending_bytes: AtomicUsize::new(0),
            watermark,
            backpressure_active: AtomicBool::new(false),
            sender,
            drain_notify: Arc::new(Notify::new()),
            on_chunk: Mutex::new(None),
            on_backpressure: Mutex::new(None),
        });
        (ctx, receiver)
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    pub fn set_callbacks(
        &self,
        on_chunk: Option<ChunkCallback>,
        on_backpressure: Option<BackpressureCallback>,
    ) {
        *self.on_chunk.lock() = on_chunk;
        *self.on_backpressure.lock() = on_backpressure;
    }

    /// Frames `bytes` as one chunk and enqueues it for the connection's
    /// write path. Returns `Backpressure` once `pending_bytes` has crossed
    /// the high watermark; the caller should stop writing until
    /// [`StreamContext::wait_for_drain`] resolves.
    pub fn write_chunk(&self, bytes: &[u8]) -> Result<WriteOutcome, crate::error::CoreError> {
        {
            let state = *self.state.lock();
            if matches!(state, StreamState::Finished | StreamState::Error) {
                return Err(crate::error::CoreError::Internal(
                    "write to a finished or errored stream".into(),
                ));
            }
        }

        if bytes.is_empty() {
            return Ok(WriteOutcome::Ok);
        }

        let framed = frame_chunk(bytes);
        let framed_len = framed.len();

        if self.sender.send(framed).is_err() {
            *self.state.lock() = StreamState::Error;
            return Err(crate::error::CoreError::Internal(
                "stream receiver dropped".into(),
            ));
        }

        if let Some(cb) = self.on_chunk.lock().as_ref() {
            cb(bytes);
        }

        let pending = self.pending_bytes.fetch_add(framed_len, Ordering::SeqCst) + framed_len;

        if pending > self.watermark.high && !self.backpressure_active.swap(true, Ordering::SeqCst)
        {
            *self.state.lock() = StreamState::Draining;
            if let Some(cb) = self.on_backpressure.lock().as_ref() {
                cb(true);
            }
        }

        if self.backpressure_active.load(Ordering::SeqCst) {
            Ok(WriteOutcome::Backpressure)
        } else {
            Ok(WriteOutcome::Ok)
        }
    }

    /// Called by the connection's write path once `n` bytes have actually
    /// been written to the socket. Clears backpressure when pending bytes
    /// drop back below the low watermark.
    pub fn notify_drained(&self, n: usize) {
        let pending = self
            .pending_bytes
            .fetch_sub(n.min(self.pending_bytes.load(Ordering::SeqCst)), Ordering::SeqCst);
        let remaining = pending.saturating_sub(n);

        if remaining <= self.watermark.low
            && self.backpressure_active.swap(false, Ordering::SeqCst)
        {
            let mut state = self.state.lock();
            if *state == StreamState::Draining {
                *state = StreamState::Open;
            }
            drop(state);
            if let Some(cb) = self.on_backpressure.lock().as_ref() {
                cb(false);
            }
            self.drain_notify.notify_waiters();
        }
    }

    /// Cooperatively waits until backpressure clears or `timeout` elapses.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        if !self.backpressure_active.load(Ordering::SeqCst) {
            return true;
        }
        let notified = self.drain_notify.notified();
        tokio::select! {
            _ = notified => true,
            _ = tokio::time::sleep(timeout) => !self.backpressure_active.load(Ordering::SeqCst),
        }
    }

    /// Flushes the terminating zero-length chunk and moves the stream to
    /// `Finished`. Idempotent-safe: writes after `finish` fail, per the
    /// `Finished`/`Error` invariant in §3.
    pub fn finish(&self) -> Result<(), crate::error::CoreError> {
        let mut state = self.state.lock();
        if matches!(*state, StreamState::Finished | StreamState::Error) {
            return Ok(());
        }
        *state = StreamState::Finished;
        drop(state);

        if self.sender.send(Bytes::from_static(b"0\r\n\r\n")).is_err() {
            return Err(crate::error::CoreError::Internal(
                "stream receiver dropped before finish".into(),
            ));
        }
        Ok(())
    }

    /// Marks the stream as failed; subsequent writes are rejected.
    pub fn fail(&self) {
        *self.state.lock() = StreamState::Error;
    }
}

/// Opens a chunked streaming response (§6 "Response framing invariants",
/// `start_streaming` in the handler-runtime ABI). Sets `Transfer-Encoding:
/// chunked` and, unless `headers` already carries a `Connection` key
/// (case-insensitive — §9 open question), `Connection: keep-alive`; `headers`
/// is then appended as-is. The returned body is wired directly to the
/// receiver half, so every frame [`StreamContext::write_chunk`] produces is
/// the literal wire bytes written to the socket.
pub fn start_streaming(
    status: StatusCode,
    content_type: &str,
    headers: HeaderMap,
    watermark: WatermarkConfig,
) -> (Response, Arc<StreamContext>) {
    let (ctx, receiver) = StreamContext::new(watermark);

    let stream = UnboundedReceiverStream::new(receiver).map(Ok::<_, Infallible>);
    let mut response = Response::new(CoreBody::from_stream(stream));
    *response.status_mut() = status;

    let out_headers = response.headers_mut();
    out_headers.insert(
        http::header::CONTENT_TYPE,
        content_type
            .parse()
            .unwrap_or_else(|_| "application/octet-stream".parse().unwrap()),
    );
    out_headers.insert(
        http::header::TRANSFER_ENCODING,
        http::HeaderValue::from_static("chunked"),
    );

    let has_connection_header = headers
        .keys()
        .any(|name| name.as_str().eq_ignore_ascii_case(CONNECTION.as_str()));
    if !has_connection_header {
        out_headers.insert(CONNECTION, http::HeaderValue::from_static("keep-alive"));
    }

    for (name, value) in headers.iter() {
        out_headers.append(HeaderName::from(name.clone()), value.clone());
    }

    (response, ctx)
}

fn frame_chunk(bytes: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(bytes.len() + 16);
    out.extend_from_slice(format!("{:x}\r\n", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_single_chunk_correctly() {
        assert_eq!(&*frame_chunk(b"Hello, "), b"7\r\nHello, \r\n".as_slice());
    }

    /// Scenario S5 from spec §8.
    #[test]
    fn scenario_s5_chunk_sequence_matches_expected_wire_bytes() {
        let (ctx, mut rx) = StreamContext::new(WatermarkConfig::default());
        ctx.write_chunk(b"Hello, ").unwrap();
        ctx.write_chunk(b"world").unwrap();
        ctx.finish().unwrap();
        drop(ctx);

        let mut all = BytesMut::new();
        while let Ok(frame) = rx.try_recv() {
            all.extend_from_slice(&frame);
        }
        assert_eq!(&*all, b"7\r\nHello, \r\n5\r\nworld\r\n0\r\n\r\n".as_slice());
    }

    #[test]
    fn writes_after_finish_are_rejected() {
        let (ctx, _rx) = StreamContext::new(WatermarkConfig::default());
        ctx.finish().unwrap();
        assert!(ctx.write_chunk(b"too late").is_err());
    }

    #[test]
    fn crossing_high_watermark_reports_backpressure() {
        let (ctx, _rx) = StreamContext::new(WatermarkConfig { high: 4, low: 1 });
        let first = ctx.write_chunk(b"hello").unwrap();
        assert_eq!(first, WriteOutcome::Backpressure);
        assert_eq!(ctx.state(), StreamState::Draining);
    }

    #[test]
    fn start_streaming_defaults_to_keep_alive() {
        let (response, _ctx) = start_streaming(
            StatusCode::OK,
            "text/plain",
            HeaderMap::new(),
            WatermarkConfig::default(),
        );
        assert_eq!(
            response.headers().get(CONNECTION).unwrap(),
            "keep-alive"
        );
        assert_eq!(response.headers().get(http::header::TRANSFER_ENCODING).unwrap(), "chunked");
    }

    #[test]
    fn start_streaming_honours_custom_connection_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, http::HeaderValue::from_static("close"));
        let (response, _ctx) = start_streaming(
            StatusCode::OK,
            "text/plain",
            headers,
            WatermarkConfig::default(),
        );
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");
        assert_eq!(
            response
                .headers()
                .get_all(CONNECTION)
                .iter()
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn drain_clears_backpressure_and_wakes_waiter() {
        let (ctx, _rx) = StreamContext::new(WatermarkConfig { high: 4, low: 1 });
        ctx.write_chunk(b"hello").unwrap();
        assert_eq!(ctx.state(), StreamState::Draining);

        ctx.notify_drained(100);
        assert_eq!(ctx.state(), StreamState::Open);
        assert!(ctx.wait_for_drain(Duration::from_millis(50)).await);
    }
}
