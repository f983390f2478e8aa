//! Chunk relay between an upstream body and the caller
//!
//! A relay owns one spawned task per stream session. The task pulls a chunk
//! from the source, hands it to a bounded channel, and only then pulls the
//! next one, so a slow caller slows the upstream read instead of growing a
//! buffer. Dropping the [`RelayBody`] (the caller went away) cancels the
//! pending source read and drops the upstream connection.

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::proxy::ProxyError;

/// Lifecycle of one stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Spawned, no bytes received yet
    Idle,
    /// At least one chunk has been forwarded
    Streaming,
    /// Source reached EOF and the sink was closed cleanly
    Completed,
    /// Source error, idle timeout, or caller disconnect
    Failed,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayState::Completed | RelayState::Failed)
    }
}

/// Spawns relay tasks with a fixed buffer size and idle timeout
#[derive(Debug, Clone, Copy)]
pub struct StreamRelay {
    capacity: usize,
    idle_timeout: Duration,
}

impl StreamRelay {
    pub fn new(capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            idle_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Start relaying `source`.
    ///
    /// Returns the caller-side body and a handle reporting the session state.
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, E>(&self, source: S) -> (RelayBody, RelayHandle)
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.capacity);
        let (state_tx, state_rx) = watch::channel(RelayState::Idle);

        let task = run_relay(Box::pin(source), tx, state_tx, self.idle_timeout);
        tokio::spawn(task.in_current_span());

        (
            RelayBody {
                inner: ReceiverStream::new(rx),
            },
            RelayHandle { state: state_rx },
        )
    }
}

async fn run_relay<S, E>(
    mut source: Pin<Box<S>>,
    tx: mpsc::Sender<std::io::Result<Bytes>>,
    state: watch::Sender<RelayState>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display,
{
    let mut bytes: u64 = 0;
    let mut chunks: u64 = 0;

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => break Err("caller disconnected".to_string()),
            next = tokio::time::timeout(idle_timeout, source.next()) => next,
        };

        match next {
            Err(_) => {
                let reason = format!("no upstream bytes for {}ms", idle_timeout.as_millis());
                let _ = tx
                    .send(Err(ProxyError::UpstreamUnavailable(reason.clone()).into_io()))
                    .await;
                break Err(reason);
            }
            Ok(None) => break Ok(()),
            Ok(Some(Err(e))) => {
                let reason = e.to_string();
                let _ = tx
                    .send(Err(ProxyError::StreamRead(reason.clone()).into_io()))
                    .await;
                break Err(reason);
            }
            Ok(Some(Ok(chunk))) => {
                if chunk.is_empty() {
                    continue;
                }
                if chunks == 0 {
                    state.send_replace(RelayState::Streaming);
                }
                bytes += chunk.len() as u64;
                chunks += 1;
                if tx.send(Ok(chunk)).await.is_err() {
                    break Err("caller disconnected".to_string());
                }
            }
        }
    };

    drop(source);
    drop(tx);

    match outcome {
        Ok(()) => {
            tracing::debug!(bytes, chunks, "Relay completed");
            state.send_replace(RelayState::Completed);
        }
        Err(reason) => {
            tracing::warn!(bytes, chunks, "Relay failed: {reason}");
            state.send_replace(RelayState::Failed);
        }
    }
}

/// Caller-side half of a relay, usable as an HTTP response body
pub struct RelayBody {
    inner: ReceiverStream<std::io::Result<Bytes>>,
}

impl Stream for RelayBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Observer for a running relay
#[derive(Debug, Clone)]
pub struct RelayHandle {
    state: watch::Receiver<RelayState>,
}

impl RelayHandle {
    /// Current state of the session
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Wait for the session to reach a terminal state.
    ///
    /// A relay task that went away without reporting counts as failed.
    pub async fn finished(mut self) -> RelayState {
        match self.state.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => RelayState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn relay() -> StreamRelay {
        StreamRelay::new(4, Duration::from_secs(5))
    }

    async fn collect(mut body: RelayBody) -> (Vec<u8>, Option<std::io::Error>) {
        let mut out = Vec::new();
        while let Some(item) = body.next().await {
            match item {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[tokio::test]
    async fn test_forwards_chunks_in_order() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"Hel")),
            Ok(Bytes::from_static(b"lo")),
            Ok(Bytes::from_static(b", world")),
        ];

        let (body, handle) = relay().spawn(stream::iter(chunks));
        let (bytes, err) = collect(body).await;

        assert!(err.is_none());
        assert_eq!(bytes, b"Hello, world");
        assert_eq!(handle.finished().await, RelayState::Completed);
    }

    #[tokio::test]
    async fn test_empty_source_completes_from_idle() {
        let (body, handle) =
            relay().spawn(stream::empty::<Result<Bytes, std::io::Error>>());
        let (bytes, err) = collect(body).await;

        assert!(bytes.is_empty());
        assert!(err.is_none());
        assert_eq!(handle.finished().await, RelayState::Completed);
    }

    #[tokio::test]
    async fn test_source_error_aborts_sink_after_flushed_bytes() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"never")),
        ];

        let (body, handle) = relay().spawn(stream::iter(chunks));
        let (bytes, err) = collect(body).await;

        assert_eq!(bytes, b"partial");
        let err = err.expect("sink should be aborted");
        let inner = err.get_ref().unwrap().downcast_ref::<ProxyError>().unwrap();
        assert_eq!(inner, &ProxyError::StreamRead("connection reset".to_string()));
        assert_eq!(handle.finished().await, RelayState::Failed);
    }

    #[tokio::test]
    async fn test_idle_upstream_fails_with_upstream_unavailable() {
        let source = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"first"))])
            .chain(stream::pending());

        let relay = StreamRelay::new(4, Duration::from_millis(50));
        let (body, handle) = relay.spawn(source);
        let (bytes, err) = collect(body).await;

        assert_eq!(bytes, b"first");
        let err = err.expect("idle upstream should abort the sink");
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(handle.finished().await, RelayState::Failed);
    }

    #[tokio::test]
    async fn test_caller_disconnect_cancels_source() {
        let (source_tx, source_rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(1);
        source_tx.send(Ok(Bytes::from_static(b"one"))).await.unwrap();

        let (mut body, handle) = relay().spawn(ReceiverStream::new(source_rx));

        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"one"));
        assert_eq!(handle.state(), RelayState::Streaming);

        drop(body);

        tokio::time::timeout(Duration::from_secs(2), source_tx.closed())
            .await
            .expect("upstream source should be dropped after caller disconnect");
        assert_eq!(handle.finished().await, RelayState::Failed);
    }

    #[tokio::test]
    async fn test_backpressure_bounds_upstream_reads() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = stream::iter(0..10_000u32).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(Bytes::from(i.to_string()))
        });

        let relay = StreamRelay::new(2, Duration::from_secs(5));
        let (mut body, handle) = relay.spawn(source);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Two chunks in the channel plus one held by the pending send.
        assert!(pulled.load(Ordering::SeqCst) <= relay.capacity() + 1);

        let _ = body.next().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pulled.load(Ordering::SeqCst) <= relay.capacity() + 2);

        drop(body);
        assert_eq!(handle.finished().await, RelayState::Failed);
    }

    #[tokio::test]
    async fn test_handle_starts_idle() {
        let (_source_tx, source_rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(1);
        let (_body, handle) = relay().spawn(ReceiverStream::new(source_rx));
        assert_eq!(handle.state(), RelayState::Idle);
        assert!(!handle.state().is_terminal());
    }

    #[test]
    fn test_capacity_is_at_least_one() {
        assert_eq!(StreamRelay::new(0, Duration::from_secs(1)).capacity(), 1);
    }
}
