//! Client-side driver for streamed responses
//!
//! [`StreamConsumer::stream`] sends a request, decodes the body as it arrives
//! and reports to a [`StreamObserver`]. Every stream ends with exactly one of
//! `on_done` or `on_error`.

use futures::StreamExt;
use reqwest::RequestBuilder;

use super::decoder::Utf8ChunkDecoder;
use super::error::ClientError;

/// Receives the decoded text of one streamed response
pub trait StreamObserver {
    /// Called with the decoded text of each chunk, in arrival order
    fn on_chunk(&mut self, text: &str);

    /// Called once when the body ended cleanly
    fn on_done(&mut self);

    /// Called once when the request or the body failed
    fn on_error(&mut self, error: ClientError);
}

/// Observer assembled from three closures
pub struct CallbackObserver<C, D, E> {
    on_chunk: C,
    on_done: D,
    on_error: E,
}

/// Build a [`CallbackObserver`] from chunk, done and error callbacks
pub fn callbacks<C, D, E>(on_chunk: C, on_done: D, on_error: E) -> CallbackObserver<C, D, E>
where
    C: FnMut(&str),
    D: FnMut(),
    E: FnMut(ClientError),
{
    CallbackObserver {
        on_chunk,
        on_done,
        on_error,
    }
}

impl<C, D, E> StreamObserver for CallbackObserver<C, D, E>
where
    C: FnMut(&str),
    D: FnMut(),
    E: FnMut(ClientError),
{
    fn on_chunk(&mut self, text: &str) {
        (self.on_chunk)(text)
    }

    fn on_done(&mut self) {
        (self.on_done)()
    }

    fn on_error(&mut self, error: ClientError) {
        (self.on_error)(error)
    }
}

/// How a stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `on_done` was called
    Done,
    /// `on_error` was called
    Failed,
}

/// Drives one streamed request to completion
pub struct StreamConsumer;

impl StreamConsumer {
    /// Send `request` and feed the response body to `observer`.
    ///
    /// A non-success status is reported through `on_error` without reading
    /// the body. Chunks whose bytes only continue a pending multi-byte
    /// character produce no `on_chunk` call.
    pub async fn stream<O>(request: RequestBuilder, observer: &mut O) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Stream request failed: {e}");
                observer.on_error(ClientError::Transport(e));
                return StreamOutcome::Failed;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Stream rejected");
            observer.on_error(ClientError::Status {
                status,
                body: String::new(),
            });
            return StreamOutcome::Failed;
        }

        let mut decoder = Utf8ChunkDecoder::new();
        let mut body = response.bytes_stream();
        let mut chunks: u64 = 0;

        while let Some(item) = body.next().await {
            match item {
                Ok(bytes) => {
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() {
                        chunks += 1;
                        observer.on_chunk(&text);
                    }
                }
                Err(e) => {
                    tracing::debug!(chunks, "Stream aborted: {e}");
                    observer.on_error(ClientError::StreamRead(e.to_string()));
                    return StreamOutcome::Failed;
                }
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            observer.on_chunk(&tail);
        }

        tracing::debug!(chunks, "Stream completed");
        observer.on_done();
        StreamOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<String>,
        done: usize,
        errors: Vec<ClientError>,
    }

    impl StreamObserver for Recorder {
        fn on_chunk(&mut self, text: &str) {
            self.chunks.push(text.to_string());
        }

        fn on_done(&mut self) {
            self.done += 1;
        }

        fn on_error(&mut self, error: ClientError) {
            self.errors.push(error);
        }
    }

    #[tokio::test]
    async fn test_success_body_reaches_on_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Hello, wörld"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let mut recorder = Recorder::default();
        let outcome = StreamConsumer::stream(
            client.post(format!("{}/stream", server.uri())),
            &mut recorder,
        )
        .await;

        assert_eq!(outcome, StreamOutcome::Done);
        assert_eq!(recorder.chunks.concat(), "Hello, wörld");
        assert_eq!(recorder.done, 1);
        assert!(recorder.errors.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_skips_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let mut recorder = Recorder::default();
        let outcome = StreamConsumer::stream(client.post(server.uri()), &mut recorder).await;

        assert_eq!(outcome, StreamOutcome::Failed);
        assert!(recorder.chunks.is_empty());
        assert_eq!(recorder.done, 0);
        assert_eq!(recorder.errors.len(), 1);
        assert!(recorder.errors[0].is_unauthorized());
    }

    #[tokio::test]
    async fn test_transport_failure_reports_error_once() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = reqwest::Client::new();
        let mut recorder = Recorder::default();
        let outcome =
            StreamConsumer::stream(client.get(format!("http://{addr}/")), &mut recorder).await;

        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(recorder.done, 0);
        assert!(matches!(recorder.errors.as_slice(), [ClientError::Transport(_)]));
    }

    #[tokio::test]
    async fn test_callback_observer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abc"))
            .mount(&server)
            .await;

        let mut text = String::new();
        let mut done = 0;
        let mut failed = 0;
        let mut observer = callbacks(
            |chunk: &str| text.push_str(chunk),
            || done += 1,
            |_| failed += 1,
        );

        let client = reqwest::Client::new();
        StreamConsumer::stream(client.get(server.uri()), &mut observer).await;
        drop(observer);

        assert_eq!(text, "abc");
        assert_eq!(done, 1);
        assert_eq!(failed, 0);
    }
}
