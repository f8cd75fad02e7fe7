//! Chat stream task.
//!
//! A [`ChatStream`] owns one spawned task that opens the chat request, reads
//! the response body chunk by chunk, and forwards deltas in order over a
//! channel. The task ends on the first `stop` signal, at end of input, on a
//! read error, or as soon as its cancellation token fires.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::ClientError;
use crate::sse::{interpret, ChatSignal, SseBlock, SseDecoder};

/// Buffered events between the reader task and its consumer.
const EVENT_BUFFER: usize = 64;

/// Identifier of one chat stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Generate a new random StreamId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event produced by a chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text.
    Delta(String),
    /// The message is complete (`stop` signal or end of input).
    Completed,
    /// The request or the body read failed.
    Failed(String),
}

/// Handle to a running chat stream. Dropping it cancels the stream.
#[derive(Debug)]
pub struct ChatStream {
    id: StreamId,
    cancel: CancellationToken,
    events: mpsc::Receiver<StreamEvent>,
}

impl ChatStream {
    /// Spawn the reader task.
    ///
    /// `open` performs the request and resolves to the response body.
    pub fn spawn<F, S, E>(open: F) -> Self
    where
        F: Future<Output = Result<S, ClientError>> + Send + 'static,
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let id = StreamId::generate();
        let cancel = CancellationToken::new();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(run_stream(id, open, cancel.clone(), tx));

        Self { id, cancel, events }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Token that cancels this stream when fired.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort the request and stop reading.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next event, or `None` once the stream is cancelled or the task is gone.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn run_stream<F, S, E>(
    id: StreamId,
    open: F,
    cancel: CancellationToken,
    tx: mpsc::Sender<StreamEvent>,
) where
    F: Future<Output = Result<S, ClientError>>,
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(stream_id = %id, "Chat stream cancelled before response");
            return;
        }
        opened = open => opened,
    };

    let body = match opened {
        Ok(body) => body,
        Err(e) => {
            error!(stream_id = %id, error = %e, "Failed to open chat stream");
            let _ = tx.send(StreamEvent::Failed(e.to_string())).await;
            return;
        }
    };

    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();
    let mut chunks = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(stream_id = %id, chunks, "Chat stream cancelled");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                chunks += 1;
                for block in decoder.push(&chunk) {
                    if let Flow::Stop = forward(id, &block, &tx).await {
                        debug!(stream_id = %id, chunks, "Chat stream finished");
                        let _ = tx.send(StreamEvent::Completed).await;
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                error!(stream_id = %id, error = %e, "Chat stream read failed");
                let _ = tx
                    .send(StreamEvent::Failed(format!("stream read failed: {e}")))
                    .await;
                return;
            }
            None => break,
        }
    }

    if let Some(block) = decoder.finish() {
        if let Flow::Stop = forward(id, &block, &tx).await {
            let _ = tx.send(StreamEvent::Completed).await;
            return;
        }
    }

    debug!(stream_id = %id, chunks, "Chat stream reached end of input");
    let _ = tx.send(StreamEvent::Completed).await;
}

async fn forward(id: StreamId, block: &SseBlock, tx: &mpsc::Sender<StreamEvent>) -> Flow {
    match interpret(block) {
        Ok(ChatSignal::Stop) => Flow::Stop,
        Ok(ChatSignal::Delta(text)) => {
            if tx.send(StreamEvent::Delta(text)).await.is_err() {
                // Receiver gone: nobody is listening any more.
                return Flow::Stop;
            }
            Flow::Continue
        }
        Ok(ChatSignal::Ignore) => Flow::Continue,
        Err(e) => {
            let preview: String = block
                .data
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            warn!(stream_id = %id, error = %e, preview = %preview, "Skipping malformed stream block");
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures_util::stream;

    use super::*;

    fn delta(text: &str) -> String {
        format!("event: message\ndata: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n")
    }

    fn stop() -> String {
        "event: message\ndata: {\"choices\":[{\"finish_reason\":\"stop\"}]}\n\n".to_string()
    }

    fn chunks(parts: Vec<String>) -> Vec<Result<Bytes, Infallible>> {
        parts.into_iter().map(|p| Ok(Bytes::from(p))).collect()
    }

    async fn collect(mut stream: ChatStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            let terminal = !matches!(event, StreamEvent::Delta(_));
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_stop_signal_ends_reading() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let body = stream::iter(chunks(vec![delta("Hel"), delta("lo"), stop(), delta("XYZ")]))
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let events = collect(ChatStream::spawn(async move { Ok::<_, ClientError>(body) })).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("Hel".into()),
                StreamEvent::Delta("lo".into()),
                StreamEvent::Completed,
            ]
        );
        assert_eq!(polled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_end_of_input_completes() {
        let body = stream::iter(chunks(vec![delta("A"), delta("B")]));
        let events = collect(ChatStream::spawn(async move { Ok::<_, ClientError>(body) })).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("A".into()),
                StreamEvent::Delta("B".into()),
                StreamEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_block_skipped() {
        let bad = "event: message\ndata: {oops\n\n".to_string();
        let body = stream::iter(chunks(vec![delta("A"), bad, delta("B"), stop()]));
        let events = collect(ChatStream::spawn(async move { Ok::<_, ClientError>(body) })).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("A".into()),
                StreamEvent::Delta("B".into()),
                StreamEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_open_failure_reported() {
        let stream = ChatStream::spawn(async {
            Err::<stream::Empty<Result<Bytes, Infallible>>, _>(ClientError::Status(500))
        });
        let events = collect(stream).await;
        assert_eq!(
            events,
            vec![StreamEvent::Failed("request failed with HTTP 500".into())]
        );
    }

    #[tokio::test]
    async fn test_read_error_reported() {
        let body = stream::iter(vec![
            Ok(Bytes::from(delta("A"))),
            Err("connection reset".to_string()),
        ]);
        let events = collect(ChatStream::spawn(async move { Ok::<_, ClientError>(body) })).await;
        assert_eq!(events[0], StreamEvent::Delta("A".into()));
        assert_eq!(
            events[1],
            StreamEvent::Failed("stream read failed: connection reset".into())
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_events() {
        let body = stream::iter(chunks(vec![delta("partial")])).chain(stream::pending());
        let mut stream = ChatStream::spawn(async move { Ok::<_, ClientError>(body) });

        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::Delta("partial".into()))
        );
        stream.cancel();
        assert!(stream.is_cancelled());
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn test_drop_cancels_token() {
        let body = stream::pending::<Result<Bytes, Infallible>>();
        let stream = ChatStream::spawn(async move { Ok::<_, ClientError>(body) });
        let token = stream.cancel_token();
        drop(stream);
        assert!(token.is_cancelled());
    }
}
