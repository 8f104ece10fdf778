//! Push-to-pull relay between a provider's streaming callback and the
//! consumer rendering the reply.
//!
//! The producer pushes chunks into a bounded queue through a [`ChunkSink`];
//! the consumer pulls them from a [`ChunkStream`]. The queue closing is the
//! only end-of-stream signal. A failed producer sends one final
//! [`StreamMessage::Error`] before the queue closes.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{FutureExt, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// Error text delivered when a producer panics.
pub const PRODUCER_PANICKED: &str = "response task panicked";

/// Default relay queue capacity, in chunks.
pub const DEFAULT_STREAM_BUFFER: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Chunk(String),
    /// Final item of a failed stream, carrying the error text.
    Error(String),
}

/// The consumer dropped its stream or the relay was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClosed;

impl fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stream consumer went away")
    }
}

impl std::error::Error for StreamClosed {}

/// Producer half of the relay.
#[derive(Clone, Debug)]
pub struct ChunkSink {
    tx: mpsc::Sender<StreamMessage>,
    cancel: CancellationToken,
}

impl ChunkSink {
    /// Queue one chunk, waiting while the queue is full.
    ///
    /// Fails once the consumer is gone or the relay is cancelled, so a
    /// producer blocked on a full queue is always released.
    pub async fn send(&self, chunk: impl Into<String>) -> Result<(), StreamClosed> {
        self.push(StreamMessage::Chunk(chunk.into())).await
    }

    async fn push(&self, message: StreamMessage) -> Result<(), StreamClosed> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamClosed),
            sent = self.tx.send(message) => sent.map_err(|_| StreamClosed),
        }
    }

    /// Emit the error sentinel. The queue closes once every sink is dropped.
    async fn fail(self, error: String) {
        if self.push(StreamMessage::Error(error)).await.is_err() {
            debug!("stream consumer gone before error could be delivered");
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Consumer half of the relay: a lazy, finite, non-restartable sequence.
///
/// Dropping the stream cancels the producer.
pub struct ChunkStream {
    rx: mpsc::Receiver<StreamMessage>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ChunkStream {
    /// Next message, or `None` once the producer has finished.
    pub async fn next_message(&mut self) -> Option<StreamMessage> {
        self.rx.recv().await
    }

    /// Drain the stream, concatenating every chunk.
    ///
    /// Returns the text received before any error, and the error text.
    pub async fn collect_text(mut self) -> (String, Option<String>) {
        let mut text = String::new();
        while let Some(message) = self.next_message().await {
            match message {
                StreamMessage::Chunk(chunk) => text.push_str(&chunk),
                StreamMessage::Error(error) => return (text, Some(error)),
            }
        }
        (text, None)
    }
}

impl Stream for ChunkStream {
    type Item = StreamMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Create a connected sink/stream pair with a queue of `capacity` chunks.
///
/// The pair is cancelled when `parent` is, or when the stream is dropped;
/// dropping the stream never cancels `parent` itself.
pub fn relay(capacity: usize, parent: &CancellationToken) -> (ChunkSink, ChunkStream) {
    let cancel = parent.child_token();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sink = ChunkSink {
        tx,
        cancel: cancel.clone(),
    };
    let stream = ChunkStream {
        rx,
        _guard: cancel.clone().drop_guard(),
        cancel,
    };
    (sink, stream)
}

/// Run `producer` on a task of `tasks`, feeding the returned stream.
///
/// If the producer fails or panics, the error text becomes the final
/// chunk. The producer is abandoned as soon as `parent` fires or the
/// stream is dropped.
pub fn spawn_relay<F, Fut, E>(
    capacity: usize,
    parent: &CancellationToken,
    tasks: &TaskTracker,
    producer: F,
) -> ChunkStream
where
    F: FnOnce(ChunkSink) -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let (sink, stream) = relay(capacity, parent);
    let cancel = sink.cancel_token().clone();
    let work = AssertUnwindSafe(producer(sink.clone())).catch_unwind();

    tasks.spawn(async move {
        tokio::select! {
            outcome = work => match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => sink.fail(err.to_string()).await,
                Err(_) => {
                    error!("relay producer panicked");
                    sink.fail(PRODUCER_PANICKED.to_string()).await;
                }
            },
            _ = cancel.cancelled() => {
                debug!("relay producer cancelled");
            }
        }
    });

    stream
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn spawn_untracked<F, Fut, E>(capacity: usize, parent: &CancellationToken, producer: F) -> ChunkStream
    where
        F: FnOnce(ChunkSink) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        spawn_relay(capacity, parent, &TaskTracker::new(), producer)
    }

    #[tokio::test]
    async fn chunks_arrive_in_send_order() {
        let stream = spawn_untracked(2, &CancellationToken::new(), |sink| async move {
            for chunk in ["a", "b", "c", "d", "e"] {
                sink.send(chunk).await?;
            }
            Ok::<_, StreamClosed>(())
        });

        let messages: Vec<StreamMessage> = stream.collect().await;
        let expected: Vec<StreamMessage> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|chunk| StreamMessage::Chunk(chunk.into()))
            .collect();
        assert_eq!(messages, expected);
    }

    #[tokio::test]
    async fn producer_error_becomes_final_chunk() {
        let mut stream = spawn_untracked(4, &CancellationToken::new(), |sink| async move {
            sink.send("partial").await.map_err(|e| e.to_string())?;
            Err::<(), _>("connection reset".to_string())
        });

        assert_eq!(
            stream.next_message().await,
            Some(StreamMessage::Chunk("partial".into()))
        );
        assert_eq!(
            stream.next_message().await,
            Some(StreamMessage::Error("connection reset".into()))
        );
        assert_eq!(stream.next_message().await, None);
        assert_eq!(stream.next_message().await, None);
    }

    #[tokio::test]
    async fn error_before_any_chunk_is_still_reported() {
        let stream = spawn_untracked(1, &CancellationToken::new(), |_sink| async move {
            Err::<(), _>("history write failed")
        });
        let (text, error) = stream.collect_text().await;
        assert!(text.is_empty());
        assert_eq!(error.as_deref(), Some("history write failed"));
    }

    #[tokio::test]
    async fn producer_panic_ends_the_stream_with_an_error() {
        let stream = spawn_untracked(4, &CancellationToken::new(), |sink| async move {
            sink.send("par").await?;
            if !sink.cancel_token().is_cancelled() {
                panic!("backend bug");
            }
            Ok::<_, StreamClosed>(())
        });

        let (text, error) = stream.collect_text().await;
        assert_eq!(text, "par");
        assert_eq!(error.as_deref(), Some(PRODUCER_PANICKED));
    }

    #[tokio::test]
    async fn relay_task_is_tracked() {
        let tasks = TaskTracker::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let stream = spawn_relay(4, &CancellationToken::new(), &tasks, |_sink| async move {
            let _ = release_rx.await;
            Ok::<_, StreamClosed>(())
        });
        assert_eq!(tasks.len(), 1);

        tasks.close();
        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), tasks.wait())
            .await
            .expect("relay task should finish");
        let (text, error) = stream.collect_text().await;
        assert!(text.is_empty());
        assert_eq!(error, None);
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_a_blocked_producer() {
        let (sink, stream) = relay(1, &CancellationToken::new());
        let producer = tokio::spawn(async move {
            let mut sent = 0usize;
            while sink.send("x").await.is_ok() {
                sent += 1;
            }
            sent
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(stream);

        let sent = tokio::time::timeout(Duration::from_secs(2), producer)
            .await
            .expect("producer should observe the closed stream")
            .unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn dropping_the_stream_abandons_a_spawned_producer() {
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let stream = spawn_untracked(4, &CancellationToken::new(), |_sink| async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
            Ok::<_, StreamClosed>(())
        });

        drop(stream);

        let dropped = tokio::time::timeout(Duration::from_secs(2), alive_rx)
            .await
            .expect("producer future should be dropped");
        assert!(dropped.is_err());
    }

    #[tokio::test]
    async fn dropping_the_stream_leaves_the_parent_token_alone() {
        let parent = CancellationToken::new();
        let (_sink, stream) = relay(4, &parent);
        drop(stream);
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_producer() {
        let cancel = CancellationToken::new();
        let mut stream = spawn_untracked(4, &cancel, |_sink| async move {
            std::future::pending::<()>().await;
            Ok::<_, StreamClosed>(())
        });

        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(2), stream.next_message())
            .await
            .expect("stream should close after cancellation");
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn sink_refuses_chunks_after_consumer_drops() {
        let (sink, stream) = relay(4, &CancellationToken::new());
        drop(stream);
        assert!(sink.cancel_token().is_cancelled());
        assert_eq!(sink.send("late").await, Err(StreamClosed));
    }
}
