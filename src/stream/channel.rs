//! Producer/consumer handoff between a decode thread and the response body

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use anyhow::{anyhow, Result};
use futures::stream::{FusedStream, Stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

enum Message {
    Chunk(String),
    Failed(anyhow::Error),
}

/// Create a connected sender/stream pair.
///
/// The sender is meant to be moved onto the thread running the decode loop;
/// the stream stays with whoever writes the response.
pub fn channel() -> (ChunkSender, ChunkStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChunkSender {
            tx,
            finished: false,
        },
        ChunkStream { rx, done: false },
    )
}

/// Producer half. Not `Clone`: a stream has exactly one producer.
pub struct ChunkSender {
    tx: UnboundedSender<Message>,
    finished: bool,
}

impl ChunkSender {
    /// Queue a chunk of text. Never blocks; empty chunks are dropped.
    pub fn push(&self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        // Fails only when the consumer is gone, in which case nobody is listening.
        let _ = self.tx.send(Message::Chunk(chunk));
    }

    /// Whether the consumer has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Signal end of sequence
    pub fn close(mut self) {
        self.finished = true;
    }

    /// End the stream with an error the consumer will observe as its last item
    pub fn fail(mut self, err: anyhow::Error) {
        self.finished = true;
        let _ = self.tx.send(Message::Failed(err));
    }
}

impl Drop for ChunkSender {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.tx.send(Message::Failed(anyhow!(
                "generation stopped before the stream was closed"
            )));
        }
    }
}

/// Consumer half: a lazy, finite stream of text chunks in production order.
///
/// Yields `Ok(chunk)` for each chunk, at most one `Err` if the producer
/// failed, then `None` forever.
pub struct ChunkStream {
    rx: UnboundedReceiver<Message>,
    done: bool,
}

impl ChunkStream {
    /// Drain the stream into a single string, failing on a producer error.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    fn on_message(&mut self, message: Option<Message>) -> Option<Result<String>> {
        match message {
            Some(Message::Chunk(chunk)) => Some(Ok(chunk)),
            Some(Message::Failed(err)) => {
                self.done = true;
                self.rx.close();
                Some(Err(err))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl Stream for ChunkStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        let message = ready!(self.rx.poll_recv(cx));
        Poll::Ready(self.on_message(message))
    }
}

impl FusedStream for ChunkStream {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let (tx, rx) = channel();
        let produced: Vec<String> = (0..100).map(|i| format!("chunk-{i} ")).collect();

        let expected = produced.clone();
        let producer = std::thread::spawn(move || {
            for chunk in produced {
                tx.push(chunk);
            }
            tx.close();
        });

        let received: Vec<String> = rx.map(|c| c.unwrap()).collect().await;
        producer.join().unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_close_ends_stream_promptly() {
        let (tx, mut rx) = channel();
        tx.push("last");
        tx.close();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.next()).await;
        assert_eq!(first.unwrap().unwrap().unwrap(), "last");
        let end = tokio::time::timeout(Duration::from_secs(1), rx.next()).await;
        assert!(end.unwrap().is_none());
        assert!(rx.is_terminated());
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let (tx, mut rx) = channel();
        tx.push("partial");
        tx.fail(anyhow!("out of memory"));

        assert_eq!(rx.next().await.unwrap().unwrap(), "partial");
        let err = rx.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("out of memory"));
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_reported_as_error() {
        let (tx, rx) = channel();
        let producer = std::thread::spawn(move || {
            tx.push("before panic ");
            panic!("decode loop blew up");
        });
        assert!(producer.join().is_err());

        let err = rx.collect_text().await.unwrap_err();
        assert!(err.to_string().contains("before the stream was closed"));
    }

    #[tokio::test]
    async fn test_empty_chunks_are_skipped() {
        let (tx, rx) = channel();
        tx.push("");
        tx.push("a");
        tx.push(String::new());
        tx.close();

        let chunks: Vec<_> = rx.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["a".to_string()]);
    }

    #[test]
    fn test_sender_sees_consumer_hang_up() {
        let (tx, rx) = channel();
        assert!(!tx.is_closed());
        drop(rx);
        assert!(tx.is_closed());
        // Pushing into a closed stream is a no-op.
        tx.push("ignored");
        tx.close();
    }
}
