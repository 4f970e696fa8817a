use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::Result;

// ─── TextStream ───────────────────────────────────────────────────────────

/// An async stream of text deltas from one streamed completion.
///
/// Backed by a Tokio mpsc channel fed by a background task that owns the
/// HTTP connection. The stream ends after the final event, after the first
/// error, or when the connection closes. Dropping `TextStream` closes the
/// receiver, which makes the background task stop on its next send.
pub struct TextStream {
    rx: mpsc::Receiver<Result<String>>,
}

impl TextStream {
    /// Wrap a raw receiver. Alternative [`crate::Completion`] backends and
    /// tests use this to feed scripted chunks.
    pub fn from_channel(rx: mpsc::Receiver<Result<String>>) -> Self {
        Self { rx }
    }

    /// A stream that yields the given items and ends.
    pub fn from_items(items: Vec<Result<String>>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity covers every item; the receiver is still alive here.
            let _ = tx.try_send(item);
        }
        Self { rx }
    }
}

impl Stream for TextStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClaudeError;
    use futures::StreamExt;

    #[tokio::test]
    async fn yields_items_in_order_then_ends() {
        let stream = TextStream::from_items(vec![Ok("a".into()), Ok("b".into())]);
        let items: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn channel_backed_stream_ends_when_sender_drops() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = TextStream::from_channel(rx);
        tokio::spawn(async move {
            tx.send(Ok("x".to_string())).await.unwrap();
            tx.send(Err(ClaudeError::Stream("boom".into()))).await.unwrap();
        });
        assert_eq!(stream.next().await.unwrap().unwrap(), "x");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_stream_ends_immediately() {
        let mut stream = TextStream::from_items(Vec::new());
        assert!(stream.next().await.is_none());
    }
}
