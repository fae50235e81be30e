//! Read-ahead buffer over a stream of pending operations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FuturesOrdered, Stream, StreamExt};

/// Default number of operations kept in flight.
pub const DEFAULT_WINDOW: usize = 10;

/// Keeps up to `window` operations from `source` in flight while the
/// consumer works, and yields their results in source order.
///
/// The window is topped up on every poll. Operations may complete in any
/// order; results are released FIFO. The stream ends once the source has
/// ended and every admitted operation has been yielded.
#[must_use = "streams do nothing unless polled"]
pub struct FetchAhead<S>
where
    S: Stream,
    S::Item: Future,
{
    source: S,
    in_flight: FuturesOrdered<S::Item>,
    window: usize,
    source_done: bool,
}

impl<S> FetchAhead<S>
where
    S: Stream + Unpin,
    S::Item: Future,
{
    /// `window` is clamped to at least 1.
    pub fn new(source: S, window: usize) -> Self {
        Self {
            source,
            in_flight: FuturesOrdered::new(),
            window: window.max(1),
            source_done: false,
        }
    }

    /// Number of operations admitted and not yet yielded.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<S> Stream for FetchAhead<S>
where
    S: Stream + Unpin,
    S::Item: Future,
{
    type Item = <S::Item as Future>::Output;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        while !this.source_done && this.in_flight.len() < this.window {
            match this.source.poll_next_unpin(cx) {
                Poll::Ready(Some(op)) => this.in_flight.push_back(op),
                Poll::Ready(None) => this.source_done = true,
                Poll::Pending => break,
            }
        }

        match this.in_flight.poll_next_unpin(cx) {
            Poll::Ready(Some(output)) => Poll::Ready(Some(output)),
            Poll::Ready(None) if this.source_done => Poll::Ready(None),
            // empty window, source pending: its waker is registered above
            _ => Poll::Pending,
        }
    }
}
