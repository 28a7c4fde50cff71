//! Client disconnect detection for streaming responses.

use crate::core::CancelHandle;
use axum::body::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream wrapper that fires the cancel handle when dropped.
///
/// The response body is dropped both when the client disconnects and when
/// the stream finishes normally; the handle's completed flag distinguishes
/// the two, so only a genuine disconnect registers as a cancellation.
pub struct DisconnectStream<S> {
    pub stream: S,
    pub cancel_handle: CancelHandle,
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        if !self.cancel_handle.is_completed() {
            tracing::debug!("Client disconnect detected, stream cancelled");
        }
        self.cancel_handle.cancel();
    }
}
