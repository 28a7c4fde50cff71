//! Cancellation handle for streaming relays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle that distinguishes a stream finishing normally from the client
/// walking away mid-stream.
///
/// The relay marks the handle completed when it writes the terminal frame;
/// the response body wrapper cancels it on drop. A cancel that fires before
/// completion is a client disconnect.
#[derive(Clone)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
    completed: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender,
            receiver,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the stream as completed normally.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    /// Check if the stream completed normally.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation (only if not already completed).
    pub fn cancel(&self) {
        if !self.is_completed() {
            let _ = self.sender.send(true);
        }
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Get a receiver for use in select!.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_propagates() {
        let handle = CancelHandle::new();
        let mut rx = handle.subscribe();

        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());

        let _ = rx.changed().await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_completed_stream_ignores_cancel() {
        let handle = CancelHandle::new();
        handle.mark_completed();
        handle.cancel();

        assert!(handle.is_completed());
        assert!(!handle.is_cancelled());
    }
}
