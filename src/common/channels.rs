//! Channels shared between the feed, the tracker and the background loops

use tokio::sync::{mpsc, watch};

use super::types::FeedEvent;

/// Buffer for streamed position events; a full buffer applies backpressure to the socket
pub const FEED_CHANNEL_SIZE: usize = 1000;

/// Feed events from [`crate::indexer::PositionFeedClient`] to the holder tracker
pub fn create_feed_channel() -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
    mpsc::channel(FEED_CHANNEL_SIZE)
}

/// Shutdown signal observed by every `run` loop
///
/// Send `true` to stop; dropping the sender also stops the loops.
pub fn create_shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_reaches_receivers() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut other = rx.clone();
        assert!(!*rx.borrow());

        tx.send(true).unwrap();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        other.changed().await.unwrap();
        assert!(*other.borrow_and_update());
    }
}
