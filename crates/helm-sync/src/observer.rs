//! Connected observer state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::debug;

/// One connected observer of broadcast notifications.
///
/// Delivery is fire-and-forget over a bounded channel: a full or closed
/// channel drops the message and bumps the counter instead of blocking the
/// broadcaster.
pub struct ObserverConnection {
    /// Unique observer id.
    pub id: String,
    tx: mpsc::Sender<Arc<String>>,
    /// When this observer connected.
    pub connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl ObserverConnection {
    /// Wrap an existing send channel.
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: id.into(),
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create an observer together with the receiving end of its channel.
    pub fn channel(
        id: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(id, tx)), rx)
    }

    /// Send one serialized notification.
    ///
    /// Returns `false` when the message was dropped.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let dropped = self.dropped_messages.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(observer = %self.id, dropped, "observer channel full or closed; message dropped");
            false
        }
    }

    /// Total messages dropped for this observer.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_until_the_channel_fills() {
        let (observer, mut rx) = ObserverConnection::channel("obs_1", 1);
        assert!(observer.send(Arc::new("one".to_string())));
        assert!(!observer.send(Arc::new("two".to_string())));
        assert_eq!(observer.dropped_messages(), 1);
        assert_eq!(rx.recv().await.unwrap().as_str(), "one");
    }

    #[test]
    fn closed_channel_counts_as_dropped() {
        let (observer, rx) = ObserverConnection::channel("obs_1", 4);
        drop(rx);
        assert!(!observer.send(Arc::new("gone".to_string())));
        assert_eq!(observer.dropped_messages(), 1);
    }
}
