//! Notification fan-out to connected observers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::notify::Notification;
use crate::observer::ObserverConnection;

/// Manages observer connections and room membership.
///
/// Rooms scope delivery to interested observers (typically one room per
/// thread). Membership is idempotent, empty rooms are pruned, and removing
/// an observer removes all its memberships. Delivery is fire-and-forget per
/// observer; a slow or disconnected observer never blocks the rest.
#[derive(Default)]
pub struct Broadcaster {
    /// Connected observers indexed by observer id.
    connections: RwLock<HashMap<String, Arc<ObserverConnection>>>,
    /// Room id to member observer ids.
    rooms: RwLock<HashMap<String, HashSet<String>>>,
}

impl Broadcaster {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer connection.
    pub async fn add(&self, observer: Arc<ObserverConnection>) {
        let _ = self
            .connections
            .write()
            .await
            .insert(observer.id.clone(), observer);
    }

    /// Remove an observer and all its room memberships.
    pub async fn remove(&self, observer_id: &str) {
        let _ = self.connections.write().await.remove(observer_id);
        let mut rooms = self.rooms.write().await;
        for members in rooms.values_mut() {
            let _ = members.remove(observer_id);
        }
        rooms.retain(|_, members| !members.is_empty());
    }

    /// Join an observer to a room. Idempotent.
    pub async fn join(&self, observer_id: &str, room: &str) {
        let mut rooms = self.rooms.write().await;
        let _ = rooms
            .entry(room.to_string())
            .or_default()
            .insert(observer_id.to_string());
    }

    /// Remove an observer from a room. Idempotent; the last member leaving
    /// prunes the room.
    pub async fn leave(&self, observer_id: &str, room: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            let _ = members.remove(observer_id);
            if members.is_empty() {
                let _ = rooms.remove(room);
            }
        }
    }

    /// Deliver a notification to every member of `room`.
    pub async fn publish(&self, room: &str, notification: &Notification) {
        let Some(json) = serialize(notification) else {
            return;
        };
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            debug!(room, "publish to empty room");
            return;
        };
        let connections = self.connections.read().await;
        debug!(room, recipients = members.len(), "publishing to room");
        for member in members {
            if let Some(observer) = connections.get(member)
                && !observer.send(Arc::clone(&json))
            {
                warn!(observer = %observer.id, room, "failed to deliver notification");
            }
        }
    }

    /// Deliver a notification to every connected observer.
    pub async fn publish_all(&self, notification: &Notification) {
        let Some(json) = serialize(notification) else {
            return;
        };
        let connections = self.connections.read().await;
        debug!(recipients = connections.len(), "publishing to all observers");
        for observer in connections.values() {
            if !observer.send(Arc::clone(&json)) {
                warn!(observer = %observer.id, "failed to deliver notification");
            }
        }
    }

    /// Number of connected observers.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

fn serialize(notification: &Notification) -> Option<Arc<String>> {
    match serde_json::to_string(notification) {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(error = %e, "failed to serialize notification");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn connect(
        broadcaster: &Broadcaster,
        id: &str,
    ) -> mpsc::Receiver<Arc<String>> {
        let (observer, rx) = ObserverConnection::channel(id, 8);
        broadcaster.add(observer).await;
        rx
    }

    fn parse(message: &Arc<String>) -> Notification {
        serde_json::from_str(message).unwrap()
    }

    #[tokio::test]
    async fn publish_reaches_only_room_members() {
        let broadcaster = Broadcaster::new();
        let mut in_room = connect(&broadcaster, "obs_1").await;
        let mut outside = connect(&broadcaster, "obs_2").await;
        broadcaster.join("obs_1", "thread:t1").await;

        broadcaster
            .publish("thread:t1", &Notification::messages_updated("t1"))
            .await;

        assert_eq!(
            parse(&in_room.recv().await.unwrap()),
            Notification::messages_updated("t1")
        );
        assert!(outside.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_all_ignores_rooms() {
        let broadcaster = Broadcaster::new();
        let mut a = connect(&broadcaster, "obs_1").await;
        let mut b = connect(&broadcaster, "obs_2").await;
        broadcaster.join("obs_1", "thread:t1").await;

        broadcaster
            .publish_all(&Notification::thread_list_update())
            .await;

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn join_is_idempotent_and_leave_prunes_empty_rooms() {
        let broadcaster = Broadcaster::new();
        let mut rx = connect(&broadcaster, "obs_1").await;
        broadcaster.join("obs_1", "thread:t1").await;
        broadcaster.join("obs_1", "thread:t1").await;
        assert_eq!(broadcaster.room_count().await, 1);

        broadcaster
            .publish("thread:t1", &Notification::messages_updated("t1"))
            .await;
        assert!(rx.recv().await.is_some());
        // Duplicate join must not cause duplicate delivery.
        assert!(rx.try_recv().is_err());

        broadcaster.leave("obs_1", "thread:t1").await;
        broadcaster.leave("obs_1", "thread:t1").await;
        assert_eq!(broadcaster.room_count().await, 0);
    }

    #[tokio::test]
    async fn removing_an_observer_clears_all_memberships() {
        let broadcaster = Broadcaster::new();
        let _rx = connect(&broadcaster, "obs_1").await;
        broadcaster.join("obs_1", "thread:t1").await;
        broadcaster.join("obs_1", "thread:t2").await;

        broadcaster.remove("obs_1").await;
        assert_eq!(broadcaster.connection_count().await, 0);
        assert_eq!(broadcaster.room_count().await, 0);
    }

    #[tokio::test]
    async fn slow_observer_does_not_block_delivery_to_others() {
        let broadcaster = Broadcaster::new();
        let (slow, _slow_rx) = ObserverConnection::channel("obs_slow", 1);
        broadcaster.add(Arc::clone(&slow)).await;
        let mut healthy = connect(&broadcaster, "obs_ok").await;
        broadcaster.join("obs_slow", "thread:t1").await;
        broadcaster.join("obs_ok", "thread:t1").await;

        // Fill the slow observer's channel, then publish twice more.
        broadcaster
            .publish("thread:t1", &Notification::messages_updated("t1"))
            .await;
        broadcaster
            .publish("thread:t1", &Notification::messages_updated("t1"))
            .await;
        broadcaster
            .publish("thread:t1", &Notification::thread_status_updated("t1"))
            .await;

        assert_eq!(slow.dropped_messages(), 2);
        for _ in 0..3 {
            assert!(healthy.recv().await.is_some());
        }
    }
}
