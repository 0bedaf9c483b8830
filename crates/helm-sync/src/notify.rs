//! Broadcast notification shapes.

use serde::{Deserialize, Serialize};

use helm_gateway::ConnectionState;

/// What changed on a thread, carried inside a thread-update notification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadUpdateData {
    /// The thread's message list changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_updated: Option<bool>,
    /// The thread's status changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_status_updated: Option<bool>,
}

/// One notification delivered to observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    /// Something about one thread changed.
    #[serde(rename_all = "camelCase")]
    ThreadUpdate {
        /// The thread that changed.
        thread_id: String,
        /// What changed.
        data: ThreadUpdateData,
    },
    /// The set of threads changed; observers should re-list.
    ThreadListUpdate,
    /// The gateway connection state changed.
    ConnectionStatus {
        /// Current connection state.
        status: ConnectionState,
    },
}

impl Notification {
    /// Thread-update announcing new or changed messages.
    pub fn messages_updated(thread_id: impl Into<String>) -> Self {
        Self::ThreadUpdate {
            thread_id: thread_id.into(),
            data: ThreadUpdateData {
                messages_updated: Some(true),
                thread_status_updated: None,
            },
        }
    }

    /// Thread-update announcing a status change.
    pub fn thread_status_updated(thread_id: impl Into<String>) -> Self {
        Self::ThreadUpdate {
            thread_id: thread_id.into(),
            data: ThreadUpdateData {
                messages_updated: None,
                thread_status_updated: Some(true),
            },
        }
    }

    /// Cluster-wide thread list change.
    pub fn thread_list_update() -> Self {
        Self::ThreadListUpdate
    }

    /// Connection state change.
    pub fn connection_status(status: ConnectionState) -> Self {
        Self::ConnectionStatus { status }
    }
}
