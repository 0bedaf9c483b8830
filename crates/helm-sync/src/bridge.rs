//! Bridges gateway activity to the store and the broadcaster.
//!
//! Ordering contract: whenever an inbound event implies a state change, the
//! corresponding store write completes before any observer is notified. An
//! observer that reacts to a broadcast by re-reading state therefore never
//! observes data older than the change it was told about.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use helm_gateway::ConnectionState;
use helm_stream::{RunDirectory, RunEvent};

use crate::broadcast::Broadcaster;
use crate::errors::SyncError;
use crate::notify::Notification;
use crate::store::KvStore;

/// Store key for a thread's assembled message list.
pub fn thread_messages_key(thread_id: &str) -> String {
    format!("thread:{thread_id}:messages")
}

/// Store key for a thread's latest token usage.
pub fn thread_usage_key(thread_id: &str) -> String {
    format!("thread:{thread_id}:usage")
}

/// Store key for a thread's status string.
pub fn thread_status_key(thread_id: &str) -> String {
    format!("thread:{thread_id}:status")
}

/// One unit of inbound activity for the bridge to relay.
#[derive(Clone, Debug)]
pub enum BridgeEvent {
    /// A streamed run event for a thread.
    Run {
        /// The thread the run belongs to.
        thread_id: String,
        /// The event itself.
        event: RunEvent,
    },
    /// A thread's status changed.
    ThreadStatus {
        /// The thread that changed.
        thread_id: String,
        /// New status string.
        status: String,
    },
    /// The set of threads changed (created, deleted, renamed).
    ThreadListChanged,
    /// The gateway connection state changed.
    Connection {
        /// New connection state.
        state: ConnectionState,
    },
}

/// Relays gateway activity into store writes and broadcasts.
pub struct SyncBridge {
    store: Arc<dyn KvStore>,
    broadcaster: Arc<Broadcaster>,
    runs: RunDirectory,
}

impl SyncBridge {
    /// Create a bridge over a store and broadcaster.
    pub fn new(store: Arc<dyn KvStore>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            runs: RunDirectory::new(),
        }
    }

    /// Consume bridge events until the sender side is dropped.
    ///
    /// Store failures are logged and skipped; the bridge must outlive any
    /// individual bad write.
    #[tracing::instrument(skip_all, name = "sync_bridge")]
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BridgeEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle(event).await {
                warn!(error = %e, "bridge event failed");
            }
        }
        info!("bridge input closed, exiting");
    }

    /// Dispatch one bridge event.
    pub async fn handle(&mut self, event: BridgeEvent) -> Result<(), SyncError> {
        match event {
            BridgeEvent::Run { thread_id, event } => self.handle_run_event(&thread_id, event).await,
            BridgeEvent::ThreadStatus { thread_id, status } => {
                self.handle_thread_status(&thread_id, &status).await
            }
            BridgeEvent::ThreadListChanged => {
                self.broadcaster
                    .publish_all(&Notification::thread_list_update())
                    .await;
                Ok(())
            }
            BridgeEvent::Connection { state } => {
                self.broadcaster
                    .publish_all(&Notification::connection_status(state))
                    .await;
                Ok(())
            }
        }
    }

    /// Accumulate one run event; on a terminal event, persist the assembled
    /// messages and usage, then announce the update to the thread's room.
    pub async fn handle_run_event(
        &mut self,
        thread_id: &str,
        event: RunEvent,
    ) -> Result<(), SyncError> {
        let usage = event.usage;
        let messages = self.runs.process_event(event);
        if messages.is_empty() {
            // Mid-run delta: interim state only, nothing persisted yet.
            return Ok(());
        }

        if let Some(usage) = usage {
            self.store
                .set(&thread_usage_key(thread_id), serde_json::to_value(usage)?)
                .await?;
        }

        let key = thread_messages_key(thread_id);
        let mut stored: Vec<serde_json::Value> = match self.store.get(&key).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        for message in &messages {
            stored.push(serde_json::to_value(message)?);
        }
        self.store.set(&key, serde_json::Value::Array(stored)).await?;
        debug!(thread = thread_id, appended = messages.len(), "messages persisted");

        // Write is durable; only now may observers learn about it.
        self.broadcaster
            .publish(thread_id, &Notification::messages_updated(thread_id))
            .await;
        Ok(())
    }

    /// Persist a thread status change, then announce it.
    pub async fn handle_thread_status(
        &self,
        thread_id: &str,
        status: &str,
    ) -> Result<(), SyncError> {
        self.store
            .set(
                &thread_status_key(thread_id),
                serde_json::Value::String(status.to_string()),
            )
            .await?;
        self.broadcaster
            .publish(thread_id, &Notification::thread_status_updated(thread_id))
            .await;
        Ok(())
    }

    /// Interim view of a run mid-accumulation, for live rendering.
    pub fn interim_blocks(&self, run_id: &str) -> Option<&[helm_core::ContentBlock]> {
        self.runs.get(run_id).map(helm_stream::RunAccumulator::blocks)
    }
}
