//! Real-time fan-out and state sync.
//!
//! Observers join rooms on a [`Broadcaster`] and receive notifications as
//! threads change; the [`SyncBridge`] feeds it from gateway activity,
//! always completing the persistent-store write before broadcasting.

#![deny(unsafe_code)]

pub mod bridge;
pub mod broadcast;
pub mod errors;
pub mod notify;
pub mod observer;
pub mod store;

pub use bridge::{BridgeEvent, SyncBridge};
pub use broadcast::Broadcaster;
pub use errors::SyncError;
pub use notify::{Notification, ThreadUpdateData};
pub use observer::ObserverConnection;
pub use store::{KvStore, MemoryStore};
