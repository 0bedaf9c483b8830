//! Id generation.
//!
//! All ids are UUID v7 (time-ordered) via [`uuid::Uuid::now_v7`], prefixed
//! by entity kind so a bare id in a log line is self-describing.

use uuid::Uuid;

/// Generate a request id for one in-flight call.
pub fn request_id() -> String {
    format!("req_{}", Uuid::now_v7())
}

/// Generate a stable client id for handshake identity.
pub fn client_id() -> String {
    format!("client_{}", Uuid::now_v7())
}

/// Generate an observer connection id for fan-out bookkeeping.
pub fn observer_id() -> String {
    format!("obs_{}", Uuid::now_v7())
}
