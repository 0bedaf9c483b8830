//! Wire-frame types for the gateway protocol.
//!
//! Three tagged variants travel over the transport: requests (correlated by
//! caller-generated id), responses (echoing exactly one request id), and
//! unsolicited events carrying a remote-side sequence counter. The `seq`
//! counter is for ordering and debugging only — never gap detection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method name of the handshake call.
pub const CONNECT_METHOD: &str = "connect";

/// Event name of the handshake challenge sent by the gateway.
pub const CHALLENGE_EVENT: &str = "connect.challenge";

/// Lowest protocol version this client speaks.
pub const MIN_PROTOCOL_VERSION: u32 = 1;

/// Highest protocol version this client speaks.
pub const MAX_PROTOCOL_VERSION: u32 = 1;

/// One frame exchanged over the gateway transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Outgoing call, correlated to a response by `id`.
    #[serde(rename = "req")]
    Request {
        /// Unique per in-flight call, generated by the caller.
        id: String,
        /// Method name (e.g. `thread.send`).
        method: String,
        /// Optional parameters object.
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    /// Reply to exactly one prior request.
    #[serde(rename = "res")]
    Response {
        /// Echoed request identifier.
        id: String,
        /// Whether the call succeeded.
        ok: bool,
        /// Result payload (present when `ok == true`).
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Error body (present when `ok == false`).
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<RemoteErrorBody>,
    },
    /// Unsolicited server push.
    #[serde(rename = "event")]
    Event {
        /// Event name (e.g. `run.delta`).
        event: String,
        /// Event payload.
        payload: Value,
        /// Monotonic counter from the remote side.
        seq: u64,
    },
}

/// Structured error body inside a response frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    /// Machine-readable error code (e.g. `AUTH_REJECTED`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl Frame {
    /// Build a request frame.
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Build a success response frame.
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Self::Response {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build an error response frame.
    pub fn error(
        id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Response {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(RemoteErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Build an event frame.
    pub fn event(name: impl Into<String>, payload: Value, seq: u64) -> Self {
        Self::Event {
            event: name.into(),
            payload,
            seq,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake types
// ─────────────────────────────────────────────────────────────────────────────

/// Challenge payload sent by the gateway immediately after transport open.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectChallenge {
    /// Single-use nonce to echo in the connect call.
    pub nonce: String,
    /// Remote wall-clock milliseconds at challenge time.
    pub ts: i64,
}

/// Client identity carried inside [`ConnectParams`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Stable client identifier.
    pub id: String,
    /// Client version string.
    pub version: String,
    /// Host platform (e.g. `macos`).
    pub platform: String,
    /// Client mode (e.g. `operator`).
    pub mode: String,
}

/// Parameters of the `connect` handshake call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol version the client accepts.
    pub min_protocol: u32,
    /// Highest protocol version the client accepts.
    pub max_protocol: u32,
    /// Client identity.
    pub client: ClientInfo,
    /// Requested role (e.g. `operator`).
    pub role: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Advertised client capabilities.
    pub caps: Vec<String>,
    /// Credentials, opaque to this layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    /// User-agent string.
    pub user_agent: String,
    /// BCP-47 locale.
    pub locale: String,
}

/// Capability set advertised by the gateway in the handshake result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayFeatures {
    /// Methods the gateway accepts.
    pub methods: Vec<String>,
    /// Events the gateway may push.
    pub events: Vec<String>,
}

/// Payload of a successful `connect` response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResult {
    /// Negotiated protocol version.
    pub protocol: u32,
    /// Supported methods and events, if advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<GatewayFeatures>,
    /// Refreshed auth material (e.g. device token), opaque to this layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_frame_wire_shape() {
        let frame = Frame::request("r1", "thread.send", Some(json!({"text": "hi"})));
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["type"], "req");
        assert_eq!(wire["id"], "r1");
        assert_eq!(wire["method"], "thread.send");
        assert_eq!(wire["params"]["text"], "hi");
    }

    #[test]
    fn request_without_params_omits_field() {
        let frame = Frame::request("r1", "ping", None);
        let wire = serde_json::to_value(&frame).unwrap();
        assert!(wire.get("params").is_none());
    }

    #[test]
    fn ok_response_round_trip() {
        let frame = Frame::ok("r2", json!({"threadId": "t1"}));
        let wire = serde_json::to_string(&frame).unwrap();
        let parsed: Frame = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let frame = Frame::error("r3", "AUTH_REJECTED", "bad token");
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["type"], "res");
        assert_eq!(wire["ok"], false);
        assert_eq!(wire["error"]["code"], "AUTH_REJECTED");
        assert_eq!(wire["error"]["message"], "bad token");
        assert!(wire.get("payload").is_none());
    }

    #[test]
    fn event_frame_carries_seq() {
        let frame = Frame::event("run.delta", json!({"runId": "run_1"}), 42);
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["type"], "event");
        assert_eq!(wire["event"], "run.delta");
        assert_eq!(wire["seq"], 42);
    }

    #[test]
    fn parse_inbound_event_frame() {
        let raw = r#"{"type":"event","event":"connect.challenge","payload":{"nonce":"n","ts":1},"seq":0}"#;
        let frame: Frame = serde_json::from_str(raw).unwrap();
        let Frame::Event { event, payload, seq } = frame else {
            panic!("expected event frame");
        };
        assert_eq!(event, CHALLENGE_EVENT);
        assert_eq!(seq, 0);
        let challenge: ConnectChallenge = serde_json::from_value(payload).unwrap();
        assert_eq!(challenge.nonce, "n");
        assert_eq!(challenge.ts, 1);
    }

    #[test]
    fn connect_params_camel_case_on_wire() {
        let params = ConnectParams {
            min_protocol: MIN_PROTOCOL_VERSION,
            max_protocol: MAX_PROTOCOL_VERSION,
            client: ClientInfo {
                id: "c1".into(),
                version: "0.1.0".into(),
                platform: "macos".into(),
                mode: "operator".into(),
            },
            role: "operator".into(),
            scopes: vec!["threads".into()],
            caps: vec![],
            auth: None,
            user_agent: "helm/0.1.0".into(),
            locale: "en-US".into(),
        };
        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["minProtocol"], 1);
        assert_eq!(wire["maxProtocol"], 1);
        assert_eq!(wire["userAgent"], "helm/0.1.0");
        assert!(wire.get("auth").is_none());
    }

    #[test]
    fn handshake_result_optional_features() {
        let raw = r#"{"protocol":1}"#;
        let result: HandshakeResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.protocol, 1);
        assert!(result.features.is_none());

        let raw = r#"{"protocol":1,"features":{"methods":["connect"],"events":["run.delta"]}}"#;
        let result: HandshakeResult = serde_json::from_str(raw).unwrap();
        let features = result.features.unwrap();
        assert_eq!(features.methods, vec!["connect"]);
        assert_eq!(features.events, vec!["run.delta"]);
    }
}
