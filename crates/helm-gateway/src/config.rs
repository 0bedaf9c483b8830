//! Gateway client configuration.

use std::time::Duration;

use helm_core::BackoffPolicy;
use helm_core::frames::ClientInfo;
use helm_core::ids;

/// Configuration for a [`crate::GatewayClient`].
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Per-call response deadline in ms.
    pub request_timeout_ms: u64,
    /// Reconnect backoff policy.
    pub reconnect: BackoffPolicy,
    /// Client identity sent in the handshake.
    pub client: ClientInfo,
    /// Role requested in the handshake.
    pub role: String,
    /// Scopes requested in the handshake.
    pub scopes: Vec<String>,
    /// Capabilities advertised in the handshake.
    pub caps: Vec<String>,
    /// User-agent string sent in the handshake.
    pub user_agent: String,
    /// BCP-47 locale sent in the handshake.
    pub locale: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            request_timeout_ms: 30_000,
            reconnect: BackoffPolicy::default(),
            client: ClientInfo {
                id: ids::client_id(),
                version: version.clone(),
                platform: std::env::consts::OS.to_string(),
                mode: "operator".to_string(),
            },
            role: "operator".to_string(),
            scopes: vec!["threads".to_string(), "runs".to_string()],
            caps: vec![],
            user_agent: format!("helm/{version}"),
            locale: "en-US".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Build a config from loaded settings, generating a fresh client id.
    pub fn from_settings(settings: &helm_settings::GatewaySettings) -> Self {
        Self {
            request_timeout_ms: settings.request_timeout_ms,
            reconnect: settings.reconnect.clone(),
            role: settings.role.clone(),
            scopes: settings.scopes.clone(),
            locale: settings.locale.clone(),
            ..Self::default()
        }
    }

    /// Per-call response deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
