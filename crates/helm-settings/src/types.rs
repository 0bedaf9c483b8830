//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so partial JSON deep-merges cleanly over compiled defaults.

use helm_core::BackoffPolicy;
use serde::{Deserialize, Serialize};

/// Root settings type for the Helm console core.
///
/// Loaded from `~/.helm/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelmSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Gateway connection settings.
    pub gateway: GatewaySettings,
    /// Pipeline orchestration settings.
    pub pipeline: PipelineSettings,
    /// Fan-out / sync settings.
    pub sync: SyncSettings,
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "helm".to_string(),
            gateway: GatewaySettings::default(),
            pipeline: PipelineSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

/// Gateway connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Per-call response deadline in ms.
    pub request_timeout_ms: u64,
    /// Reconnect backoff policy.
    pub reconnect: BackoffPolicy,
    /// Role requested in the handshake.
    pub role: String,
    /// Scopes requested in the handshake.
    pub scopes: Vec<String>,
    /// BCP-47 locale sent in the handshake.
    pub locale: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            reconnect: BackoffPolicy::default(),
            role: "operator".to_string(),
            scopes: vec!["threads".to_string(), "runs".to_string()],
            locale: "en-US".to_string(),
        }
    }
}

/// Pipeline orchestration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Per-stage execution deadline in ms.
    pub stage_timeout_ms: u64,
    /// Maximum review-reject retries before the pipeline stalls.
    pub max_review_retries: u32,
    /// Name of the review stage.
    pub review_stage: String,
    /// Stage a review rejection rewinds to.
    pub implement_stage: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout_ms: 600_000,
            max_review_retries: 2,
            review_stage: "review".to_string(),
            implement_stage: "implement".to_string(),
        }
    }
}

/// Fan-out / sync settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Per-observer delivery channel capacity.
    pub observer_channel_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            observer_channel_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_constants() {
        let settings = HelmSettings::default();
        assert_eq!(settings.gateway.request_timeout_ms, 30_000);
        assert_eq!(settings.gateway.reconnect.max_attempts, 10);
        assert_eq!(settings.pipeline.stage_timeout_ms, 600_000);
        assert_eq!(settings.pipeline.max_review_retries, 2);
        assert_eq!(settings.pipeline.review_stage, "review");
        assert_eq!(settings.pipeline.implement_stage, "implement");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let raw = r#"{"gateway": {"requestTimeoutMs": 5000}}"#;
        let settings: HelmSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.gateway.request_timeout_ms, 5_000);
        assert_eq!(settings.gateway.role, "operator");
        assert_eq!(settings.pipeline.max_review_retries, 2);
    }

    #[test]
    fn round_trip_preserves_values() {
        let mut settings = HelmSettings::default();
        settings.pipeline.stage_timeout_ms = 1_000;
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: HelmSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.pipeline.stage_timeout_ms, 1_000);
    }
}
