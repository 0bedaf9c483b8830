//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-stage wall-clock timeout: 10 minutes.
pub const DEFAULT_STAGE_TIMEOUT_MS: u64 = 600_000;

/// Default bound on review-reject loops.
pub const DEFAULT_MAX_REVIEW_RETRIES: u32 = 2;

/// Configuration for one pipeline instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// The template this pipeline was created from.
    pub template_id: String,
    /// Enabled stages, in execution order.
    pub stages: Vec<String>,
    /// Wall-clock budget per stage execution, in ms.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    /// How many times a review rejection rewinds to implementation.
    #[serde(default = "default_max_review_retries")]
    pub max_review_retries: u32,
    /// Name of the review stage.
    #[serde(default = "default_review_stage")]
    pub review_stage: String,
    /// Name of the stage review rejections rewind to.
    #[serde(default = "default_implement_stage")]
    pub implement_stage: String,
}

fn default_stage_timeout_ms() -> u64 {
    DEFAULT_STAGE_TIMEOUT_MS
}

fn default_max_review_retries() -> u32 {
    DEFAULT_MAX_REVIEW_RETRIES
}

fn default_review_stage() -> String {
    "review".to_string()
}

fn default_implement_stage() -> String {
    "implement".to_string()
}

impl PipelineConfig {
    /// Build a config with default policy values.
    pub fn new(template_id: impl Into<String>, stages: Vec<String>) -> Self {
        Self {
            template_id: template_id.into(),
            stages,
            stage_timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
            max_review_retries: DEFAULT_MAX_REVIEW_RETRIES,
            review_stage: default_review_stage(),
            implement_stage: default_implement_stage(),
        }
    }

    /// Build a config carrying policy values from loaded settings.
    pub fn from_settings(
        settings: &helm_settings::PipelineSettings,
        template_id: impl Into<String>,
        stages: Vec<String>,
    ) -> Self {
        Self {
            template_id: template_id.into(),
            stages,
            stage_timeout_ms: settings.stage_timeout_ms,
            max_review_retries: settings.max_review_retries,
            review_stage: settings.review_stage.clone(),
            implement_stage: settings.implement_stage.clone(),
        }
    }

    /// Per-stage wall-clock budget.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }
}
