//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/trainloop/) and project (.trainloop/) level
//! configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{network, retry};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Analytics flag thresholds
    pub thresholds: ThresholdConfig,

    /// Retry/backoff for external tool invocations
    pub retry: RetryConfig,

    /// Cron schedules for the pipeline flows
    pub schedule: ScheduleConfig,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Guards applied to LLM-proposed plan revisions
    pub revision: RevisionConfig,

    /// External fetch CLI settings
    pub garmin: GarminConfig,

    /// External planner CLI settings
    pub planner: PlannerConfig,

    /// Athlete goals and constraints, surfaced to the LLM prompt
    pub goals: GoalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            thresholds: ThresholdConfig::default(),
            retry: RetryConfig::default(),
            schedule: ScheduleConfig::default(),
            llm: LlmConfig::default(),
            revision: RevisionConfig::default(),
            garmin: GarminConfig::default(),
            planner: PlannerConfig::default(),
            goals: GoalConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `TrainError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(crate::types::TrainError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(crate::types::TrainError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(crate::types::TrainError::Config(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.revision.max_volume_change) {
            return Err(crate::types::TrainError::Config(format!(
                "revision.max_volume_change must be between 0.0 and 1.0, got {}",
                self.revision.max_volume_change
            )));
        }

        for (name, expr) in [
            ("schedule.sync_daily", &self.schedule.sync_daily),
            ("schedule.sync_catchup", &self.schedule.sync_catchup),
            ("schedule.adapt_weekly", &self.schedule.adapt_weekly),
        ] {
            crate::pipeline::scheduler::parse_cron(expr).map_err(|e| {
                crate::types::TrainError::Config(format!(
                    "{} is not a valid cron string: {}",
                    name, e
                ))
            })?;
        }

        Ok(())
    }
}

// =============================================================================
// Thresholds
// =============================================================================

/// Thresholds for flag evaluation.
///
/// Units: `ctl_atl_ratio_max` is a plain ratio, `hrv_drop_zscore` is in
/// standard deviations, `tsb_min` in TSS points, `ramp_max` a weekly growth
/// fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub ctl_atl_ratio_max: f64,
    pub hrv_drop_zscore: f64,
    pub tsb_min: f64,
    pub ramp_max: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            ctl_atl_ratio_max: 1.3,
            hrv_drop_zscore: -1.0,
            tsb_min: -10.0,
            ramp_max: 0.10,
        }
    }
}

// =============================================================================
// Retry
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per external invocation
    pub max_attempts: u32,
    /// Base delay for exponential backoff (seconds)
    pub base_delay_secs: u64,
    /// Add random jitter to backoff delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: retry::DEFAULT_BASE_DELAY_SECS,
            jitter: true,
        }
    }
}

// =============================================================================
// Schedule
// =============================================================================

/// Five-field cron strings (minute hour day-of-month month day-of-week).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub sync_daily: String,
    pub sync_catchup: String,
    pub adapt_weekly: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sync_daily: "0 1 * * *".to_string(),
            sync_catchup: "0 10 * * *".to_string(),
            adapt_weekly: "0 17 * * SUN".to_string(),
        }
    }
}

// =============================================================================
// LLM
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type (currently only "openai")
    pub provider: String,
    /// Model name (provider-specific)
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Temperature for generation (0.0 = deterministic)
    pub temperature: f32,
    /// API key; falls back to OPENAI_API_KEY env var.
    /// Never serialized to output for security.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.0,
            api_key: None,
            api_base: None,
            max_tokens: 4096,
        }
    }
}

// =============================================================================
// Revision Guards
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    /// Maximum allowed relative change in scheduled workout count per revision
    pub max_volume_change: f64,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            max_volume_change: 0.20,
        }
    }
}

// =============================================================================
// External Tools
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GarminConfig {
    /// Name or path of the external fetch CLI
    pub fetch_bin: String,
}

impl Default for GarminConfig {
    fn default() -> Self {
        Self {
            fetch_bin: "garmindb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Name or path of the external planner push CLI
    pub push_bin: String,
    /// Directory holding current/pending plan YAML files
    pub plan_dir: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            push_bin: "garmin-planner".to_string(),
            plan_dir: "plans".to_string(),
        }
    }
}

// =============================================================================
// Goals
// =============================================================================

/// Athlete goals and availability constraints. All optional; when present
/// they are embedded into the revision prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    /// Goal date in YYYY-MM-DD format
    pub goal_date: Option<String>,
    /// Goal distance or event type
    pub goal_type: Option<String>,
    /// Weekdays available for training
    pub available_weekdays: Vec<String>,
    /// Dates that must stay workout-free (YYYY-MM-DD)
    pub blocked_dates: Vec<String>,
}
