//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Training-load analytics constants
pub mod analytics {
    /// Chronic training load EMA span (days)
    pub const CTL_SPAN_DAYS: u32 = 42;

    /// Acute training load EMA span (days)
    pub const ATL_SPAN_DAYS: u32 = 7;

    /// Rolling window for the HRV baseline (samples, one per night)
    pub const HRV_BASELINE_WINDOW: usize = 30;

    /// Lookback used to compute the weekly CTL ramp (days)
    pub const RAMP_LOOKBACK_DAYS: i64 = 7;

    /// How much history to feed the EMAs (days); beyond this the
    /// contribution of a 42-day span sample is negligible
    pub const LOAD_HISTORY_DAYS: i64 = 180;
}

/// Retry/backoff constants for external tool invocations
pub mod retry {
    /// Default maximum attempts per fetch
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Base delay for exponential backoff (seconds)
    pub const DEFAULT_BASE_DELAY_SECS: u64 = 2;

    /// Maximum delay between attempts (seconds)
    pub const MAX_DELAY_SECS: u64 = 60;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;
}

/// Subprocess constants
pub mod subprocess {
    /// Timeout for a fetch CLI invocation (seconds)
    pub const FETCH_TIMEOUT_SECS: u64 = 600;

    /// Timeout for a planner push (seconds)
    pub const PUSH_TIMEOUT_SECS: u64 = 120;
}

/// HTTP/Network constants
pub mod network {
    /// Default LLM request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
}

/// Planner constants
pub mod planner {
    /// File name of the locally cached, last-pushed plan
    pub const CURRENT_PLAN_FILE: &str = "current_plan.yaml";

    /// File name of the patched plan awaiting push
    pub const PENDING_PLAN_FILE: &str = "pending_plan.yaml";

    /// Additional attempts for the push subprocess after the first failure
    pub const PUSH_RETRIES: u32 = 1;
}
