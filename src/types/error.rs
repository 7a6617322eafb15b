//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Error categories drive retry decisions in the ingest and LLM layers.
//!
//! ## Error Categories
//!
//! - **Transient**: Temporary issues that may resolve (retry)
//! - **RateLimit**: API rate limiting (wait and retry)
//! - **Auth**: Authentication failures (fail fast)
//! - **Network**: Connectivity issues (retry with backoff)
//! - **NotFound**: External binary or resource missing (fail fast)

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Authentication failed - fail fast, don't retry
    Auth,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// External binary or resource missing - fail fast
    NotFound,
    /// Parsing external output failed - don't retry, same input yields same failure
    ParseError,
    /// Temporary issues - retry
    Transient,
    /// Unknown error - conservative retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Transient | Self::Unknown
        )
    }

    /// Get recommended retry delay for this category
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(30),
            Self::Network => Duration::from_secs(5),
            Self::Transient => Duration::from_secs(2),
            _ => Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Fetch Error
// =============================================================================

/// Error from an external fetch or push tool, with category and retry hints
#[derive(Debug, Clone)]
pub struct FetchError {
    /// Error category for retry decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Tool or provider that produced the error
    pub source_name: Option<String>,
    /// Suggested wait time before retry (if applicable)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(source) = &self.source_name {
            write!(f, "[{}:{}] {}", source, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create a new fetch error
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            source_name: None,
            retry_after: None,
        }
    }

    /// Create error with source-tool context
    pub fn with_source(
        category: ErrorCategory,
        message: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            source_name: Some(source_name.into()),
            retry_after: None,
        }
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Check if error is worth retrying
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    /// Get recommended retry delay
    pub fn recommended_delay(&self) -> Duration {
        self.retry_after
            .unwrap_or_else(|| self.category.recommended_delay())
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Error classifier for retry routing
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from an external tool
    pub fn classify(message: &str, source_name: &str) -> FetchError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return FetchError::with_source(ErrorCategory::RateLimit, message, source_name)
                .retry_after(Duration::from_secs(30));
        }

        if lower.contains("auth")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("login")
            || lower.contains("credential")
        {
            return FetchError::with_source(ErrorCategory::Auth, message, source_name);
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("unreachable")
        {
            return FetchError::with_source(ErrorCategory::Network, message, source_name)
                .retry_after(Duration::from_secs(5));
        }

        if lower.contains("no such file")
            || lower.contains("not found")
            || lower.contains("not installed")
        {
            return FetchError::with_source(ErrorCategory::NotFound, message, source_name);
        }

        if lower.contains("parse")
            || lower.contains("json")
            || lower.contains("syntax")
            || lower.contains("unexpected token")
        {
            return FetchError::with_source(ErrorCategory::ParseError, message, source_name);
        }

        if lower.contains("retry")
            || lower.contains("temporary")
            || lower.contains("overloaded")
            || lower.contains("non-zero status")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
        {
            return FetchError::with_source(ErrorCategory::Transient, message, source_name)
                .retry_after(Duration::from_secs(2));
        }

        FetchError::with_source(ErrorCategory::Unknown, message, source_name)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum TrainError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Patch error: {0}")]
    Patch(#[from] json_patch::PatchError),

    // -------------------------------------------------------------------------
    // External-System Errors
    // -------------------------------------------------------------------------
    /// Structured fetch/push error with category and retry hints
    #[error("Fetch error: {0}")]
    Fetch(FetchError),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Planner error: {0}")]
    Planner(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Not initialized: run 'trainloop init' first")]
    NotInitialized,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Revision rejected: {0}")]
    Revision(String),
}

impl From<FetchError> for TrainError {
    fn from(err: FetchError) -> Self {
        TrainError::Fetch(err)
    }
}

impl TrainError {
    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;

// =============================================================================
// Context Extension
// =============================================================================

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| TrainError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| TrainError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::Auth.to_string(), "AUTH");
        assert_eq!(ErrorCategory::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::ParseError.is_retryable());
        assert!(ErrorCategory::Unknown.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = ErrorClassifier::classify("Rate limit exceeded, please retry", "openai");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth() {
        let err = ErrorClassifier::classify("Garmin login failed: bad credentials", "garmindb");
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_network() {
        let err = ErrorClassifier::classify("Connection timed out after 30s", "garmindb");
        assert_eq!(err.category, ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_missing_binary() {
        let err = ErrorClassifier::classify("garmindb: command not found", "garmindb");
        assert_eq!(err.category, ErrorCategory::NotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_unknown() {
        let err = ErrorClassifier::classify("Something weird happened", "test");
        assert_eq!(err.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_recommended_delay() {
        let rate_limit = FetchError::new(ErrorCategory::RateLimit, "test");
        assert!(rate_limit.recommended_delay() >= Duration::from_secs(30));

        let custom =
            FetchError::new(ErrorCategory::Unknown, "test").retry_after(Duration::from_secs(100));
        assert_eq!(custom.recommended_delay(), Duration::from_secs(100));
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::with_source(ErrorCategory::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");

        let err_no_source = FetchError::new(ErrorCategory::Network, "Connection failed");
        assert_eq!(err_no_source.to_string(), "[NETWORK] Connection failed");
    }
}
