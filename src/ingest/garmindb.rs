//! Fetch CLI Wrapper
//!
//! Authentication, token refresh and the actual tracker API calls live in the
//! external fetch CLI; this module only invokes it and parses its JSON stdout.
//! Invocations are retried with exponential backoff and jitter for retryable
//! error categories.

use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{GarminConfig, RetryConfig};
use crate::constants::{retry, subprocess};
use crate::types::{
    Activity, ErrorCategory, ErrorClassifier, FetchError, HrvSample, Result, TrainError,
};

/// Client for the external fetch CLI.
pub struct GarminDbClient {
    fetch_bin: String,
    retry: RetryConfig,
}

impl GarminDbClient {
    pub fn new(garmin: &GarminConfig, retry: &RetryConfig) -> Self {
        Self {
            fetch_bin: garmin.fetch_bin.clone(),
            retry: retry.clone(),
        }
    }

    /// Fetch activities. With `delta_only` the CLI is asked for only those
    /// newer than its own sync marker.
    pub async fn fetch_activities(&self, delta_only: bool) -> Result<Vec<Activity>> {
        let mut args = vec!["fetch", "activities"];
        if delta_only {
            args.push("--delta-only");
        }

        let stdout = self.run_with_retry(&args).await?;
        let activities = parse_activity_output(&stdout)?;
        info!(count = activities.len(), "Fetched activities");
        Ok(activities)
    }

    /// Fetch overnight HRV samples.
    pub async fn fetch_hrv(&self) -> Result<Vec<HrvSample>> {
        let stdout = self.run_with_retry(&["fetch", "hrv"]).await?;
        let samples = parse_hrv_output(&stdout)?;
        info!(count = samples.len(), "Fetched HRV samples");
        Ok(samples)
    }

    /// Check if the fetch CLI is available.
    pub async fn health_check(&self) -> Result<bool> {
        let output = Command::new(&self.fetch_bin)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                TrainError::Fetch(FetchError::with_source(
                    ErrorCategory::NotFound,
                    format!("{} not found: {}", self.fetch_bin, e),
                    self.fetch_bin.clone(),
                ))
            })?;

        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            info!("Fetch CLI available: {}", version.trim());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Run the CLI, retrying retryable failures with exponential backoff.
    async fn run_with_retry(&self, args: &[&str]) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.invoke_once(args).await {
                Ok(stdout) => return Ok(stdout),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Fetch attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Execute a single CLI invocation and return its stdout.
    async fn invoke_once(&self, args: &[&str]) -> Result<String> {
        debug!(bin = %self.fetch_bin, ?args, "Invoking fetch CLI");

        let child = Command::new(&self.fetch_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let category = if e.kind() == std::io::ErrorKind::NotFound {
                    ErrorCategory::NotFound
                } else {
                    ErrorCategory::Unknown
                };
                TrainError::Fetch(FetchError::with_source(
                    category,
                    format!("Failed to spawn {}: {}", self.fetch_bin, e),
                    self.fetch_bin.clone(),
                ))
            })?;

        let output = timeout(
            Duration::from_secs(subprocess::FETCH_TIMEOUT_SECS),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            TrainError::Fetch(
                FetchError::with_source(
                    ErrorCategory::Network,
                    format!(
                        "{} timed out after {}s",
                        self.fetch_bin,
                        subprocess::FETCH_TIMEOUT_SECS
                    ),
                    self.fetch_bin.clone(),
                ),
            )
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                "Process exited with non-zero status".to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ErrorClassifier::classify(&message, &self.fetch_bin).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Exponential backoff with optional jitter, capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.retry.base_delay_secs as f64
            * (retry::BACKOFF_FACTOR as f64).powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(retry::MAX_DELAY_SECS as f64);

        let secs = if self.retry.jitter {
            // jittered delays land in 50-100% of the nominal value
            capped * (0.5 + rand::rng().random_range(0.0..0.5))
        } else {
            capped
        };

        Duration::from_secs_f64(secs)
    }
}

/// Parse the CLI's activity output. Whitespace-only stdout means the CLI had
/// nothing new to report.
fn parse_activity_output(stdout: &str) -> Result<Vec<Activity>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| {
        FetchError::with_source(
            ErrorCategory::ParseError,
            format!("Bad activity JSON from fetch CLI: {}", e),
            "garmindb",
        )
        .into()
    })
}

/// Parse the CLI's HRV output.
fn parse_hrv_output(stdout: &str) -> Result<Vec<HrvSample>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| {
        FetchError::with_source(
            ErrorCategory::ParseError,
            format!("Bad HRV JSON from fetch CLI: {}", e),
            "garmindb",
        )
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(bin: &str, max_attempts: u32, jitter: bool) -> GarminDbClient {
        GarminDbClient::new(
            &GarminConfig {
                fetch_bin: bin.to_string(),
            },
            &RetryConfig {
                max_attempts,
                base_delay_secs: 1,
                jitter,
            },
        )
    }

    #[test]
    fn test_parse_activity_output() {
        let stdout = r#"[
            {"id": "a", "start_time": "2026-07-01T06:00:00Z", "tss": 40.0},
            {"id": "b", "start_time": "2026-07-02T06:00:00Z", "tss": 60.0}
        ]"#;
        let activities = parse_activity_output(stdout).unwrap();
        assert_eq!(activities.len(), 2);
    }

    #[test]
    fn test_parse_empty_output_is_no_activities() {
        assert!(parse_activity_output("").unwrap().is_empty());
        assert!(parse_activity_output("  \n").unwrap().is_empty());
        assert!(parse_hrv_output("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let err = parse_activity_output("not json").unwrap_err();
        match err {
            TrainError::Fetch(e) => assert_eq!(e.category, ErrorCategory::ParseError),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let client = client_with("garmindb", 5, false);

        let d1 = client.backoff_delay(1);
        let d2 = client.backoff_delay(2);
        let d3 = client.backoff_delay(3);
        assert!(d2 > d1);
        assert!(d3 > d2);

        // Far attempts are capped
        let d_far = client.backoff_delay(30);
        assert_eq!(d_far, Duration::from_secs(retry::MAX_DELAY_SECS));
    }

    #[test]
    fn test_backoff_jitter_stays_within_nominal() {
        let client = client_with("garmindb", 5, true);
        for _ in 0..50 {
            let d = client.backoff_delay(2);
            // Jitter picks 50-100% of the 2s nominal delay
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_secs(2));
        }
    }

    #[tokio::test]
    async fn test_missing_binary_fails_fast() {
        let client = client_with("trainloop-no-such-binary", 5, false);
        let err = client.fetch_activities(false).await.unwrap_err();
        match err {
            TrainError::Fetch(e) => assert_eq!(e.category, ErrorCategory::NotFound),
            other => panic!("unexpected error: {}", other),
        }
        // NotFound is non-retryable, so this returns without sleeping
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_classified() {
        let client = client_with("false", 1, false);
        let err = client.fetch_hrv().await.unwrap_err();
        assert!(matches!(err, TrainError::Fetch(_)));
    }
}
