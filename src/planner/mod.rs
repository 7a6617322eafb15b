//! Planner Interface
//!
//! Applies an LLM-proposed RFC 6902 revision to the locally cached plan and
//! pushes the result through the external planner CLI.
//!
//! The whole sequence is fail-open: any failure is logged, reported through
//! [`PushOutcome`], and leaves previously persisted state untouched. The next
//! scheduled adapt run starts from the same cached plan.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::ai::PlanRevision;
use crate::config::PlannerConfig;
use crate::constants::{planner as planner_constants, subprocess};
use crate::types::{Result, TrainError};

/// Where the patch-apply-and-push sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Plan patched, pushed and promoted to the local cache
    Succeeded,
    /// Plan patched and written, push skipped on request
    DryRun,
    /// The revision contained no operations; nothing to do
    EmptyRevision,
    /// Loading the cached plan failed
    FailedLoad,
    /// Applying the patch failed
    FailedPatch,
    /// The revision changed scheduled volume beyond the configured cap
    FailedGuard,
    /// Writing the patched plan failed
    FailedWrite,
    /// The push subprocess failed
    FailedPush,
}

impl PushOutcome {
    /// Stable label stored in the revision log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::DryRun => "dry_run",
            Self::EmptyRevision => "empty_revision",
            Self::FailedLoad => "failed_load",
            Self::FailedPatch => "failed_patch",
            Self::FailedGuard => "failed_guard",
            Self::FailedWrite => "failed_write",
            Self::FailedPush => "failed_push",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::DryRun | Self::EmptyRevision)
    }
}

impl std::fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planner CLI wrapper and plan-file cache.
pub struct Planner {
    push_bin: String,
    plan_dir: PathBuf,
}

impl Planner {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            push_bin: config.push_bin.clone(),
            plan_dir: PathBuf::from(&config.plan_dir),
        }
    }

    /// Path of the locally cached, last-pushed plan.
    pub fn current_plan_path(&self) -> PathBuf {
        self.plan_dir.join(planner_constants::CURRENT_PLAN_FILE)
    }

    /// Path of the patched plan awaiting push.
    pub fn pending_plan_path(&self) -> PathBuf {
        self.plan_dir.join(planner_constants::PENDING_PLAN_FILE)
    }

    /// Load the cached plan as a JSON value. A missing file yields an empty
    /// mapping so a first revision can still build up a plan.
    pub fn load_current_plan(&self) -> Result<Value> {
        let path = self.current_plan_path();
        if !path.exists() {
            debug!("No cached plan at {}, starting empty", path.display());
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let raw = std::fs::read_to_string(&path)?;
        let plan: Value = serde_yaml::from_str(&raw)?;
        if plan.is_null() {
            // An empty file parses to null; treat it like a missing plan
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Ok(plan)
    }

    /// Raw YAML of the cached plan, for embedding into the LLM prompt.
    pub fn load_current_plan_yaml(&self) -> Result<String> {
        let path = self.current_plan_path();
        if !path.exists() {
            return Ok("{}\n".to_string());
        }
        Ok(std::fs::read_to_string(&path)?)
    }

    /// Apply the revision to the cached plan, write it, and push it.
    ///
    /// Fail-open: never returns an error. Each failure is logged and mapped
    /// to the [`PushOutcome`] naming the step that stopped the sequence.
    pub async fn patch_and_push(
        &self,
        revision: &PlanRevision,
        max_volume_change: f64,
        dry_run: bool,
    ) -> PushOutcome {
        if revision.is_empty() {
            info!("Revision is empty, nothing to push");
            return PushOutcome::EmptyRevision;
        }

        // Step 1: load the cached plan
        let current = match self.load_current_plan() {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Failed to load cached plan, abandoning push");
                return PushOutcome::FailedLoad;
            }
        };

        // Step 2: apply the patch
        let patched = match apply_revision(&current, revision) {
            Ok(patched) => patched,
            Err(e) => {
                warn!(error = %e, ops = revision.len(), "Patch application failed, abandoning push");
                return PushOutcome::FailedPatch;
            }
        };
        info!(ops = revision.len(), "Applied revision to plan");

        // Step 3: volume guard
        if let Err(e) = check_volume_guard(&current, &patched, max_volume_change) {
            warn!(error = %e, "Revision rejected by volume guard, abandoning push");
            return PushOutcome::FailedGuard;
        }

        // Step 4: write the pending plan
        let pending_path = self.pending_plan_path();
        if let Err(e) = self.write_plan(&pending_path, &patched) {
            warn!(error = %e, path = %pending_path.display(), "Failed to write pending plan");
            return PushOutcome::FailedWrite;
        }
        info!(path = %pending_path.display(), "Wrote pending plan");

        if dry_run {
            info!("Dry run: skipping push");
            return PushOutcome::DryRun;
        }

        // Step 5: push, then promote the pending plan to current
        if let Err(e) = self.push_plan(&pending_path).await {
            warn!(error = %e, "Planner push failed, local cache left untouched");
            return PushOutcome::FailedPush;
        }

        if let Err(e) = std::fs::copy(&pending_path, self.current_plan_path()) {
            // The push went through; a stale cache heals on the next cycle
            warn!(error = %e, "Failed to update local plan cache after push");
        } else {
            info!(path = %self.current_plan_path().display(), "Updated local plan cache");
        }

        PushOutcome::Succeeded
    }

    fn write_plan(&self, path: &Path, plan: &Value) -> Result<()> {
        std::fs::create_dir_all(&self.plan_dir)?;
        let yaml = serde_yaml::to_string(plan)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Invoke the push CLI, retrying once on failure.
    async fn push_plan(&self, plan_path: &Path) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..=planner_constants::PUSH_RETRIES {
            match self.invoke_push(plan_path).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt < planner_constants::PUSH_RETRIES {
                        warn!(attempt = attempt + 1, error = %e, "Push failed, retrying once");
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TrainError::Planner("push failed".to_string())))
    }

    async fn invoke_push(&self, plan_path: &Path) -> Result<()> {
        debug!(bin = %self.push_bin, plan = %plan_path.display(), "Invoking planner push");

        let child = Command::new(&self.push_bin)
            .arg("push")
            .arg("--plan")
            .arg(plan_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TrainError::Planner(format!("Failed to spawn {}: {}", self.push_bin, e))
            })?;

        let output = timeout(
            Duration::from_secs(subprocess::PUSH_TIMEOUT_SECS),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            TrainError::Planner(format!(
                "{} timed out after {}s",
                self.push_bin,
                subprocess::PUSH_TIMEOUT_SECS
            ))
        })?
        .map_err(|e| TrainError::Planner(format!("{} execution failed: {}", self.push_bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                "process exited with non-zero status".to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(TrainError::Planner(format!(
                "{} push failed: {}",
                self.push_bin, message
            )));
        }

        // stderr may carry warnings even on success
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("Planner push warnings: {}", stderr.trim());
        }

        Ok(())
    }
}

/// Apply the revision to a copy of the plan.
fn apply_revision(plan: &Value, revision: &PlanRevision) -> Result<Value> {
    let patch = revision.to_patch()?;
    let mut patched = plan.clone();
    json_patch::patch(&mut patched, &patch)?;
    Ok(patched)
}

/// Reject revisions that move scheduled volume more than the configured cap.
///
/// Volume is the length of the `schedulePlan.workouts` list; plans without
/// one are not guarded.
fn check_volume_guard(original: &Value, patched: &Value, max_change: f64) -> Result<()> {
    let before = scheduled_workout_count(original);
    let after = scheduled_workout_count(patched);

    let (Some(before), Some(after)) = (before, after) else {
        return Ok(());
    };
    if before == 0 {
        return Ok(());
    }

    let change = (after as f64 - before as f64).abs() / before as f64;
    if change > max_change {
        return Err(TrainError::Revision(format!(
            "scheduled workouts changed {} -> {} ({:.0}% > {:.0}% cap)",
            before,
            after,
            change * 100.0,
            max_change * 100.0
        )));
    }

    Ok(())
}

fn scheduled_workout_count(plan: &Value) -> Option<usize> {
    plan.get("schedulePlan")?
        .get("workouts")?
        .as_array()
        .map(|w| w.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::parse_revision;
    use serde_json::json;
    use tempfile::TempDir;

    fn planner_in(dir: &TempDir, push_bin: &str) -> Planner {
        Planner::new(&PlannerConfig {
            push_bin: push_bin.to_string(),
            plan_dir: dir.path().join("plans").to_string_lossy().into_owned(),
        })
    }

    fn write_current_plan(planner: &Planner, yaml: &str) {
        std::fs::create_dir_all(planner.current_plan_path().parent().unwrap()).unwrap();
        std::fs::write(planner.current_plan_path(), yaml).unwrap();
    }

    fn revision(ops: serde_json::Value) -> PlanRevision {
        parse_revision(&json!({ "revision": ops })).unwrap()
    }

    const PLAN_YAML: &str = r#"
definitions:
  GA: 6:35-7:00
schedulePlan:
  start_from: 2026-10-08
  workouts:
    - interval_vo2max
    - ga_10k
    - rest
    - long_run
    - rest
"#;

    #[test]
    fn test_load_missing_plan_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        let planner = planner_in(&dir, "true");
        let plan = planner.load_current_plan().unwrap();
        assert_eq!(plan, json!({}));
    }

    #[test]
    fn test_apply_revision_replaces_value() {
        let plan = json!({ "volume": 40, "workouts": ["a", "b"] });
        let rev = revision(json!([{ "op": "replace", "path": "/volume", "value": 32 }]));

        let patched = apply_revision(&plan, &rev).unwrap();
        assert_eq!(patched["volume"], 32);
        // Original untouched
        assert_eq!(plan["volume"], 40);
    }

    #[test]
    fn test_apply_revision_bad_path_fails() {
        let plan = json!({ "volume": 40 });
        let rev = revision(json!([{ "op": "replace", "path": "/missing/deep", "value": 1 }]));
        assert!(apply_revision(&plan, &rev).is_err());
    }

    #[test]
    fn test_volume_guard_allows_small_change() {
        let original: Value = serde_yaml::from_str(PLAN_YAML).unwrap();
        let rev = revision(json!([{ "op": "remove", "path": "/schedulePlan/workouts/0" }]));
        let patched = apply_revision(&original, &rev).unwrap();

        // 5 -> 4 is a 20% change, exactly at the default cap
        assert!(check_volume_guard(&original, &patched, 0.20).is_ok());
    }

    #[test]
    fn test_volume_guard_rejects_large_cut() {
        let original: Value = serde_yaml::from_str(PLAN_YAML).unwrap();
        let rev = revision(json!([
            { "op": "remove", "path": "/schedulePlan/workouts/0" },
            { "op": "remove", "path": "/schedulePlan/workouts/0" },
            { "op": "remove", "path": "/schedulePlan/workouts/0" }
        ]));
        let patched = apply_revision(&original, &rev).unwrap();

        // 5 -> 2 is a 60% change
        assert!(check_volume_guard(&original, &patched, 0.20).is_err());
    }

    #[test]
    fn test_volume_guard_skips_plans_without_schedule() {
        let original = json!({ "notes": [] });
        let patched = json!({ "notes": ["x"] });
        assert!(check_volume_guard(&original, &patched, 0.20).is_ok());
    }

    #[tokio::test]
    async fn test_empty_revision_short_circuits() {
        let dir = TempDir::new().unwrap();
        let planner = planner_in(&dir, "true");

        let outcome = planner
            .patch_and_push(&PlanRevision::default(), 0.20, false)
            .await;
        assert_eq!(outcome, PushOutcome::EmptyRevision);
        assert!(!planner.pending_plan_path().exists());
    }

    #[tokio::test]
    async fn test_patch_and_push_success_promotes_plan() {
        let dir = TempDir::new().unwrap();
        let planner = planner_in(&dir, "true");
        write_current_plan(&planner, PLAN_YAML);

        let rev = revision(json!([
            { "op": "replace", "path": "/schedulePlan/workouts/0", "value": "rest" }
        ]));
        let outcome = planner.patch_and_push(&rev, 0.20, false).await;
        assert_eq!(outcome, PushOutcome::Succeeded);

        let current = planner.load_current_plan().unwrap();
        assert_eq!(current["schedulePlan"]["workouts"][0], "rest");
    }

    #[tokio::test]
    async fn test_failed_push_leaves_cache_untouched() {
        let dir = TempDir::new().unwrap();
        let planner = planner_in(&dir, "false");
        write_current_plan(&planner, PLAN_YAML);

        let rev = revision(json!([
            { "op": "replace", "path": "/schedulePlan/workouts/0", "value": "rest" }
        ]));
        let outcome = planner.patch_and_push(&rev, 0.20, false).await;
        assert_eq!(outcome, PushOutcome::FailedPush);
        assert!(!outcome.is_success());

        // The cached plan still has the original first workout
        let current = planner.load_current_plan().unwrap();
        assert_eq!(current["schedulePlan"]["workouts"][0], "interval_vo2max");
    }

    #[tokio::test]
    async fn test_bad_patch_reports_failed_patch() {
        let dir = TempDir::new().unwrap();
        let planner = planner_in(&dir, "true");
        write_current_plan(&planner, PLAN_YAML);

        let rev = revision(json!([
            { "op": "replace", "path": "/nonexistent/path", "value": 1 }
        ]));
        let outcome = planner.patch_and_push(&rev, 0.20, false).await;
        assert_eq!(outcome, PushOutcome::FailedPatch);
    }

    #[tokio::test]
    async fn test_guard_rejection_reports_failed_guard() {
        let dir = TempDir::new().unwrap();
        let planner = planner_in(&dir, "true");
        write_current_plan(&planner, PLAN_YAML);

        let rev = revision(json!([
            { "op": "remove", "path": "/schedulePlan/workouts/0" },
            { "op": "remove", "path": "/schedulePlan/workouts/0" },
            { "op": "remove", "path": "/schedulePlan/workouts/0" }
        ]));
        let outcome = planner.patch_and_push(&rev, 0.20, false).await;
        assert_eq!(outcome, PushOutcome::FailedGuard);
    }

    #[tokio::test]
    async fn test_dry_run_writes_pending_but_not_current() {
        let dir = TempDir::new().unwrap();
        let planner = planner_in(&dir, "false"); // would fail if pushed
        write_current_plan(&planner, PLAN_YAML);

        let rev = revision(json!([
            { "op": "replace", "path": "/schedulePlan/workouts/0", "value": "rest" }
        ]));
        let outcome = planner.patch_and_push(&rev, 0.20, true).await;
        assert_eq!(outcome, PushOutcome::DryRun);
        assert!(outcome.is_success());

        assert!(planner.pending_plan_path().exists());
        let current = planner.load_current_plan().unwrap();
        assert_eq!(current["schedulePlan"]["workouts"][0], "interval_vo2max");
    }
}
