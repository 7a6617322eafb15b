//! Pipeline Flows
//!
//! The three orchestration flows of the training pipeline:
//!
//! - **sync**: fetch recent data from the tracker and update storage
//! - **catch-up sync**: same, delta-only, to backfill missed runs
//! - **adapt**: compute metrics, evaluate flags and, when warranted, have the
//!   LLM propose a plan revision that is applied and pushed
//!
//! Every flow is a linear sequence over external systems; failures are logged
//! and the next scheduled run redoes the work.

pub mod scheduler;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::ai::{SharedProvider, build_revision_prompt, create_provider, parse_revision, revision_schema};
use crate::analytics::{FlagSet, MetricsReport, compute_hrv_zscore, compute_load_metrics, evaluate_flags};
use crate::config::Config;
use crate::constants::analytics::LOAD_HISTORY_DAYS;
use crate::ingest::GarminDbClient;
use crate::planner::Planner;
use crate::storage::SharedDatabase;
use crate::types::Result;

/// Shared state handed to every flow.
pub struct PipelineContext {
    pub config: Config,
    pub db: SharedDatabase,
}

impl PipelineContext {
    pub fn new(config: Config, db: SharedDatabase) -> Self {
        Self { config, db }
    }

    fn client(&self) -> GarminDbClient {
        GarminDbClient::new(&self.config.garmin, &self.config.retry)
    }

    fn planner(&self) -> Planner {
        Planner::new(&self.config.planner)
    }
}

/// What a sync run ingested.
#[derive(Debug, Clone, Copy)]
pub struct SyncSummary {
    pub activities: usize,
    pub hrv_samples: usize,
}

/// What an adapt run computed and did.
#[derive(Debug, Clone)]
pub struct AdaptSummary {
    pub report: MetricsReport,
    pub flags: FlagSet,
    /// Revision outcome label, absent when no flags were raised
    pub outcome: Option<String>,
}

// =============================================================================
// Sync Flow
// =============================================================================

/// Fetch activities and HRV from the tracker and store them.
///
/// With `delta_only` the fetch CLI is asked for only data newer than its own
/// sync marker (the catch-up flow).
pub async fn sync(ctx: &PipelineContext, delta_only: bool) -> Result<SyncSummary> {
    let kind = if delta_only { "catchup" } else { "daily" };
    info!(kind, "Running sync flow");

    let client = ctx.client();
    let activities = client.fetch_activities(delta_only).await?;
    let hrv_samples = client.fetch_hrv().await?;

    let stored_activities = ctx.db.upsert_activities(&activities)?;
    let stored_hrv = ctx.db.upsert_hrv(&hrv_samples)?;

    ctx.db.record_sync_run(kind, stored_activities, stored_hrv)?;
    info!(
        kind,
        activities = stored_activities,
        hrv = stored_hrv,
        "Sync flow complete"
    );

    Ok(SyncSummary {
        activities: stored_activities,
        hrv_samples: stored_hrv,
    })
}

// =============================================================================
// Adapt Flow
// =============================================================================

/// Analyze training load and, when flags are raised, revise and push the plan.
///
/// `provider` may be supplied for testing; by default one is created from the
/// config, and only once flags are actually raised, so an unconfigured LLM
/// never blocks a healthy week.
pub async fn adapt(
    ctx: &PipelineContext,
    provider: Option<SharedProvider>,
    dry_run: bool,
) -> Result<AdaptSummary> {
    info!("Running adapt flow");

    let report = compute_report(ctx)?;
    let flags = evaluate_flags(&report, &ctx.config.thresholds);
    alert(&report, &flags);

    if !flags.any() {
        info!("No flags raised, no plan revision needed");
        return Ok(AdaptSummary {
            report,
            flags,
            outcome: None,
        });
    }

    info!(raised = ?flags.raised(), "Flags raised, proposing revision");
    let flags_json = serde_json::to_string(&flags)?;

    let outcome = match propose_and_push(ctx, provider, &report, &flags, dry_run).await {
        Ok((outcome_label, patch_json)) => {
            ctx.db
                .record_revision(&flags_json, patch_json.as_deref(), &outcome_label)?;
            outcome_label
        }
        Err(e) => {
            // Fail-open: the revision is abandoned, prior state stands
            warn!(error = %e, "Plan revision abandoned");
            let label = "failed_llm".to_string();
            ctx.db.record_revision(&flags_json, None, &label)?;
            label
        }
    };

    Ok(AdaptSummary {
        report,
        flags,
        outcome: Some(outcome),
    })
}

/// Compute the metrics report from stored history.
pub fn compute_report(ctx: &PipelineContext) -> Result<MetricsReport> {
    let cutoff = Utc::now() - Duration::days(LOAD_HISTORY_DAYS);
    let activities = ctx.db.load_activities_since(cutoff)?;
    let hrv = ctx
        .db
        .load_hrv_since((Utc::now() - Duration::days(LOAD_HISTORY_DAYS)).date_naive())?;

    let load = compute_load_metrics(&activities);
    let hrv_zscore = compute_hrv_zscore(&hrv);

    info!(
        ctl = load.ctl,
        atl = load.atl,
        tsb = load.tsb,
        hrv_zscore,
        "Computed training-load metrics"
    );

    Ok(MetricsReport { load, hrv_zscore })
}

async fn propose_and_push(
    ctx: &PipelineContext,
    provider: Option<SharedProvider>,
    report: &MetricsReport,
    flags: &FlagSet,
    dry_run: bool,
) -> Result<(String, Option<String>)> {
    let planner = ctx.planner();
    let plan_yaml = planner.load_current_plan_yaml()?;

    let provider = match provider {
        Some(p) => p,
        None => create_provider(&ctx.config.llm)?,
    };

    let prompt = build_revision_prompt(&plan_yaml, flags, report, &ctx.config.goals);
    let response = provider.generate(&prompt, &revision_schema()).await?;
    info!(
        provider = provider.name(),
        model = provider.model(),
        tokens = response.usage.total(),
        "LLM proposed a revision"
    );

    let revision = parse_revision(&response.content)?;
    let patch_json = revision.to_json()?;

    let outcome = planner
        .patch_and_push(&revision, ctx.config.revision.max_volume_change, dry_run)
        .await;

    Ok((outcome.as_str().to_string(), Some(patch_json)))
}

// =============================================================================
// Alerting
// =============================================================================

/// Structured alert event. Warn-level when any flag is raised so operators
/// can route on severity alone; external alerting channels are out of scope.
pub fn alert(report: &MetricsReport, flags: &FlagSet) {
    if flags.any() {
        warn!(
            ctl = report.load.ctl,
            atl = report.load.atl,
            tsb = report.load.tsb,
            ramp = report.load.ramp,
            hrv_zscore = report.hrv_zscore,
            flags = ?flags.raised(),
            "Training-load alert condition"
        );
    } else {
        info!(
            ctl = report.load.ctl,
            atl = report.load.atl,
            tsb = report.load.tsb,
            "Training load nominal"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
