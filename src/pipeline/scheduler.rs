//! Flow Scheduler
//!
//! Cron-driven loop around the pipeline flows. Expression parsing and
//! next-fire computation are delegated to the `cron` crate; this module only
//! sleeps until the earliest fire time, runs the flow, and keeps going.
//!
//! All times are UTC. Config uses five-field cron strings; a seconds field is
//! prepended before handing them to the parser.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{error, info};

use super::{PipelineContext, adapt, sync};
use crate::types::{Result, TrainError};

/// Which flow a schedule entry triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    SyncDaily,
    SyncCatchup,
    AdaptWeekly,
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SyncDaily => write!(f, "sync_daily"),
            Self::SyncCatchup => write!(f, "sync_catchup"),
            Self::AdaptWeekly => write!(f, "adapt_weekly"),
        }
    }
}

/// Parse a cron string, accepting the five-field form used in config.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let fields = expr.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalized)
        .map_err(|e| TrainError::Config(format!("Invalid cron expression '{}': {}", expr, e)))
}

struct Job {
    kind: FlowKind,
    schedule: Schedule,
}

impl Job {
    fn next_fire(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }
}

/// Run the scheduler loop until Ctrl-C.
///
/// A failed flow is logged and the loop continues; the next fire of the same
/// schedule redoes the work.
pub async fn run(ctx: PipelineContext) -> Result<()> {
    let jobs = vec![
        Job {
            kind: FlowKind::SyncDaily,
            schedule: parse_cron(&ctx.config.schedule.sync_daily)?,
        },
        Job {
            kind: FlowKind::SyncCatchup,
            schedule: parse_cron(&ctx.config.schedule.sync_catchup)?,
        },
        Job {
            kind: FlowKind::AdaptWeekly,
            schedule: parse_cron(&ctx.config.schedule.adapt_weekly)?,
        },
    ];

    info!(
        sync_daily = %ctx.config.schedule.sync_daily,
        sync_catchup = %ctx.config.schedule.sync_catchup,
        adapt_weekly = %ctx.config.schedule.adapt_weekly,
        "Scheduler started (UTC)"
    );

    loop {
        let now = Utc::now();
        let next = jobs
            .iter()
            .filter_map(|job| job.next_fire(&now).map(|at| (at, job.kind)))
            .min_by_key(|(at, _)| *at);

        let Some((fire_at, kind)) = next else {
            return Err(TrainError::Config(
                "No upcoming fire time for any schedule".to_string(),
            ));
        };

        let wait = (fire_at - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        info!(flow = %kind, at = %fire_at, "Next flow scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                run_flow(&ctx, kind).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down scheduler");
                return Ok(());
            }
        }
    }
}

async fn run_flow(ctx: &PipelineContext, kind: FlowKind) {
    info!(flow = %kind, "Flow fired");

    let result = match kind {
        FlowKind::SyncDaily => sync(ctx, false).await.map(|_| ()),
        FlowKind::SyncCatchup => sync(ctx, true).await.map(|_| ()),
        FlowKind::AdaptWeekly => adapt(ctx, None, false).await.map(|_| ()),
    };

    // Fail-open: log and wait for the next fire
    if let Err(e) = result {
        error!(flow = %kind, error = %e, "Flow failed; next scheduled run will retry");
    } else {
        info!(flow = %kind, "Flow complete");
    }
}
