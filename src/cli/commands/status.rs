//! Status Command
//!
//! Display pipeline status: last sync, current metrics, raised flags, and
//! recent revision outcomes.

use console::style;

use crate::analytics::evaluate_flags;
use crate::cli::util::{is_initialized, load_context};
use crate::pipeline::compute_report;
use crate::types::Result;

pub fn run(format: &str, detailed: bool) -> Result<()> {
    let json_output = format == "json";

    if !is_initialized() {
        if json_output {
            println!("{{\"status\": \"not_initialized\"}}");
        } else {
            println!("Trainloop Status");
            println!("══════════════════════════════════════");
            println!("Not initialized. Run 'trainloop init' first.");
        }
        // Status is informational; not being initialized isn't a failure
        return Ok(());
    }

    let ctx = load_context()?;
    let report = compute_report(&ctx)?;
    let flags = evaluate_flags(&report, &ctx.config.thresholds);
    let last_sync = ctx.db.last_sync_run()?;
    let revisions = ctx.db.recent_revisions(5)?;

    if json_output {
        let status = serde_json::json!({
            "status": "initialized",
            "last_sync": last_sync.as_ref().map(|s| serde_json::json!({
                "kind": s.kind,
                "activities": s.fetched_activities,
                "hrv": s.fetched_hrv,
                "completed_at": s.completed_at.to_rfc3339(),
            })),
            "metrics": report,
            "flags": flags,
            "recent_revisions": revisions.iter().map(|r| serde_json::json!({
                "created_at": r.created_at.to_rfc3339(),
                "outcome": r.outcome,
            })).collect::<Vec<_>>(),
        });

        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Trainloop Status");
    println!("══════════════════════════════════════");

    match &last_sync {
        Some(sync) => println!(
            "Last sync: {} ({}, {} activities, {} HRV)",
            sync.completed_at.format("%Y-%m-%d %H:%M UTC"),
            sync.kind,
            sync.fetched_activities,
            sync.fetched_hrv
        ),
        None => println!("Last sync: never"),
    }
    println!();

    println!("Training load:");
    println!("  CTL: {:.1}", report.load.ctl);
    println!("  ATL: {:.1}", report.load.atl);
    println!("  TSB: {:.1}", report.load.tsb);
    if let Some(ramp) = report.load.ramp {
        println!("  Weekly ramp: {:+.1}%", ramp * 100.0);
    }
    match report.hrv_zscore {
        Some(z) => println!("  HRV z-score: {:.2}", z),
        None => println!("  HRV z-score: (insufficient data)"),
    }
    println!();

    if flags.any() {
        println!(
            "Flags: {}",
            style(flags.raised().join(", ")).yellow().bold()
        );
    } else {
        println!("Flags: {}", style("none").green());
    }

    if detailed {
        println!();
        println!("Recent revisions:");
        if revisions.is_empty() {
            println!("  (none)");
        }
        for revision in &revisions {
            println!(
                "  {} {}",
                revision.created_at.format("%Y-%m-%d %H:%M"),
                revision.outcome
            );
        }
        println!();
        println!("Paths:");
        println!("  Database: .trainloop/train.db");
        println!("  Config: .trainloop/config.toml");
        println!("  Plans: {}/", ctx.config.planner.plan_dir);
    }

    Ok(())
}
