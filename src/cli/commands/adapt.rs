//! Adapt Command
//!
//! Run the adapt flow once: compute metrics, evaluate flags and, when
//! warranted, revise and push the plan. With `--dry-run` the patched plan is
//! written but never pushed.

use crate::cli::util::load_context;
use crate::pipeline;
use crate::types::Result;

pub async fn run(dry_run: bool) -> Result<()> {
    let ctx = load_context()?;
    let summary = pipeline::adapt(&ctx, None, dry_run).await?;

    let load = &summary.report.load;
    println!(
        "Metrics: CTL {:.1}  ATL {:.1}  TSB {:.1}{}",
        load.ctl,
        load.atl,
        load.tsb,
        summary
            .report
            .hrv_zscore
            .map(|z| format!("  HRV z-score {:.2}", z))
            .unwrap_or_default()
    );

    match summary.outcome {
        Some(outcome) => {
            println!("Flags: {}", summary.flags.raised().join(", "));
            println!("Revision outcome: {}", outcome);
        }
        None => println!("No flags raised; plan unchanged."),
    }

    Ok(())
}
