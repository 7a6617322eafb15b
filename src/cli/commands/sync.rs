//! Sync Command
//!
//! Run the ingest flow once: fetch tracker data and update storage.

use crate::cli::util::load_context;
use crate::pipeline;
use crate::types::Result;

pub async fn run(delta_only: bool) -> Result<()> {
    let ctx = load_context()?;
    let summary = pipeline::sync(&ctx, delta_only).await?;

    println!(
        "✓ Sync complete: {} activities, {} HRV samples",
        summary.activities, summary.hrv_samples
    );

    Ok(())
}
