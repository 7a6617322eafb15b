//! Run Command
//!
//! Start the cron-driven scheduler and keep it running until Ctrl-C.

use crate::cli::util::load_context;
use crate::pipeline::scheduler;
use crate::types::Result;

pub async fn run() -> Result<()> {
    let ctx = load_context()?;

    println!("Starting scheduler (Ctrl-C to stop)");
    scheduler::run(ctx).await
}
