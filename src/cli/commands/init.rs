//! Init Command
//!
//! Initialize trainloop in the current directory.

use crate::cli::util::{DB_PATH, trainloop_dir};
use crate::config::ConfigLoader;
use crate::storage::Database;
use crate::types::{Result, TrainError};

pub fn run(force: bool) -> Result<()> {
    let dir = trainloop_dir();

    if dir.exists() && !force {
        return Err(TrainError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    // Project directory structure and config
    ConfigLoader::init_project()?;

    // Initialize global config if not exists (don't force overwrite)
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    // Plan cache directory
    let config = ConfigLoader::load()?;
    std::fs::create_dir_all(&config.planner.plan_dir)?;

    // Initialize database
    let db = Database::open(dir.join(DB_PATH))?;
    db.initialize()?;

    println!("✓ Initialized trainloop in .trainloop/");
    println!();
    println!("Next steps:");
    println!("  1. Check thresholds and schedules in .trainloop/config.toml");
    println!("  2. Run 'trainloop sync' to ingest tracker data");
    println!("  3. Run 'trainloop run' to start the scheduler");

    Ok(())
}
