//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ConfigLoader;
use crate::pipeline::PipelineContext;
use crate::storage::Database;
use crate::types::{Result, TrainError};

/// Trainloop directory name
pub const TRAINLOOP_DIR: &str = ".trainloop";

/// Database relative path
pub const DB_PATH: &str = "train.db";

/// Get the trainloop directory path
pub fn trainloop_dir() -> PathBuf {
    PathBuf::from(TRAINLOOP_DIR)
}

/// Check if the project is initialized
pub fn is_initialized() -> bool {
    trainloop_dir().exists()
}

/// Require initialization, returning the trainloop directory
pub fn require_initialized() -> Result<PathBuf> {
    let dir = trainloop_dir();
    if !dir.exists() {
        return Err(TrainError::NotInitialized);
    }
    Ok(dir)
}

/// Load the full pipeline context for a command: validates initialization,
/// loads config, and opens the database.
pub fn load_context() -> Result<PipelineContext> {
    let dir = require_initialized()?;
    let config = ConfigLoader::load()?;

    let db = Database::open(dir.join(DB_PATH))?;
    db.initialize()?;

    Ok(PipelineContext::new(config, Arc::new(db)))
}
