//! Trainloop - Automated Endurance-Training Pipeline
//!
//! Periodically ingests workout and physiological data from a fitness
//! tracker, computes training-load metrics, flags concerning trends, and,
//! when warranted, asks an LLM to propose a structured plan revision that is
//! merged and pushed back to the tracker's planning tool.
//!
//! ## Flow
//!
//! fetch → store → compute metrics → evaluate flags → (optionally) propose
//! revision → apply patch → push. Every external step is fail-open: failures
//! are logged and the next scheduled run redoes the work.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use trainloop::{Config, Database, PipelineContext};
//!
//! let db = Database::open(".trainloop/train.db")?;
//! db.initialize()?;
//! let ctx = PipelineContext::new(Config::default(), Arc::new(db));
//! trainloop::pipeline::sync(&ctx, false).await?;
//! trainloop::pipeline::adapt(&ctx, None, false).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ingest`]: fetch CLI wrapper with retry/backoff
//! - [`storage`]: SQLite persistence with connection pooling
//! - [`analytics`]: CTL/ATL/TSB, HRV z-score, flag evaluation
//! - [`ai`]: LLM provider, revision prompt and parsing
//! - [`planner`]: patch-apply-and-push sequence (fail-open)
//! - [`pipeline`]: flows and the cron-driven scheduler

pub mod ai;
pub mod analytics;
pub mod cli;
pub mod config;
pub mod constants;
pub mod ingest;
pub mod pipeline;
pub mod planner;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, ThresholdConfig};

// Error Types
pub use types::error::{ErrorCategory, Result, ResultExt, TrainError};

// Domain Records
pub use types::{Activity, HrvSample};

// Storage
pub use storage::{Database, SharedDatabase};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use analytics::{FlagSet, LoadMetrics, MetricsReport};
pub use pipeline::{AdaptSummary, PipelineContext, SyncSummary};
pub use planner::{Planner, PushOutcome};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{LlmProvider, LlmResponse, OpenAiProvider, PlanRevision, SharedProvider};
