//! Database Layer with Connection Pooling
//!
//! SQLite persistence for ingested records and pipeline bookkeeping:
//! - Connection pooling via r2d2 for concurrent access
//! - Panic-safe transactions with automatic rollback
//! - Version-tracked migrations
//! - WAL mode for optimal read/write performance

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::types::{Activity, HrvSample, Result, ResultExt, TrainError};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Current schema version for migration tracking
const SCHEMA_VERSION: u32 = 1;

/// Migration definitions
struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

/// No migrations yet; the machinery is in place for when the schema moves past v1.
const MIGRATIONS: &[Migration] = &[];

/// A completed sync run, for the status command.
#[derive(Debug, Clone)]
pub struct SyncRecord {
    pub id: String,
    pub kind: String,
    pub fetched_activities: usize,
    pub fetched_hrv: usize,
    pub completed_at: DateTime<Utc>,
}

/// One adapt-flow outcome in the revision log.
#[derive(Debug, Clone)]
pub struct RevisionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub flags_json: String,
    pub patch_json: Option<String>,
    pub outcome: String,
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        // The pipeline runs one flow at a time; a small pool is plenty.
        Self {
            max_size: 4,
            connection_timeout_secs: 30,
        }
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open database with connection pooling at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    /// Open database with custom pool configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(std::time::Duration::from_secs(
                config.connection_timeout_secs,
            ))
            .build(manager)
            .map_err(|e| TrainError::Storage(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| TrainError::Storage(format!("Failed to create in-memory pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Configure a new connection with production-ready settings.
    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            TrainError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Initialize database schema.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .with_context("Failed to set schema version")?;

        drop(conn);
        // Migrations only needed for existing databases with older versions
        self.migrate()?;
        Ok(())
    }

    /// Run version-tracked migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;

        let current_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        for migration in MIGRATIONS {
            if migration.version > current_version {
                conn.execute_batch(migration.up).with_context_fn(|| {
                    format!(
                        "Failed to apply migration {}: {}",
                        migration.version, migration.description
                    )
                })?;

                tracing::info!(
                    "Applied migration {}: {}",
                    migration.version,
                    migration.description
                );
            }
        }

        if current_version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to update schema version")?;
        }

        Ok(())
    }

    /// Execute a function within a panic-safe database transaction.
    ///
    /// All operations within the closure are atomic. If the closure panics,
    /// the transaction is rolled back and an error is returned instead of
    /// poisoning the connection pool.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + std::panic::UnwindSafe,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .with_context("Failed to start transaction")?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

        match result {
            Ok(Ok(value)) => {
                tx.commit().with_context("Failed to commit transaction")?;
                Ok(value)
            }
            Ok(Err(e)) => {
                // Transaction rolled back on drop
                Err(e)
            }
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(TrainError::Storage(format!(
                    "Transaction panicked: {}",
                    panic_msg
                )))
            }
        }
    }

    // =========================================================================
    // Activities
    // =========================================================================

    /// Insert or replace a batch of activities. Re-ingesting the same ids is
    /// idempotent, which is what the catch-up flow relies on.
    pub fn upsert_activities(&self, activities: &[Activity]) -> Result<usize> {
        if activities.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        self.transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO activities
                 (id, start_time, sport, duration_secs, distance_m, tss, avg_hr, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for activity in activities {
                stmt.execute(params![
                    activity.id,
                    activity.start_time.to_rfc3339(),
                    activity.sport,
                    activity.duration_secs,
                    activity.distance_m,
                    activity.tss,
                    activity.avg_hr,
                    now,
                ])?;
            }

            Ok(activities.len())
        })
    }

    /// Load activities starting at or after `cutoff`, ordered by start time.
    pub fn load_activities_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Activity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, start_time, sport, duration_secs, distance_m, tss, avg_hr
             FROM activities WHERE start_time >= ?1 ORDER BY start_time ASC",
        )?;

        let rows = stmt.query_map(params![cutoff.to_rfc3339()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, Option<u32>>(6)?,
            ))
        })?;

        let mut activities = Vec::new();
        for row in rows {
            let (id, start_time, sport, duration_secs, distance_m, tss, avg_hr) = row?;
            activities.push(Activity {
                id,
                start_time: parse_timestamp(&start_time)?,
                sport,
                duration_secs,
                distance_m,
                tss,
                avg_hr,
            });
        }
        Ok(activities)
    }

    /// Latest recorded activity start time, if any.
    pub fn latest_activity_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let latest: Option<String> = conn
            .query_row("SELECT MAX(start_time) FROM activities", [], |row| {
                row.get(0)
            })
            .unwrap_or(None);

        latest.as_deref().map(parse_timestamp).transpose()
    }

    // =========================================================================
    // HRV
    // =========================================================================

    /// Insert or replace a batch of HRV samples (one per night).
    pub fn upsert_hrv(&self, samples: &[HrvSample]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        self.transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO hrv_samples (day, rmssd_ms, ingested_at)
                 VALUES (?1, ?2, ?3)",
            )?;

            for sample in samples {
                stmt.execute(params![sample.day.to_string(), sample.rmssd_ms, now])?;
            }

            Ok(samples.len())
        })
    }

    /// Load HRV samples on or after `cutoff`, ordered by day.
    pub fn load_hrv_since(&self, cutoff: NaiveDate) -> Result<Vec<HrvSample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, rmssd_ms FROM hrv_samples WHERE day >= ?1 ORDER BY day ASC",
        )?;

        let rows = stmt.query_map(params![cutoff.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut samples = Vec::new();
        for row in rows {
            let (day, rmssd_ms) = row?;
            let day = day
                .parse::<NaiveDate>()
                .map_err(|e| TrainError::Storage(format!("Bad day in hrv_samples: {}", e)))?;
            samples.push(HrvSample { day, rmssd_ms });
        }
        Ok(samples)
    }

    // =========================================================================
    // Pipeline Bookkeeping
    // =========================================================================

    /// Record a completed sync run.
    pub fn record_sync_run(
        &self,
        kind: &str,
        fetched_activities: usize,
        fetched_hrv: usize,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_runs (id, kind, fetched_activities, fetched_hrv, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                kind,
                fetched_activities as i64,
                fetched_hrv as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// Most recent sync run, if any.
    pub fn last_sync_run(&self) -> Result<Option<SyncRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, fetched_activities, fetched_hrv, completed_at
             FROM sync_runs ORDER BY completed_at DESC LIMIT 1",
        )?;

        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let completed_at: String = row.get(4)?;
                Ok(Some(SyncRecord {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    fetched_activities: row.get::<_, i64>(2)? as usize,
                    fetched_hrv: row.get::<_, i64>(3)? as usize,
                    completed_at: parse_timestamp(&completed_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Record an adapt-flow outcome to the revision log.
    pub fn record_revision(
        &self,
        flags_json: &str,
        patch_json: Option<&str>,
        outcome: &str,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO revision_log (id, created_at, flags_json, patch_json, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, Utc::now().to_rfc3339(), flags_json, patch_json, outcome],
        )?;
        Ok(id)
    }

    /// Most recent revision-log entries, newest first.
    pub fn recent_revisions(&self, limit: usize) -> Result<Vec<RevisionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, flags_json, patch_json, outcome
             FROM revision_log ORDER BY created_at DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, created_at, flags_json, patch_json, outcome) = row?;
            records.push(RevisionRecord {
                id,
                created_at: parse_timestamp(&created_at)?,
                flags_json,
                patch_json,
                outcome,
            });
        }
        Ok(records)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TrainError::Storage(format!("Bad timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn activity(id: &str, day: u32, tss: f64) -> Activity {
        Activity {
            id: id.to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 7, day, 6, 0, 0).unwrap(),
            sport: Some("running".to_string()),
            duration_secs: Some(3600.0),
            distance_m: Some(10_000.0),
            tss,
            avg_hr: Some(150),
        }
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_upsert_and_load_activities() {
        let db = test_db();

        let inserted = db
            .upsert_activities(&[activity("a", 1, 40.0), activity("b", 2, 60.0)])
            .unwrap();
        assert_eq!(inserted, 2);

        let loaded = db
            .load_activities_since(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "a");
        assert_eq!(loaded[1].id, "b");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = test_db();

        db.upsert_activities(&[activity("a", 1, 40.0)]).unwrap();
        db.upsert_activities(&[activity("a", 1, 45.0)]).unwrap();

        let loaded = db
            .load_activities_since(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert!((loaded[0].tss - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_cutoff_filters_old_activities() {
        let db = test_db();
        db.upsert_activities(&[activity("a", 1, 40.0), activity("b", 20, 60.0)])
            .unwrap();

        let loaded = db
            .load_activities_since(Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "b");
    }

    #[test]
    fn test_latest_activity_time() {
        let db = test_db();
        assert!(db.latest_activity_time().unwrap().is_none());

        db.upsert_activities(&[activity("a", 1, 40.0), activity("b", 5, 60.0)])
            .unwrap();
        let latest = db.latest_activity_time().unwrap().unwrap();
        assert_eq!(latest, Utc.with_ymd_and_hms(2026, 7, 5, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_hrv_roundtrip() {
        let db = test_db();
        let samples: Vec<HrvSample> = (1..=5)
            .map(|d| HrvSample {
                day: NaiveDate::from_ymd_opt(2026, 7, d).unwrap(),
                rmssd_ms: 45.0 + d as f64,
            })
            .collect();

        db.upsert_hrv(&samples).unwrap();
        let loaded = db
            .load_hrv_since(NaiveDate::from_ymd_opt(2026, 7, 3).unwrap())
            .unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].day, NaiveDate::from_ymd_opt(2026, 7, 3).unwrap());
    }

    #[test]
    fn test_sync_run_bookkeeping() {
        let db = test_db();
        assert!(db.last_sync_run().unwrap().is_none());

        db.record_sync_run("daily", 12, 1).unwrap();
        let last = db.last_sync_run().unwrap().unwrap();
        assert_eq!(last.kind, "daily");
        assert_eq!(last.fetched_activities, 12);
        assert_eq!(last.fetched_hrv, 1);
    }

    #[test]
    fn test_revision_log() {
        let db = test_db();

        db.record_revision(r#"{"low_hrv":true}"#, Some("[]"), "succeeded")
            .unwrap();
        db.record_revision(r#"{"low_tsb":true}"#, None, "failed_patch")
            .unwrap();

        let recent = db.recent_revisions(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().any(|r| r.outcome == "succeeded"));
        assert!(recent.iter().any(|r| r.patch_json.is_none()));
    }

    #[test]
    fn test_empty_batches_are_noops() {
        let db = test_db();
        assert_eq!(db.upsert_activities(&[]).unwrap(), 0);
        assert_eq!(db.upsert_hrv(&[]).unwrap(), 0);
    }
}
