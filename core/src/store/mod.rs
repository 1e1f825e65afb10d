//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine and its components call store methods; they never
//! execute SQL directly.

mod outputs;
mod signals;

pub use outputs::{AlertLogRow, StoredHealthScore, StoredPrediction};

use crate::{
    alert::Alert,
    churn::ChurnPrediction,
    clock::RunClock,
    error::HealthResult,
    event::{RunEvent, RunEventEntry},
    health_score::HealthScoreRecord,
    types::ModelVersion,
};
use rusqlite::{params, Connection, OptionalExtension};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct HealthStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

/// Everything a run writes, committed together or not at all.
#[derive(Debug, Clone, Default)]
pub struct RunOutputs {
    pub health:        Vec<HealthScoreRecord>,
    /// None when the churn model was unavailable; the previous
    /// prediction snapshot is then left in place.
    pub predictions:   Option<Vec<ChurnPrediction>>,
    pub model_version: Option<ModelVersion>,
    pub alerts:        Vec<Alert>,
    pub events:        Vec<RunEvent>,
}

impl HealthStore {
    pub fn open(path: &str) -> HealthResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> HealthResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> HealthResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> HealthResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_signals.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_outputs.sql"))?;
        Ok(())
    }

    // ── Run commit ─────────────────────────────────────────────

    /// Write a run's outputs in one transaction. If anything fails the
    /// transaction rolls back and prior outputs are untouched.
    pub fn commit_run(&self, clock: &RunClock, outputs: &RunOutputs) -> HealthResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO scoring_run (run_id, as_of, computed_at, status, model_version,
                                      customers_scored, alerts_raised)
             VALUES (?1, ?2, ?3, 'committed', ?4, ?5, ?6)",
            params![
                clock.run_id,
                clock.as_of.format(DATE_FORMAT).to_string(),
                clock.computed_at.to_rfc3339(),
                outputs.model_version,
                outputs.health.len() as i64,
                outputs.alerts.len() as i64,
            ],
        )?;

        outputs::insert_health_scores(&tx, &clock.run_id, &outputs.health)?;
        if let (Some(predictions), Some(version)) = (&outputs.predictions, outputs.model_version) {
            outputs::replace_predictions(&tx, &clock.run_id, version, predictions)?;
        }
        outputs::append_alerts(&tx, &clock.run_id, &outputs.alerts)?;

        for (seq, event) in outputs.events.iter().enumerate() {
            tx.execute(
                "INSERT INTO run_event (run_id, seq, event_type, payload) VALUES (?1, ?2, ?3, ?4)",
                params![
                    clock.run_id,
                    seq as i64,
                    event.type_name(),
                    serde_json::to_string(event)?,
                ],
            )?;
        }

        tx.commit()?;
        log::debug!("Committed run {} ({} health rows)", clock.run_id, outputs.health.len());
        Ok(())
    }

    // ── Runs & events ──────────────────────────────────────────

    pub fn run_count(&self) -> HealthResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM scoring_run", [], |r| r.get(0))?)
    }

    pub fn run_exists(&self, run_id: &str) -> HealthResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM scoring_run WHERE run_id = ?1",
                params![run_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn events_for_run(&self, run_id: &str) -> HealthResult<Vec<RunEventEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, seq, event_type, payload
             FROM run_event WHERE run_id = ?1
             ORDER BY seq ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(RunEventEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    seq:        row.get::<_, i64>(2)? as u32,
                    event_type: row.get(3)?,
                    payload:    row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
