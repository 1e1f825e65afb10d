//! Run outputs: health score history, the churn prediction snapshot and
//! the alert log.
//!
//! Writes take a `&Connection` so commit_run can pass its transaction.

use super::HealthStore;
use crate::{
    alert::{Alert, AlertPayload, AlertPriority, AlertType},
    churn::{ChurnPrediction, RiskLevel},
    error::{HealthError, HealthResult},
    health_score::{HealthCategory, HealthScoreRecord, SubScores},
    types::{ModelVersion, RunId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredHealthScore {
    pub run_id: RunId,
    pub record: HealthScoreRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPrediction {
    pub run_id:        RunId,
    pub model_version: ModelVersion,
    pub prediction:    ChurnPrediction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertLogRow {
    pub id:     i64,
    pub run_id: RunId,
    pub alert:  Alert,
}

fn parse_timestamp(entity: &'static str, id: &str, raw: &str) -> HealthResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| HealthError::data(entity, id, format!("bad timestamp '{raw}': {e}")))
}

// ── Writes ─────────────────────────────────────────────────────────────────

pub(super) fn insert_health_scores(
    conn: &Connection,
    run_id: &str,
    records: &[HealthScoreRecord],
) -> HealthResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO health_score
         (run_id, customer_id, usage_score, support_score, security_score,
          satisfaction_score, customer_health_score, health_category, computed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for r in records {
        stmt.execute(params![
            run_id,
            r.customer_id,
            r.sub_scores.usage,
            r.sub_scores.support,
            r.sub_scores.security,
            r.sub_scores.satisfaction,
            r.customer_health_score,
            r.health_category.as_str(),
            r.computed_at.to_rfc3339(),
        ])?;
    }
    Ok(())
}

/// The prediction table is a point-in-time snapshot: the previous run's
/// rows are replaced wholesale.
pub(super) fn replace_predictions(
    conn: &Connection,
    run_id: &str,
    version: ModelVersion,
    predictions: &[ChurnPrediction],
) -> HealthResult<()> {
    conn.execute("DELETE FROM churn_prediction", [])?;
    let mut stmt = conn.prepare(
        "INSERT INTO churn_prediction
         (customer_id, run_id, model_version, contract_value, churn_probability,
          risk_level, computed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for p in predictions {
        stmt.execute(params![
            p.customer_id,
            run_id,
            version,
            p.contract_value,
            p.churn_probability,
            p.risk_level.as_str(),
            p.computed_at.to_rfc3339(),
        ])?;
    }
    Ok(())
}

pub(super) fn append_alerts(conn: &Connection, run_id: &str, alerts: &[Alert]) -> HealthResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO alert_log
         (run_id, alert_type, priority, customer_id, company_name, message, payload, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for a in alerts {
        stmt.execute(params![
            run_id,
            a.alert_type.as_str(),
            a.priority.as_str(),
            a.customer_id,
            a.company_name,
            a.message,
            serde_json::to_string(&a.payload)?,
            a.timestamp.to_rfc3339(),
        ])?;
    }
    Ok(())
}

// ── Queries ────────────────────────────────────────────────────────────────

const HEALTH_COLUMNS: &str = "run_id, customer_id, usage_score, support_score, security_score,
                              satisfaction_score, customer_health_score, health_category, computed_at";

type HealthRow = (String, String, f64, f64, f64, f64, f64, String, String);

fn health_from_row(raw: HealthRow) -> HealthResult<StoredHealthScore> {
    let (run_id, customer_id, usage, support, security, satisfaction, score, category, at) = raw;
    let health_category = HealthCategory::parse(&category).ok_or_else(|| {
        HealthError::data("health_score", &customer_id, format!("unknown category '{category}'"))
    })?;
    let computed_at = parse_timestamp("health_score", &customer_id, &at)?;
    Ok(StoredHealthScore {
        run_id,
        record: HealthScoreRecord {
            customer_id,
            sub_scores: SubScores { usage, support, security, satisfaction },
            customer_health_score: score,
            health_category,
            computed_at,
        },
    })
}

impl HealthStore {
    fn query_health(&self, filter: &str, arg: &str) -> HealthResult<Vec<StoredHealthScore>> {
        let sql = format!("SELECT {HEALTH_COLUMNS} FROM health_score WHERE {filter}");
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params![arg], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<Result<Vec<HealthRow>, _>>()?;
        raw.into_iter().map(health_from_row).collect()
    }

    /// One run's health scores, ordered by customer id.
    pub fn health_scores_for_run(&self, run_id: &str) -> HealthResult<Vec<StoredHealthScore>> {
        self.query_health("run_id = ?1 ORDER BY customer_id ASC", run_id)
    }

    /// A customer's score across runs, oldest first.
    pub fn health_history(&self, customer_id: &str) -> HealthResult<Vec<StoredHealthScore>> {
        self.query_health("customer_id = ?1 ORDER BY computed_at ASC, rowid ASC", customer_id)
    }

    /// Current prediction snapshot, highest probability first.
    pub fn churn_predictions(&self) -> HealthResult<Vec<StoredPrediction>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, run_id, model_version, contract_value, churn_probability,
                    risk_level, computed_at
             FROM churn_prediction
             ORDER BY churn_probability DESC, customer_id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, ModelVersion>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(customer_id, run_id, model_version, value, p, level, at)| {
                let risk_level = RiskLevel::parse(&level).ok_or_else(|| {
                    HealthError::data("churn_prediction", &customer_id, format!("unknown risk level '{level}'"))
                })?;
                let computed_at = parse_timestamp("churn_prediction", &customer_id, &at)?;
                Ok(StoredPrediction {
                    run_id,
                    model_version,
                    prediction: ChurnPrediction {
                        customer_id,
                        contract_value: value,
                        churn_probability: p,
                        risk_level,
                        computed_at,
                    },
                })
            })
            .collect()
    }

    /// Alerts in insertion order; `run_id` narrows to one run.
    pub fn alert_log(&self, run_id: Option<&str>) -> HealthResult<Vec<AlertLogRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, alert_type, priority, customer_id, company_name,
                    message, payload, timestamp
             FROM alert_log
             WHERE ?1 IS NULL OR run_id = ?1
             ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, run_id, kind, priority, customer_id, company_name, message, payload, at)| {
                let key = id.to_string();
                let alert_type = AlertType::parse(&kind)
                    .ok_or_else(|| HealthError::data("alert_log", &key, format!("unknown type '{kind}'")))?;
                let priority = AlertPriority::parse(&priority)
                    .ok_or_else(|| HealthError::data("alert_log", &key, format!("unknown priority '{priority}'")))?;
                let payload: AlertPayload = serde_json::from_str(&payload)?;
                let timestamp = parse_timestamp("alert_log", &key, &at)?;
                Ok(AlertLogRow {
                    id,
                    run_id,
                    alert: Alert {
                        alert_type,
                        priority,
                        customer_id,
                        company_name,
                        message,
                        payload,
                        timestamp,
                    },
                })
            })
            .collect()
    }

    pub fn health_score_count(&self) -> HealthResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM health_score", [], |r| r.get(0))?)
    }

    pub fn alert_count(&self) -> HealthResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM alert_log", [], |r| r.get(0))?)
    }
}
