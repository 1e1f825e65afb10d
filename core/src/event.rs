//! Run event log: a record of what each scoring run did.
//!
//! Events are collected during a run and written in the same
//! transaction as the run's outputs, so the log never describes a run
//! that did not commit.

use crate::types::{ModelVersion, RunId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Variants are appended over time, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        as_of:  NaiveDate,
    },
    HealthScored {
        customers: usize,
        at_risk:   usize,
        healthy:   usize,
        champions: usize,
    },
    ModelTrained {
        version:   ModelVersion,
        rows:      usize,
        positives: usize,
    },
    ModelUnavailable {
        reason: String,
    },
    ChurnPredicted {
        version:   ModelVersion,
        customers: usize,
        high_risk: usize,
    },
    AlertsRaised {
        total:    usize,
        critical: usize,
        high:     usize,
        medium:   usize,
    },
    RunCommitted {
        run_id: RunId,
    },
}

impl RunEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. }       => "run_started",
            RunEvent::HealthScored { .. }     => "health_scored",
            RunEvent::ModelTrained { .. }     => "model_trained",
            RunEvent::ModelUnavailable { .. } => "model_unavailable",
            RunEvent::ChurnPredicted { .. }   => "churn_predicted",
            RunEvent::AlertsRaised { .. }     => "alerts_raised",
            RunEvent::RunCommitted { .. }     => "run_committed",
        }
    }
}

/// A row in the `run_event` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEventEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub seq:        u32,
    pub event_type: String,
    pub payload:    String,
}
