//! Run clock: the fixed point in time a scoring run is evaluated at.
//!
//! Every date comparison in a run (trailing windows, churn labels,
//! renewal flags) reads `as_of` from here, never from the wall clock.

use crate::types::RunId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunClock {
    pub run_id:      RunId,
    pub as_of:       NaiveDate,
    pub computed_at: DateTime<Utc>,
}

impl RunClock {
    /// A fresh run evaluated at `as_of`, stamped with the current time.
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
            as_of,
            computed_at: Utc::now(),
        }
    }

    /// A fully pinned clock. Used in tests and replays.
    pub fn fixed(run_id: impl Into<RunId>, as_of: NaiveDate, computed_at: DateTime<Utc>) -> Self {
        Self { run_id: run_id.into(), as_of, computed_at }
    }
}
