//! Churn model feature vector.
//!
//! The vector layout is fixed. Reordering or resizing it invalidates
//! every persisted artifact, so the names are stored alongside the
//! scaler and checked at inference time.

use crate::{aggregator::FeatureRow, types::CustomerId};

pub const FEATURE_COUNT: usize = 12;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "contract_value",
    "ticket_count",
    "avg_resolution_time",
    "avg_satisfaction",
    "incident_count",
    "avg_severity",
    "avg_daily_users",
    "avg_adoption_rate",
    "avg_license_util",
    "avg_nps",
    "avg_rating",
    "renewal_soon",
];

/// Model input for one customer. Non-finite values are zero-filled.
pub fn feature_vector(row: &FeatureRow) -> Vec<f64> {
    let agg = &row.lifetime;
    let raw = [
        row.contract_value,
        agg.support.ticket_count as f64,
        agg.support.mean_resolution_hours,
        agg.support.mean_satisfaction,
        agg.security.incident_count as f64,
        agg.security.mean_severity,
        agg.usage.mean_activity,
        agg.usage.mean_feature_adoption,
        agg.usage.mean_license_utilization,
        agg.feedback.mean_nps,
        agg.feedback.mean_satisfaction_rating,
        if row.renewal_soon { 1.0 } else { 0.0 },
    ];
    raw.iter().map(|v| if v.is_finite() { *v } else { 0.0 }).collect()
}

/// A training example: features plus the observed churn outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub customer_id: CustomerId,
    pub features:    Vec<f64>,
    pub churned:     bool,
}

impl LabeledRow {
    pub fn from_feature_row(row: &FeatureRow) -> Self {
        Self {
            customer_id: row.customer_id.clone(),
            features:    feature_vector(row),
            churned:     row.contract_ended,
        }
    }
}

/// Label every row by whether its contract has ended.
pub fn label_rows(rows: &[FeatureRow]) -> Vec<LabeledRow> {
    rows.iter().map(LabeledRow::from_feature_row).collect()
}
