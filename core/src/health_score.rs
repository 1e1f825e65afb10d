//! Health score: a pure, deterministic function of one FeatureRow.
//!
//! Four sub-scores, each clamped to [0, 100]:
//!   usage        = adoption × 50 + license_pct × 0.5
//!   support      = 100 with no tickets, else satisfaction × 20 − escalations × 5
//!   security     = 100 with no incidents, else 100 − incidents × 5 − false_positives × 2
//!   satisfaction = mean NPS × 10
//!
//! The composite is their weighted sum, clamped again. No state, no
//! randomness: re-scoring an unchanged row is bit-identical.

use crate::{
    aggregator::FeatureRow,
    config::HealthWeights,
    types::CustomerId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const AT_RISK_CEILING:  f64 = 40.0;
pub const CHAMPION_FLOOR:   f64 = 70.0;

fn clamp_score(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HealthCategory {
    #[serde(rename = "At Risk")]
    AtRisk,
    Healthy,
    Champion,
}

impl HealthCategory {
    /// Bands are closed below and open above, except Champion which
    /// includes 100.
    pub fn from_score(score: f64) -> Self {
        if score < AT_RISK_CEILING {
            Self::AtRisk
        } else if score < CHAMPION_FLOOR {
            Self::Healthy
        } else {
            Self::Champion
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AtRisk   => "At Risk",
            Self::Healthy  => "Healthy",
            Self::Champion => "Champion",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "At Risk"  => Some(Self::AtRisk),
            "Healthy"  => Some(Self::Healthy),
            "Champion" => Some(Self::Champion),
            _          => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SubScores {
    pub usage:        f64,
    pub support:      f64,
    pub security:     f64,
    pub satisfaction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthScoreRecord {
    pub customer_id:           CustomerId,
    pub sub_scores:            SubScores,
    pub customer_health_score: f64,
    pub health_category:       HealthCategory,
    pub computed_at:           DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScoreCalculator {
    weights: HealthWeights,
}

impl HealthScoreCalculator {
    /// Invalid weights are replaced by the defaults.
    pub fn new(weights: HealthWeights) -> Self {
        Self { weights: weights.or_default() }
    }

    pub fn weights(&self) -> HealthWeights {
        self.weights
    }

    pub fn sub_scores(&self, row: &FeatureRow) -> SubScores {
        let usage = &row.lifetime.usage;
        let support = &row.lifetime.support;
        let security = &row.lifetime.security;
        let feedback = &row.lifetime.feedback;

        let usage_score = clamp_score(
            usage.mean_feature_adoption * 50.0 + usage.license_utilization_pct() * 0.5,
        );

        let support_score = if support.ticket_count == 0 {
            100.0
        } else {
            clamp_score(support.mean_satisfaction * 20.0 - support.escalated_count as f64 * 5.0)
        };

        let security_score = if security.incident_count == 0 {
            100.0
        } else {
            clamp_score(
                100.0
                    - security.incident_count as f64 * 5.0
                    - security.false_positive_count as f64 * 2.0,
            )
        };

        let satisfaction_score = clamp_score(feedback.mean_nps * 10.0);

        SubScores {
            usage:        usage_score,
            support:      support_score,
            security:     security_score,
            satisfaction: satisfaction_score,
        }
    }

    pub fn composite(&self, s: &SubScores) -> f64 {
        let w = &self.weights;
        clamp_score(
            w.usage * s.usage
                + w.support * s.support
                + w.security * s.security
                + w.satisfaction * s.satisfaction,
        )
    }

    pub fn score(&self, row: &FeatureRow, computed_at: DateTime<Utc>) -> HealthScoreRecord {
        let sub_scores = self.sub_scores(row);
        let customer_health_score = self.composite(&sub_scores);
        HealthScoreRecord {
            customer_id: row.customer_id.clone(),
            sub_scores,
            customer_health_score,
            health_category: HealthCategory::from_score(customer_health_score),
            computed_at,
        }
    }

    pub fn score_all(&self, rows: &[FeatureRow], computed_at: DateTime<Utc>) -> Vec<HealthScoreRecord> {
        rows.iter().map(|r| self.score(r, computed_at)).collect()
    }
}
