//! Risk alert generation. Fuses health, churn and windowed signals.
//!
//! Rules, evaluated independently for every active customer (a customer
//! may trigger several, at most one per type):
//!   1. HIGH_CHURN_RISK     HIGH      p ≥ high_churn_probability
//!   2. HIGH_VALUE_AT_RISK  CRITICAL  value ≥ high_value_customer and p ≥ medium_churn_probability
//!   3. CRITICAL_INCIDENTS  HIGH      30-day incidents ≥ critical_incidents
//!   4. LOW_SATISFACTION    MEDIUM    30-day mean satisfaction ≤ low_satisfaction (rated tickets only)
//!   5. USAGE_DECLINE       MEDIUM    usage trend ≤ -30%
//!
//! Rules 1 and 2 need a churn prediction; customers without one skip them.
//! Output is grouped CRITICAL, HIGH, MEDIUM with input order kept inside
//! each group.

use crate::{
    aggregator::{FeatureRow, WindowedAggregates},
    churn::ChurnPrediction,
    config::{AlertThresholds, USAGE_DECLINE_TREND},
    error::HealthResult,
    health_score::HealthScoreRecord,
    types::CustomerId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    HighChurnRisk,
    HighValueAtRisk,
    CriticalIncidents,
    LowSatisfaction,
    UsageDecline,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighChurnRisk     => "HIGH_CHURN_RISK",
            Self::HighValueAtRisk   => "HIGH_VALUE_AT_RISK",
            Self::CriticalIncidents => "CRITICAL_INCIDENTS",
            Self::LowSatisfaction   => "LOW_SATISFACTION",
            Self::UsageDecline      => "USAGE_DECLINE",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "HIGH_CHURN_RISK"    => Some(Self::HighChurnRisk),
            "HIGH_VALUE_AT_RISK" => Some(Self::HighValueAtRisk),
            "CRITICAL_INCIDENTS" => Some(Self::CriticalIncidents),
            "LOW_SATISFACTION"   => Some(Self::LowSatisfaction),
            "USAGE_DECLINE"      => Some(Self::UsageDecline),
            _                    => None,
        }
    }

    pub fn priority(self) -> AlertPriority {
        match self {
            Self::HighValueAtRisk                        => AlertPriority::Critical,
            Self::HighChurnRisk | Self::CriticalIncidents => AlertPriority::High,
            Self::LowSatisfaction | Self::UsageDecline    => AlertPriority::Medium,
        }
    }
}

/// MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertPriority {
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Medium   => "MEDIUM",
            Self::High     => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "MEDIUM"   => Some(Self::Medium),
            "HIGH"     => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _          => None,
        }
    }
}

/// Type-specific alert fields. Only the ones relevant to the alert type
/// are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub churn_probability:   Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_value:      Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_incidents:    Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_satisfaction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_trend:         Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_score:        Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub alert_type:   AlertType,
    pub priority:     AlertPriority,
    pub customer_id:  CustomerId,
    pub company_name: String,
    pub message:      String,
    pub payload:      AlertPayload,
    pub timestamp:    DateTime<Utc>,
}

/// Everything the rules see for one customer.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertInput {
    pub customer_id:       CustomerId,
    pub company_name:      String,
    pub contract_value:    f64,
    pub churn_probability: Option<f64>,
    pub health_score:      Option<f64>,
    pub windows:           WindowedAggregates,
}

/// Join feature rows with their health record and churn prediction.
/// Inactive customers (contract ended) are left out.
pub fn build_inputs(
    rows: &[FeatureRow],
    health: &[HealthScoreRecord],
    predictions: &[ChurnPrediction],
) -> Vec<AlertInput> {
    let health_by_id: HashMap<&str, f64> = health
        .iter()
        .map(|h| (h.customer_id.as_str(), h.customer_health_score))
        .collect();
    let churn_by_id: HashMap<&str, f64> = predictions
        .iter()
        .map(|p| (p.customer_id.as_str(), p.churn_probability))
        .collect();

    rows.iter()
        .filter(|r| r.is_active())
        .map(|r| AlertInput {
            customer_id:       r.customer_id.clone(),
            company_name:      r.company_name.clone(),
            contract_value:    r.contract_value,
            churn_probability: churn_by_id.get(r.customer_id.as_str()).copied(),
            health_score:      health_by_id.get(r.customer_id.as_str()).copied(),
            windows:           r.windows,
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct AlertGenerator {
    thresholds: AlertThresholds,
}

impl AlertGenerator {
    /// Invalid thresholds fall back to the defaults.
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds: AlertThresholds::resolve(Ok(thresholds)) }
    }

    /// Accepts the outcome of a threshold load; a ConfigError means defaults.
    pub fn from_config(loaded: HealthResult<AlertThresholds>) -> Self {
        Self { thresholds: AlertThresholds::resolve(loaded) }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Alerts for one customer, in rule order.
    pub fn evaluate(&self, input: &AlertInput, timestamp: DateTime<Utc>) -> Vec<Alert> {
        let t = &self.thresholds;
        let mut out = Vec::new();
        let name = &input.company_name;

        let alert = |alert_type: AlertType, message: String, payload: AlertPayload| Alert {
            alert_type,
            priority: alert_type.priority(),
            customer_id: input.customer_id.clone(),
            company_name: input.company_name.clone(),
            message,
            payload: AlertPayload { health_score: input.health_score, ..payload },
            timestamp,
        };

        if let Some(p) = input.churn_probability {
            if p >= t.high_churn_probability {
                out.push(alert(
                    AlertType::HighChurnRisk,
                    format!("Customer {name} has {:.1}% churn probability", p * 100.0),
                    AlertPayload {
                        churn_probability: Some(p),
                        contract_value: Some(input.contract_value),
                        ..AlertPayload::default()
                    },
                ));
            }
            if input.contract_value >= t.high_value_customer && p >= t.medium_churn_probability {
                out.push(alert(
                    AlertType::HighValueAtRisk,
                    format!(
                        "High-value customer {name} (${:.0}) at risk with {:.1}% churn probability",
                        input.contract_value,
                        p * 100.0
                    ),
                    AlertPayload {
                        churn_probability: Some(p),
                        contract_value: Some(input.contract_value),
                        ..AlertPayload::default()
                    },
                ));
            }
        }

        let incidents = input.windows.recent_incidents();
        if incidents >= t.critical_incidents {
            out.push(alert(
                AlertType::CriticalIncidents,
                format!("Customer {name} has {incidents} incidents in 30 days"),
                AlertPayload { recent_incidents: Some(incidents), ..AlertPayload::default() },
            ));
        }

        if let Some(sat) = input.windows.recent_satisfaction() {
            if sat <= t.low_satisfaction {
                out.push(alert(
                    AlertType::LowSatisfaction,
                    format!("Customer {name} satisfaction dropped to {sat:.1}"),
                    AlertPayload { recent_satisfaction: Some(sat), ..AlertPayload::default() },
                ));
            }
        }

        let trend = input.windows.usage_trend();
        if trend <= USAGE_DECLINE_TREND {
            out.push(alert(
                AlertType::UsageDecline,
                format!("Customer {name} usage declined {:.1}%", trend * 100.0),
                AlertPayload { usage_trend: Some(trend), ..AlertPayload::default() },
            ));
        }

        out
    }

    /// Alerts for every input, grouped by priority (stable within a group).
    pub fn generate(&self, inputs: &[AlertInput], timestamp: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = inputs
            .iter()
            .flat_map(|i| self.evaluate(i, timestamp))
            .collect();
        sort_by_priority(&mut alerts);
        log::debug!("alerts: {} raised across {} customers", alerts.len(), inputs.len());
        alerts
    }
}

/// Stable sort, CRITICAL first.
pub fn sort_by_priority(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| b.priority.cmp(&a.priority));
}
