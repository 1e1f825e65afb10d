//! Input snapshot: the immutable raw records a scoring run reads.
//!
//! A snapshot is loaded once at the start of a run and never mutated.
//! Field scales are canonicalized here, at the boundary, so every
//! downstream reduction sees one scale per field:
//!   - ticket satisfaction:       1–5
//!   - feature adoption, license: fractions 0–1
//!   - NPS:                       0–10 likelihood-to-recommend; out-of-range
//!                                values are clamped to [-10, 10] so negative
//!                                sources survive ingest
//!
//! Nullable numeric fields stay None and are left out of means.

use crate::types::CustomerId;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub customer_id:               CustomerId,
    pub company_name:              String,
    pub industry:                  String,
    pub monthly_recurring_revenue: f64,
    pub contract_start_date:       NaiveDate,
    pub contract_end_date:         NaiveDate,
    pub risk_score:                Option<String>,
    /// Annual contract value, when the source carries one.
    pub contract_value:            Option<f64>,
}

impl Customer {
    /// Annual contract value; derived from MRR when not recorded.
    pub fn contract_value(&self) -> f64 {
        self.contract_value
            .unwrap_or(self.monthly_recurring_revenue * 12.0)
            .max(0.0)
    }

    /// A contract that ended on or before `as_of` counts as churned.
    pub fn has_churned(&self, as_of: NaiveDate) -> bool {
        self.contract_end_date <= as_of
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportTicket {
    pub ticket_id:             String,
    pub customer_id:           CustomerId,
    pub status:                String,
    pub resolution_time_hours: Option<f64>,
    pub satisfaction_score:    Option<f64>,
    pub escalated:             bool,
    pub created_date:          NaiveDate,
}

/// Ordinal incident severity: Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse of the source vocabulary.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low"      => Some(Self::Low),
            "medium"   => Some(Self::Medium),
            "high"     => Some(Self::High),
            "critical" => Some(Self::Critical),
            _          => None,
        }
    }

    /// 1–4, used for the mean-severity model feature.
    pub fn ordinal(self) -> f64 {
        match self {
            Self::Low      => 1.0,
            Self::Medium   => 2.0,
            Self::High     => 3.0,
            Self::Critical => 4.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low      => "Low",
            Self::Medium   => "Medium",
            Self::High     => "High",
            Self::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityIncident {
    pub incident_id:                  String,
    pub customer_id:                  CustomerId,
    pub severity:                     Severity,
    pub detection_time:               NaiveDateTime,
    pub resolution_time:              Option<NaiveDateTime>,
    pub false_positive:               bool,
    pub mean_time_to_detect_minutes:  f64,
    pub mean_time_to_respond_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductUsage {
    pub customer_id:            CustomerId,
    pub date:                   NaiveDate,
    pub daily_active_users:     Option<f64>,
    pub login_frequency:        Option<f64>,
    pub feature_adoption_score: Option<f64>,
    pub license_utilization:    Option<f64>,
}

impl ProductUsage {
    /// Activity level for trend detection: DAU, else login frequency.
    pub fn activity(&self) -> Option<f64> {
        self.daily_active_users.or(self.login_frequency)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RenewalLikelihood {
    Low,
    Medium,
    High,
}

impl RenewalLikelihood {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low"    => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high"   => Some(Self::High),
            _        => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub customer_id:         CustomerId,
    pub nps_score:           Option<f64>,
    pub satisfaction_rating: Option<f64>,
    pub likelihood_to_renew: Option<RenewalLikelihood>,
    pub feedback_date:       NaiveDate,
}

/// Everything one run reads, loaded once and treated as immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub customers: Vec<Customer>,
    pub tickets:   Vec<SupportTicket>,
    pub incidents: Vec<SecurityIncident>,
    pub usage:     Vec<ProductUsage>,
    pub feedback:  Vec<FeedbackRecord>,
}

impl SignalSnapshot {
    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

// ── Scale canonicalization ─────────────────────────────────────────────────

/// Ticket satisfaction on 1–5. Sources that report 1–10 are halved.
pub fn canonical_ticket_satisfaction(raw: f64) -> f64 {
    if raw > 5.0 { raw / 2.0 } else { raw }
}

/// Fractions arrive either as 0–1 or as a percentage.
pub fn canonical_fraction(raw: f64) -> f64 {
    let v = if raw > 1.0 { raw / 100.0 } else { raw };
    v.clamp(0.0, 1.0)
}

/// NPS is read as 0–10; anything outside [-10, 10] is clamped.
pub fn canonical_nps(raw: f64) -> f64 {
    raw.clamp(-10.0, 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_any_case_and_orders() {
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse(" high "), Some(Severity::High));
        assert_eq!(Severity::parse("sev1"), None);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn percent_fractions_are_rescaled() {
        assert_eq!(canonical_fraction(0.42), 0.42);
        assert_eq!(canonical_fraction(85.0), 0.85);
        assert_eq!(canonical_fraction(250.0), 1.0);
        assert_eq!(canonical_fraction(-0.2), 0.0);
    }

    #[test]
    fn ten_point_satisfaction_is_halved() {
        assert_eq!(canonical_ticket_satisfaction(4.0), 4.0);
        assert_eq!(canonical_ticket_satisfaction(8.0), 4.0);
    }
}
