//! Feature aggregation: one FeatureRow per roster customer.
//!
//! Each of the four signal sources is reduced independently over the
//! customer's records. Reductions are sums, counts and means only, so
//! the result never depends on record order.
//!
//! RULE: a customer with no records in a source gets zeros for that
//! source, never NaN. Downstream weighted sums rely on this.

use crate::{
    config::RENEWAL_HORIZON_DAYS,
    snapshot::{
        Customer, FeedbackRecord, ProductUsage, RenewalLikelihood, SecurityIncident, Severity,
        SignalSnapshot, SupportTicket,
    },
    types::CustomerId,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const RECENT_WINDOW_DAYS:   i64 = 30;
pub const QUARTER_WINDOW_DAYS:  i64 = 90;

// ── Per-source aggregates ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SupportAggregates {
    pub ticket_count:          u32,
    /// Tickets carrying a satisfaction score.
    pub rated_count:           u32,
    pub mean_resolution_hours: f64,
    pub mean_satisfaction:     f64,
    pub escalated_count:       u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityAggregates {
    pub incident_count:         u32,
    pub mean_time_to_detect:    f64,
    pub mean_time_to_respond:   f64,
    pub false_positive_count:   u32,
    pub high_or_critical_count: u32,
    pub critical_count:         u32,
    /// Mean severity ordinal (Low=1 .. Critical=4).
    pub mean_severity:          f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageAggregates {
    pub observation_count:        u32,
    pub mean_feature_adoption:    f64,
    /// Fraction 0–1.
    pub mean_license_utilization: f64,
    /// DAU (or login frequency) at the most recent observation.
    pub latest_activity:          f64,
    pub mean_activity:            f64,
}

impl UsageAggregates {
    pub fn license_utilization_pct(&self) -> f64 {
        self.mean_license_utilization * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackAggregates {
    pub response_count:           u32,
    pub mean_nps:                 f64,
    pub mean_satisfaction_rating: f64,
    pub latest_renewal:           Option<RenewalLikelihood>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SignalAggregates {
    pub support:  SupportAggregates,
    pub security: SecurityAggregates,
    pub usage:    UsageAggregates,
    pub feedback: FeedbackAggregates,
}

/// Trailing-window reductions used for alerting and trend detection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WindowedAggregates {
    pub trailing_30d: SignalAggregates,
    pub trailing_90d: SignalAggregates,
    /// Mean activity over [as_of - 90d, as_of - 30d).
    pub prior_usage:  f64,
}

impl WindowedAggregates {
    pub fn recent_usage(&self) -> f64 {
        self.trailing_30d.usage.mean_activity
    }

    pub fn usage_trend(&self) -> f64 {
        usage_trend(self.recent_usage(), self.prior_usage)
    }

    /// Mean ticket satisfaction over the last 30 days, if any ticket was rated.
    pub fn recent_satisfaction(&self) -> Option<f64> {
        let support = &self.trailing_30d.support;
        (support.rated_count > 0).then_some(support.mean_satisfaction)
    }

    pub fn recent_incidents(&self) -> u32 {
        self.trailing_30d.security.incident_count
    }
}

/// Fractional change from `previous` to `recent`. The denominator is
/// floored at 1, so an empty prior period divides by 1.
pub fn usage_trend(recent: f64, previous: f64) -> f64 {
    (recent - previous) / previous.max(1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub customer_id:               CustomerId,
    pub company_name:              String,
    pub monthly_recurring_revenue: f64,
    pub contract_value:            f64,
    /// Contract ends within the renewal horizon.
    pub renewal_soon:              bool,
    /// Contract ended on or before `as_of`.
    pub contract_ended:            bool,
    pub lifetime:                  SignalAggregates,
    pub windows:                   WindowedAggregates,
}

impl FeatureRow {
    pub fn is_active(&self) -> bool {
        !self.contract_ended
    }
}

// ── Windows ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Window {
    All,
    /// Inclusive on both ends.
    Range { start: NaiveDate, end: NaiveDate },
}

impl Window {
    fn contains(self, date: NaiveDate) -> bool {
        match self {
            Window::All => true,
            Window::Range { start, end } => date >= start && date <= end,
        }
    }
}

fn trailing(as_of: NaiveDate, days: i64) -> Window {
    Window::Range { start: as_of - Duration::days(days), end: as_of }
}

// ── Reductions ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Mean {
    sum: f64,
    n:   u32,
}

impl Mean {
    fn push(&mut self, v: f64) {
        if v.is_finite() {
            self.sum += v;
            self.n += 1;
        }
    }

    fn push_opt(&mut self, v: Option<f64>) {
        if let Some(v) = v {
            self.push(v);
        }
    }

    fn value(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.sum / self.n as f64 }
    }
}

fn reduce_support(tickets: &[&SupportTicket], window: Window) -> SupportAggregates {
    let mut out = SupportAggregates::default();
    let mut resolution = Mean::default();
    let mut satisfaction = Mean::default();

    for t in tickets.iter().filter(|t| window.contains(t.created_date)) {
        out.ticket_count += 1;
        resolution.push_opt(t.resolution_time_hours.filter(|h| *h >= 0.0));
        satisfaction.push_opt(t.satisfaction_score);
        if t.escalated {
            out.escalated_count += 1;
        }
    }

    out.rated_count = satisfaction.n;
    out.mean_resolution_hours = resolution.value();
    out.mean_satisfaction = satisfaction.value();
    out
}

fn reduce_security(incidents: &[&SecurityIncident], window: Window) -> SecurityAggregates {
    let mut out = SecurityAggregates::default();
    let mut detect = Mean::default();
    let mut respond = Mean::default();
    let mut severity = Mean::default();

    for i in incidents.iter().filter(|i| window.contains(i.detection_time.date())) {
        out.incident_count += 1;
        detect.push(i.mean_time_to_detect_minutes);
        respond.push(i.mean_time_to_respond_minutes);
        severity.push(i.severity.ordinal());
        if i.false_positive {
            out.false_positive_count += 1;
        }
        if i.severity >= Severity::High {
            out.high_or_critical_count += 1;
        }
        if i.severity == Severity::Critical {
            out.critical_count += 1;
        }
    }

    out.mean_time_to_detect = detect.value();
    out.mean_time_to_respond = respond.value();
    out.mean_severity = severity.value();
    out
}

fn reduce_usage(usage: &[&ProductUsage], window: Window) -> UsageAggregates {
    let mut out = UsageAggregates::default();
    let mut adoption = Mean::default();
    let mut license = Mean::default();
    let mut activity = Mean::default();
    // (date, activity) of the most recent observation; ties keep the larger value.
    let mut latest: Option<(NaiveDate, f64)> = None;

    for u in usage.iter().filter(|u| window.contains(u.date)) {
        out.observation_count += 1;
        adoption.push_opt(u.feature_adoption_score);
        license.push_opt(u.license_utilization);
        if let Some(level) = u.activity().filter(|v| v.is_finite()) {
            activity.push(level);
            latest = match latest {
                Some((d, v)) if (d, v) >= (u.date, level) => Some((d, v)),
                _ => Some((u.date, level)),
            };
        }
    }

    out.mean_feature_adoption = adoption.value();
    out.mean_license_utilization = license.value();
    out.mean_activity = activity.value();
    out.latest_activity = latest.map(|(_, v)| v).unwrap_or(0.0);
    out
}

fn reduce_feedback(feedback: &[&FeedbackRecord], window: Window) -> FeedbackAggregates {
    let mut out = FeedbackAggregates::default();
    let mut nps = Mean::default();
    let mut rating = Mean::default();
    let mut latest: Option<(NaiveDate, RenewalLikelihood)> = None;

    for f in feedback.iter().filter(|f| window.contains(f.feedback_date)) {
        out.response_count += 1;
        nps.push_opt(f.nps_score);
        rating.push_opt(f.satisfaction_rating);
        if let Some(r) = f.likelihood_to_renew {
            latest = match latest {
                Some(prev) if prev >= (f.feedback_date, r) => Some(prev),
                _ => Some((f.feedback_date, r)),
            };
        }
    }

    out.mean_nps = nps.value();
    out.mean_satisfaction_rating = rating.value();
    out.latest_renewal = latest.map(|(_, r)| r);
    out
}

// ── Aggregator ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct CustomerSignals<'a> {
    tickets:   Vec<&'a SupportTicket>,
    incidents: Vec<&'a SecurityIncident>,
    usage:     Vec<&'a ProductUsage>,
    feedback:  Vec<&'a FeedbackRecord>,
}

impl CustomerSignals<'_> {
    fn reduce(&self, window: Window) -> SignalAggregates {
        SignalAggregates {
            support:  reduce_support(&self.tickets, window),
            security: reduce_security(&self.incidents, window),
            usage:    reduce_usage(&self.usage, window),
            feedback: reduce_feedback(&self.feedback, window),
        }
    }
}

fn index_by_customer(snapshot: &SignalSnapshot) -> HashMap<&str, CustomerSignals<'_>> {
    let mut index: HashMap<&str, CustomerSignals<'_>> = snapshot
        .customers
        .iter()
        .map(|c| (c.customer_id.as_str(), CustomerSignals::default()))
        .collect();
    let mut orphans = 0usize;

    for t in &snapshot.tickets {
        match index.get_mut(t.customer_id.as_str()) {
            Some(s) => s.tickets.push(t),
            None => orphans += 1,
        }
    }
    for i in &snapshot.incidents {
        match index.get_mut(i.customer_id.as_str()) {
            Some(s) => s.incidents.push(i),
            None => orphans += 1,
        }
    }
    for u in &snapshot.usage {
        match index.get_mut(u.customer_id.as_str()) {
            Some(s) => s.usage.push(u),
            None => orphans += 1,
        }
    }
    for f in &snapshot.feedback {
        match index.get_mut(f.customer_id.as_str()) {
            Some(s) => s.feedback.push(f),
            None => orphans += 1,
        }
    }

    if orphans > 0 {
        log::warn!("aggregate: dropped {orphans} records referencing customers not in the roster");
    }
    index
}

fn feature_row(customer: &Customer, signals: &CustomerSignals<'_>, as_of: NaiveDate) -> FeatureRow {
    let prior = Window::Range {
        start: as_of - Duration::days(QUARTER_WINDOW_DAYS),
        end:   as_of - Duration::days(RECENT_WINDOW_DAYS + 1),
    };

    FeatureRow {
        customer_id:               customer.customer_id.clone(),
        company_name:              customer.company_name.clone(),
        monthly_recurring_revenue: customer.monthly_recurring_revenue.max(0.0),
        contract_value:            customer.contract_value(),
        renewal_soon:              customer.contract_end_date <= as_of + Duration::days(RENEWAL_HORIZON_DAYS),
        contract_ended:            customer.has_churned(as_of),
        lifetime:                  signals.reduce(Window::All),
        windows: WindowedAggregates {
            trailing_30d: signals.reduce(trailing(as_of, RECENT_WINDOW_DAYS)),
            trailing_90d: signals.reduce(trailing(as_of, QUARTER_WINDOW_DAYS)),
            prior_usage:  reduce_usage(&signals.usage, prior).mean_activity,
        },
    }
}

/// Reduce a snapshot to one FeatureRow per roster customer, in roster order.
/// Records for customers outside the roster are dropped.
pub fn aggregate(snapshot: &SignalSnapshot, as_of: NaiveDate) -> Vec<FeatureRow> {
    let index = index_by_customer(snapshot);
    let empty = CustomerSignals::default();

    let rows: Vec<FeatureRow> = snapshot
        .customers
        .iter()
        .map(|c| {
            let signals = index.get(c.customer_id.as_str()).unwrap_or(&empty);
            feature_row(c, signals, as_of)
        })
        .collect();

    log::debug!("aggregate: {} feature rows as of {as_of}", rows.len());
    rows
}
