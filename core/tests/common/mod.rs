//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use custhealth_core::{
    aggregator::{FeatureRow, SignalAggregates, WindowedAggregates},
    clock::RunClock,
    snapshot::{
        Customer, FeedbackRecord, ProductUsage, SecurityIncident, Severity, SignalSnapshot,
        SupportTicket,
    },
    store::HealthStore,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Every test runs "as of" mid-2024.
pub fn as_of() -> NaiveDate {
    date(2024, 6, 30)
}

pub fn stamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 6, 0, 0).single().expect("valid timestamp")
}

pub fn clock(run_id: &str) -> RunClock {
    RunClock::fixed(run_id, as_of(), stamp())
}

pub fn customer(id: &str, mrr: f64, end: NaiveDate) -> Customer {
    Customer {
        customer_id:               id.into(),
        company_name:              format!("{id} Corp"),
        industry:                  "Technology".into(),
        monthly_recurring_revenue: mrr,
        contract_start_date:       date(2022, 1, 1),
        contract_end_date:         end,
        risk_score:                None,
        contract_value:            None,
    }
}

pub fn ticket(id: &str, customer: &str, created: NaiveDate, satisfaction: Option<f64>, escalated: bool) -> SupportTicket {
    SupportTicket {
        ticket_id:             id.into(),
        customer_id:           customer.into(),
        status:                "Closed".into(),
        resolution_time_hours: Some(12.0),
        satisfaction_score:    satisfaction,
        escalated,
        created_date:          created,
    }
}

pub fn incident(id: &str, customer: &str, severity: Severity, detected: NaiveDate, false_positive: bool) -> SecurityIncident {
    SecurityIncident {
        incident_id:                  id.into(),
        customer_id:                  customer.into(),
        severity,
        detection_time:               detected.and_hms_opt(9, 30, 0).expect("valid time"),
        resolution_time:              None,
        false_positive,
        mean_time_to_detect_minutes:  20.0,
        mean_time_to_respond_minutes: 45.0,
    }
}

pub fn usage(customer: &str, on: NaiveDate, dau: f64, adoption: f64, license: f64) -> ProductUsage {
    ProductUsage {
        customer_id:            customer.into(),
        date:                   on,
        daily_active_users:     Some(dau),
        login_frequency:        None,
        feature_adoption_score: Some(adoption),
        license_utilization:    Some(license),
    }
}

pub fn feedback(customer: &str, nps: f64, rating: f64, on: NaiveDate) -> FeedbackRecord {
    FeedbackRecord {
        customer_id:         customer.into(),
        nps_score:           Some(nps),
        satisfaction_rating: Some(rating),
        likelihood_to_renew: None,
        feedback_date:       on,
    }
}

/// Twelve customers. C01–C04 churned before as_of with poor signals;
/// C05–C12 are active. Notable active accounts:
///   C05  high value (contract 120k), otherwise healthy
///   C06  usage fell from 100 to 60 DAU
///   C07  five incidents in the last 30 days
///   C08  one 2.0-rated ticket in the last 30 days
pub fn portfolio() -> SignalSnapshot {
    let mut s = SignalSnapshot::default();
    let prior = date(2024, 5, 1);
    let recent = date(2024, 6, 15);

    for (n, id) in ["C01", "C02", "C03", "C04"].iter().enumerate() {
        s.customers.push(customer(id, 800.0, date(2024, 1, 10 + n as u32)));
        for k in 0..4 {
            s.tickets.push(ticket(&format!("{id}-T{k}"), id, date(2023, 11, 1 + k), Some(1.5), true));
            s.incidents.push(incident(&format!("{id}-I{k}"), id, Severity::High, date(2023, 12, 1 + k), false));
        }
        s.usage.push(usage(id, date(2023, 12, 15), 3.0, 0.1, 0.15));
        s.feedback.push(feedback(id, 2.0, 1.5, date(2023, 12, 20)));
    }

    for n in 5..=12 {
        let id = format!("C{n:02}");
        let mut c = customer(&id, 2_000.0 + n as f64 * 100.0, date(2025, 12, 31));
        if n == 5 {
            c.contract_value = Some(120_000.0);
        }
        s.customers.push(c);
        let dau = if n == 6 { 100.0 } else { 40.0 };
        s.usage.push(usage(&id, prior, dau, 0.8, 0.85));
        let dau = if n == 6 { 60.0 } else { 40.0 };
        s.usage.push(usage(&id, recent, dau, 0.8, 0.85));
        s.feedback.push(feedback(&id, 8.0, 4.5, date(2024, 3, 1)));
        s.tickets.push(ticket(&format!("{id}-T0"), &id, date(2024, 2, 1), Some(4.5), false));
    }

    for k in 0..5 {
        s.incidents.push(incident(&format!("C07-I{k}"), "C07", Severity::Medium, date(2024, 6, 10 + k), false));
    }
    s.tickets.push(ticket("C08-T1", "C08", date(2024, 6, 20), Some(2.0), false));
    s
}

pub fn store_with(snapshot: &SignalSnapshot) -> HealthStore {
    let store = HealthStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store.insert_snapshot(snapshot).expect("seed snapshot");
    store
}

/// A FeatureRow with no signals at all, active unless `ended`.
pub fn blank_row(id: &str, contract_value: f64, ended: bool) -> FeatureRow {
    FeatureRow {
        customer_id:               id.into(),
        company_name:              format!("{id} Corp"),
        monthly_recurring_revenue: contract_value / 12.0,
        contract_value,
        renewal_soon:              ended,
        contract_ended:            ended,
        lifetime:                  SignalAggregates::default(),
        windows:                   WindowedAggregates::default(),
    }
}

/// A row whose lifetime signals look like a churner (`risky`) or a
/// healthy account. The two profiles differ on every model feature.
pub fn profile_row(id: &str, risky: bool, ended: bool) -> FeatureRow {
    let mut row = blank_row(id, if risky { 9_000.0 } else { 60_000.0 }, ended);
    row.renewal_soon = risky;
    let agg = &mut row.lifetime;
    if risky {
        agg.support.ticket_count = 9;
        agg.support.rated_count = 9;
        agg.support.mean_resolution_hours = 70.0;
        agg.support.mean_satisfaction = 1.5;
        agg.security.incident_count = 8;
        agg.security.mean_severity = 3.5;
        agg.usage.mean_activity = 4.0;
        agg.usage.mean_feature_adoption = 0.1;
        agg.usage.mean_license_utilization = 0.2;
        agg.feedback.mean_nps = 2.0;
        agg.feedback.mean_satisfaction_rating = 1.5;
    } else {
        agg.support.ticket_count = 1;
        agg.support.rated_count = 1;
        agg.support.mean_resolution_hours = 6.0;
        agg.support.mean_satisfaction = 4.6;
        agg.security.incident_count = 0;
        agg.security.mean_severity = 0.0;
        agg.usage.mean_activity = 55.0;
        agg.usage.mean_feature_adoption = 0.85;
        agg.usage.mean_license_utilization = 0.9;
        agg.feedback.mean_nps = 9.0;
        agg.feedback.mean_satisfaction_rating = 4.7;
    }
    row
}

/// Six churned risky rows and ten healthy active rows.
pub fn training_rows() -> Vec<FeatureRow> {
    let mut rows: Vec<FeatureRow> = (0..6).map(|i| profile_row(&format!("R{i}"), true, true)).collect();
    rows.extend((0..10).map(|i| profile_row(&format!("H{i}"), false, false)));
    rows
}
