mod common;

use common::*;
use custhealth_core::{
    aggregator::WindowedAggregates,
    alert::{build_inputs, AlertGenerator, AlertInput, AlertPriority, AlertType},
    churn::{ChurnPrediction, RiskLevel},
    config::{AlertThresholds, HealthWeights},
    error::HealthError,
    health_score::HealthScoreCalculator,
    notify::GroupedAlerts,
};
use std::collections::HashMap;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn input(id: &str, contract_value: f64, churn: Option<f64>) -> AlertInput {
    AlertInput {
        customer_id:       id.into(),
        company_name:      format!("{id} Corp"),
        contract_value,
        churn_probability: churn,
        health_score:      Some(55.0),
        windows:           WindowedAggregates::default(),
    }
}

fn generator() -> AlertGenerator {
    AlertGenerator::new(AlertThresholds::default())
}

fn types(alerts: &[custhealth_core::alert::Alert]) -> Vec<AlertType> {
    alerts.iter().map(|a| a.alert_type).collect()
}

fn prediction(id: &str, p: f64) -> ChurnPrediction {
    ChurnPrediction {
        customer_id:       id.into(),
        contract_value:    10_000.0,
        churn_probability: p,
        risk_level:        RiskLevel::from_probability(p, 0.3, 0.7),
        computed_at:       stamp(),
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

#[test]
fn high_value_customer_at_medium_risk_raises_exactly_one_critical_alert() {
    let alerts = generator().evaluate(&input("HV", 60_000.0, Some(0.45)), stamp());

    assert_eq!(alerts.len(), 1);
    let a = &alerts[0];
    assert_eq!(a.alert_type, AlertType::HighValueAtRisk);
    assert_eq!(a.priority, AlertPriority::Critical);
    assert_eq!(a.payload.churn_probability, Some(0.45));
    assert_eq!(a.payload.contract_value, Some(60_000.0));
    assert_eq!(a.payload.health_score, Some(55.0));
    assert_eq!(a.message, "High-value customer HV Corp ($60000) at risk with 45.0% churn probability");
    assert_eq!(a.timestamp, stamp());
}

#[test]
fn high_churn_probability_on_a_small_account() {
    let alerts = generator().evaluate(&input("SM", 10_000.0, Some(0.75)), stamp());

    assert_eq!(types(&alerts), vec![AlertType::HighChurnRisk]);
    assert_eq!(alerts[0].priority, AlertPriority::High);
    assert_eq!(alerts[0].message, "Customer SM Corp has 75.0% churn probability");
}

#[test]
fn churn_thresholds_are_inclusive() {
    let at_high = generator().evaluate(&input("E1", 50_000.0, Some(0.7)), stamp());
    assert_eq!(types(&at_high), vec![AlertType::HighChurnRisk, AlertType::HighValueAtRisk]);

    let at_medium = generator().evaluate(&input("E2", 50_000.0, Some(0.3)), stamp());
    assert_eq!(types(&at_medium), vec![AlertType::HighValueAtRisk]);

    let below = generator().evaluate(&input("E3", 49_999.0, Some(0.69)), stamp());
    assert!(below.is_empty());
}

#[test]
fn customers_without_a_prediction_skip_churn_rules() {
    let alerts = generator().evaluate(&input("NP", 500_000.0, None), stamp());
    assert!(alerts.is_empty());
}

#[test]
fn five_recent_incidents_is_critical_four_is_not() {
    let mut i = input("IN", 1_000.0, None);
    i.windows.trailing_30d.security.incident_count = 5;
    let alerts = generator().evaluate(&i, stamp());
    assert_eq!(types(&alerts), vec![AlertType::CriticalIncidents]);
    assert_eq!(alerts[0].payload.recent_incidents, Some(5));
    assert_eq!(alerts[0].message, "Customer IN Corp has 5 incidents in 30 days");

    i.windows.trailing_30d.security.incident_count = 4;
    assert!(generator().evaluate(&i, stamp()).is_empty());
}

#[test]
fn low_satisfaction_needs_a_rated_ticket() {
    let mut i = input("LS", 1_000.0, None);
    i.windows.trailing_30d.support.ticket_count = 2;
    i.windows.trailing_30d.support.mean_satisfaction = 0.0;
    i.windows.trailing_30d.support.rated_count = 0;
    assert!(generator().evaluate(&i, stamp()).is_empty());

    i.windows.trailing_30d.support.rated_count = 1;
    i.windows.trailing_30d.support.mean_satisfaction = 3.0;
    let alerts = generator().evaluate(&i, stamp());
    assert_eq!(types(&alerts), vec![AlertType::LowSatisfaction]);
    assert_eq!(alerts[0].priority, AlertPriority::Medium);
    assert_eq!(alerts[0].message, "Customer LS Corp satisfaction dropped to 3.0");

    i.windows.trailing_30d.support.mean_satisfaction = 3.1;
    assert!(generator().evaluate(&i, stamp()).is_empty());
}

#[test]
fn usage_decline_of_forty_percent_alerts() {
    let mut i = input("UD", 1_000.0, None);
    i.windows.prior_usage = 100.0;
    i.windows.trailing_30d.usage.mean_activity = 60.0;
    let alerts = generator().evaluate(&i, stamp());

    assert_eq!(types(&alerts), vec![AlertType::UsageDecline]);
    let trend = alerts[0].payload.usage_trend.unwrap();
    assert!((trend + 0.40).abs() < 1e-12);
    assert_eq!(alerts[0].message, "Customer UD Corp usage declined -40.0%");
}

#[test]
fn usage_decline_boundary_and_empty_history() {
    let mut i = input("UB", 1_000.0, None);
    i.windows.prior_usage = 100.0;
    i.windows.trailing_30d.usage.mean_activity = 70.0;
    assert_eq!(types(&generator().evaluate(&i, stamp())), vec![AlertType::UsageDecline]);

    i.windows.trailing_30d.usage.mean_activity = 71.0;
    assert!(generator().evaluate(&i, stamp()).is_empty());

    i.windows.prior_usage = 0.0;
    i.windows.trailing_30d.usage.mean_activity = 0.0;
    assert!(generator().evaluate(&i, stamp()).is_empty());
}

#[test]
fn a_customer_can_trigger_every_rule_once() {
    let mut i = input("ALL", 90_000.0, Some(0.9));
    i.windows.trailing_30d.security.incident_count = 7;
    i.windows.trailing_30d.support.rated_count = 2;
    i.windows.trailing_30d.support.mean_satisfaction = 1.5;
    i.windows.prior_usage = 50.0;
    i.windows.trailing_30d.usage.mean_activity = 10.0;
    let alerts = generator().evaluate(&i, stamp());

    assert_eq!(
        types(&alerts),
        vec![
            AlertType::HighChurnRisk,
            AlertType::HighValueAtRisk,
            AlertType::CriticalIncidents,
            AlertType::LowSatisfaction,
            AlertType::UsageDecline,
        ]
    );
}

// ── Ordering & grouping ──────────────────────────────────────────────────────

#[test]
fn generate_groups_by_priority_and_keeps_input_order_within_groups() {
    let mut decline = input("D1", 1_000.0, None);
    decline.windows.prior_usage = 100.0;
    let mut incidents = input("I1", 1_000.0, None);
    incidents.windows.trailing_30d.security.incident_count = 6;
    let inputs = vec![
        decline.clone(),
        input("V1", 80_000.0, Some(0.5)),
        incidents,
        input("V2", 70_000.0, Some(0.4)),
        AlertInput { customer_id: "D2".into(), ..decline },
    ];
    let alerts = generator().generate(&inputs, stamp());

    let order: Vec<(&str, AlertPriority)> =
        alerts.iter().map(|a| (a.customer_id.as_str(), a.priority)).collect();
    assert_eq!(
        order,
        vec![
            ("V1", AlertPriority::Critical),
            ("V2", AlertPriority::Critical),
            ("I1", AlertPriority::High),
            ("D1", AlertPriority::Medium),
            ("D2", AlertPriority::Medium),
        ]
    );

    let grouped = GroupedAlerts::from_alerts(&alerts);
    assert_eq!(grouped.total(), 5);
    assert_eq!(grouped.subject(), "Customer Risk Alert - 5 alerts (2 critical)");
    assert_eq!(grouped.groups()[0].1.len(), 2);
}

#[test]
fn inputs_exclude_ended_contracts_and_join_predictions() {
    let rows = vec![blank_row("ACT", 12_000.0, false), blank_row("END", 12_000.0, true)];
    let health = HealthScoreCalculator::new(HealthWeights::default()).score_all(&rows, stamp());
    let inputs = build_inputs(&rows, &health, &[prediction("ACT", 0.8)]);

    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].customer_id, "ACT");
    assert_eq!(inputs[0].churn_probability, Some(0.8));
    assert_eq!(inputs[0].health_score, Some(health[0].customer_health_score));
}

// ── Threshold configuration ──────────────────────────────────────────────────

#[test]
fn invalid_thresholds_fall_back_to_defaults() {
    let inverted = AlertThresholds {
        high_churn_probability: 0.2,
        medium_churn_probability: 0.6,
        ..AlertThresholds::default()
    };
    assert_eq!(*AlertGenerator::new(inverted).thresholds(), AlertThresholds::default());

    let failed = AlertGenerator::from_config(Err(HealthError::Config("unreadable".into())));
    assert_eq!(*failed.thresholds(), AlertThresholds::default());
}

#[test]
fn key_value_thresholds_require_every_key() {
    let mut values: HashMap<String, f64> = [
        ("high_churn_probability", 0.8),
        ("medium_churn_probability", 0.4),
        ("high_value_customer", 25_000.0),
        ("critical_incidents", 3.0),
        ("low_satisfaction", 2.5),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let parsed = AlertThresholds::from_key_values(&values).unwrap();
    assert_eq!(parsed.critical_incidents, 3);
    assert_eq!(parsed.high_value_customer, 25_000.0);

    let custom = AlertGenerator::from_config(Ok(parsed));
    let mut i = input("KV", 1_000.0, None);
    i.windows.trailing_30d.security.incident_count = 3;
    assert_eq!(types(&custom.evaluate(&i, stamp())), vec![AlertType::CriticalIncidents]);

    values.remove("low_satisfaction");
    let err = AlertThresholds::from_key_values(&values).unwrap_err();
    assert!(matches!(err, HealthError::Config(_)));
    assert_eq!(
        *AlertGenerator::from_config(Err(err)).thresholds(),
        AlertThresholds::default()
    );
}

#[test]
fn fractional_incident_threshold_is_rejected() {
    let values: HashMap<String, f64> = [
        ("high_churn_probability", 0.7),
        ("medium_churn_probability", 0.3),
        ("high_value_customer", 50_000.0),
        ("critical_incidents", 2.5),
        ("low_satisfaction", 3.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    assert!(AlertThresholds::from_key_values(&values).is_err());
}
