mod common;

use common::*;
use custhealth_core::{
    alert::{Alert, AlertPayload, AlertPriority, AlertType},
    churn::{ChurnPrediction, RiskLevel},
    config::HealthWeights,
    event::RunEvent,
    health_score::{HealthCategory, HealthScoreCalculator, HealthScoreRecord},
    store::{HealthStore, RunOutputs},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn empty_store() -> HealthStore {
    let store = HealthStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

fn health(ids: &[&str]) -> Vec<HealthScoreRecord> {
    let rows: Vec<_> = ids.iter().map(|id| blank_row(id, 12_000.0, false)).collect();
    HealthScoreCalculator::new(HealthWeights::default()).score_all(&rows, stamp())
}

fn prediction(id: &str, p: f64) -> ChurnPrediction {
    ChurnPrediction {
        customer_id:       id.into(),
        contract_value:    24_000.0,
        churn_probability: p,
        risk_level:        RiskLevel::from_probability(p, 0.3, 0.7),
        computed_at:       stamp(),
    }
}

fn alert(id: &str) -> Alert {
    Alert {
        alert_type:   AlertType::HighChurnRisk,
        priority:     AlertPriority::High,
        customer_id:  id.into(),
        company_name: format!("{id} Corp"),
        message:      format!("Customer {id} Corp has 80.0% churn probability"),
        payload:      AlertPayload {
            churn_probability: Some(0.8),
            contract_value: Some(24_000.0),
            ..AlertPayload::default()
        },
        timestamp:    stamp(),
    }
}

fn outputs(ids: &[&str], predictions: Option<Vec<ChurnPrediction>>) -> RunOutputs {
    RunOutputs {
        health:        health(ids),
        model_version: predictions.as_ref().map(|_| 1),
        predictions,
        alerts:        vec![alert(ids[0])],
        events:        vec![RunEvent::RunStarted { run_id: "r".into(), as_of: as_of() }],
    }
}

// ── Schema & snapshot ────────────────────────────────────────────────────────

#[test]
fn migrations_can_be_reapplied() {
    let store = empty_store();
    store.migrate().unwrap();
    assert_eq!(store.run_count().unwrap(), 0);
}

#[test]
fn snapshot_round_trips_through_the_signal_tables() {
    let snapshot = portfolio();
    let store = store_with(&snapshot);
    let loaded = store.load_snapshot().unwrap();

    assert_eq!(loaded.customers.len(), snapshot.customers.len());
    assert_eq!(loaded.tickets.len(), snapshot.tickets.len());
    assert_eq!(loaded.incidents.len(), snapshot.incidents.len());
    assert_eq!(loaded.usage.len(), snapshot.usage.len());
    assert_eq!(loaded.feedback.len(), snapshot.feedback.len());

    let ids: Vec<&str> = loaded.customers.iter().map(|c| c.customer_id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "customers load in id order");

    let c05 = loaded.customers.iter().find(|c| c.customer_id == "C05").unwrap();
    assert_eq!(c05.contract_value, Some(120_000.0));
    assert_eq!(c05.contract_end_date, date(2025, 12, 31));
    let c07_incident = loaded.incidents.iter().find(|i| i.incident_id == "C07-I0").unwrap();
    assert_eq!(c07_incident.detection_time, date(2024, 6, 10).and_hms_opt(9, 30, 0).unwrap());
}

#[test]
fn loaded_fields_are_put_on_one_scale() {
    let mut s = custhealth_core::snapshot::SignalSnapshot::default();
    s.customers.push(customer("SC", 1_000.0, date(2025, 1, 1)));
    s.tickets.push(ticket("T10", "SC", date(2024, 6, 1), Some(8.0), false));
    s.usage.push(usage("SC", date(2024, 6, 1), 20.0, 65.0, 85.0));
    s.feedback.push(feedback("SC", 15.0, 4.0, date(2024, 6, 1)));
    let loaded = store_with(&s).load_snapshot().unwrap();

    assert_eq!(loaded.tickets[0].satisfaction_score, Some(4.0));
    assert!((loaded.usage[0].feature_adoption_score.unwrap() - 0.65).abs() < 1e-12);
    assert!((loaded.usage[0].license_utilization.unwrap() - 0.85).abs() < 1e-12);
    assert_eq!(loaded.feedback[0].nps_score, Some(10.0));
}

// ── Run commit ───────────────────────────────────────────────────────────────

#[test]
fn commit_writes_every_output_table() {
    let store = empty_store();
    let run = clock("run-a");
    store
        .commit_run(&run, &outputs(&["C1", "C2"], Some(vec![prediction("C2", 0.8), prediction("C1", 0.1)])))
        .unwrap();

    assert!(store.run_exists("run-a").unwrap());
    assert_eq!(store.run_count().unwrap(), 1);

    let scores = store.health_scores_for_run("run-a").unwrap();
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].record.customer_id, "C1");
    assert_eq!(scores[0].record.health_category, HealthCategory::Healthy);
    assert_eq!(scores[0].record.computed_at, stamp());

    let predictions = store.churn_predictions().unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].prediction.customer_id, "C2");
    assert_eq!(predictions[0].prediction.risk_level, RiskLevel::High);
    assert_eq!(predictions[0].model_version, 1);

    let log = store.alert_log(Some("run-a")).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].alert, alert("C1"));

    let events = store.events_for_run("run-a").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "run_started");
}

#[test]
fn predictions_are_replaced_but_history_and_alerts_accumulate() {
    let store = empty_store();
    store
        .commit_run(&clock("run-1"), &outputs(&["C1", "C2"], Some(vec![prediction("C1", 0.5), prediction("C2", 0.2)])))
        .unwrap();
    store
        .commit_run(&clock("run-2"), &outputs(&["C1"], Some(vec![prediction("C1", 0.9)])))
        .unwrap();

    let predictions = store.churn_predictions().unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].run_id, "run-2");
    assert_eq!(predictions[0].prediction.churn_probability, 0.9);

    assert_eq!(store.health_history("C1").unwrap().len(), 2);
    assert_eq!(store.health_score_count().unwrap(), 3);
    assert_eq!(store.alert_count().unwrap(), 2);
    assert_eq!(store.alert_log(None).unwrap().len(), 2);
    assert_eq!(store.alert_log(Some("run-1")).unwrap().len(), 1);
}

#[test]
fn run_without_a_model_keeps_the_previous_predictions() {
    let store = empty_store();
    store
        .commit_run(&clock("run-1"), &outputs(&["C1"], Some(vec![prediction("C1", 0.4)])))
        .unwrap();
    store.commit_run(&clock("run-2"), &outputs(&["C1"], None)).unwrap();

    let predictions = store.churn_predictions().unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].run_id, "run-1");
}

#[test]
fn failed_commit_leaves_prior_outputs_untouched() {
    let store = empty_store();
    store
        .commit_run(&clock("run-ok"), &outputs(&["C1"], Some(vec![prediction("C1", 0.4)])))
        .unwrap();

    // Duplicate customer rows violate the health_score primary key midway
    // through the transaction.
    let mut bad = outputs(&["C1", "C2"], Some(vec![prediction("C2", 0.9)]));
    bad.health.push(bad.health[0].clone());
    assert!(store.commit_run(&clock("run-bad"), &bad).is_err());

    assert!(!store.run_exists("run-bad").unwrap());
    assert_eq!(store.run_count().unwrap(), 1);
    assert_eq!(store.health_score_count().unwrap(), 1);
    assert_eq!(store.alert_count().unwrap(), 1);
    assert_eq!(store.churn_predictions().unwrap()[0].run_id, "run-ok");
}

#[test]
fn on_disk_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("health.db");
    let path = path.to_str().unwrap();

    let store = HealthStore::open(path).unwrap();
    store.migrate().unwrap();
    store.commit_run(&clock("run-disk"), &outputs(&["C1"], None)).unwrap();

    let reopened = store.reopen().unwrap();
    assert!(reopened.run_exists("run-disk").unwrap());
    assert_eq!(reopened.health_scores_for_run("run-disk").unwrap().len(), 1);
}
