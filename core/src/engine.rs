//! The scoring engine: one batch run over a signal snapshot.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Load snapshot         (empty roster aborts with NoCustomers)
//!   2. Aggregate             FeatureRow per customer
//!   3. Health score          every customer
//!   4. Churn model           train / load / predict active customers
//!   5. Alerts                active customers
//!   6. Commit                one transaction: scores, predictions, alerts,
//!                            run events, run row
//!   7. Notify                after commit; failure is logged only
//!
//! RULES:
//!   - Nothing is written before step 6. An error before then leaves the
//!     store exactly as it was.
//!   - A ModelError in step 4 never aborts the run. Churn-based alert rules
//!     are skipped and the previous prediction snapshot is kept.

use crate::{
    aggregator::{aggregate, FeatureRow},
    alert::{build_inputs, AlertGenerator},
    churn::{
        artifact::ArtifactStore,
        features::{label_rows, LabeledRow},
        ChurnModel, ChurnPrediction, ModelState, RiskLevel,
    },
    clock::RunClock,
    config::EngineConfig,
    error::{HealthError, HealthResult},
    event::RunEvent,
    health_score::{HealthCategory, HealthScoreCalculator, HealthScoreRecord},
    notify::{GroupedAlerts, NotificationSink},
    store::{HealthStore, RunOutputs},
    types::{ModelVersion, RunId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a committed run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id:               RunId,
    pub as_of:                Option<NaiveDate>,
    pub customers_scored:     usize,
    pub at_risk:              usize,
    pub healthy:              usize,
    pub champions:            usize,
    pub average_health_score: f64,
    /// Sum of MRR over At Risk customers.
    pub revenue_at_risk:      f64,
    pub predictions:          usize,
    pub high_risk:            usize,
    pub model_version:        Option<ModelVersion>,
    /// Set when the churn model was unavailable for this run.
    pub model_error:          Option<String>,
    pub alerts_critical:      usize,
    pub alerts_high:          usize,
    pub alerts_medium:        usize,
}

impl RunSummary {
    pub fn total_alerts(&self) -> usize {
        self.alerts_critical + self.alerts_high + self.alerts_medium
    }
}

pub struct ScoringEngine {
    store:      HealthStore,
    config:     EngineConfig,
    calculator: HealthScoreCalculator,
    generator:  AlertGenerator,
    model:      ChurnModel,
    notifier:   Option<Box<dyn NotificationSink>>,
}

impl ScoringEngine {
    /// Build an engine over a migrated store. Invalid weights or thresholds
    /// in `config` fall back to the defaults.
    pub fn new(
        store: HealthStore,
        config: EngineConfig,
        artifacts: Box<dyn ArtifactStore>,
    ) -> HealthResult<Self> {
        let config = config.sanitized();
        let model = ChurnModel::new(config.churn_model.clone(), artifacts)?;
        Ok(Self {
            calculator: HealthScoreCalculator::new(config.health_weights),
            generator:  AlertGenerator::new(config.alert_thresholds),
            store,
            config,
            model,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Box<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &HealthStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model_state(&self) -> ModelState {
        self.model.state()
    }

    /// Execute one scoring run. See the module docs for the order.
    pub fn run(&mut self, clock: &RunClock) -> HealthResult<RunSummary> {
        log::info!("Run {} starting (as of {})", clock.run_id, clock.as_of);
        let mut events = vec![RunEvent::RunStarted {
            run_id: clock.run_id.clone(),
            as_of:  clock.as_of,
        }];

        // 1. Snapshot
        let snapshot = self.store.load_snapshot()?;
        if snapshot.is_empty() {
            return Err(HealthError::NoCustomers);
        }

        // 2. Aggregate
        let rows = aggregate(&snapshot, clock.as_of);

        // 3. Health
        let health = self.calculator.score_all(&rows, clock.computed_at);
        let counts = category_counts(&health);
        events.push(RunEvent::HealthScored {
            customers: health.len(),
            at_risk:   counts.0,
            healthy:   counts.1,
            champions: counts.2,
        });

        // 4. Churn
        let history = label_rows(&rows);
        let (churn, model_error) = match self.predict_churn(&history, &rows, clock.computed_at, &mut events) {
            Ok(churn) => (Some(churn), None),
            Err(HealthError::Model(e)) => {
                log::warn!("Churn model unavailable, skipping churn-based alerts: {e}");
                events.push(RunEvent::ModelUnavailable { reason: e.to_string() });
                (None, Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };
        let predictions: &[ChurnPrediction] = churn.as_ref().map(|(_, p)| p.as_slice()).unwrap_or(&[]);

        // 5. Alerts
        let inputs = build_inputs(&rows, &health, predictions);
        let alerts = self.generator.generate(&inputs, clock.computed_at);
        let grouped = GroupedAlerts::from_alerts(&alerts);
        events.push(RunEvent::AlertsRaised {
            total:    alerts.len(),
            critical: grouped.critical.len(),
            high:     grouped.high.len(),
            medium:   grouped.medium.len(),
        });

        let summary = RunSummary {
            run_id:               clock.run_id.clone(),
            as_of:                Some(clock.as_of),
            customers_scored:     health.len(),
            at_risk:              counts.0,
            healthy:              counts.1,
            champions:            counts.2,
            average_health_score: average_score(&health),
            revenue_at_risk:      revenue_at_risk(&rows, &health),
            predictions:          predictions.len(),
            high_risk:            predictions.iter().filter(|p| p.risk_level == RiskLevel::High).count(),
            model_version:        churn.as_ref().map(|(v, _)| *v),
            model_error,
            alerts_critical:      grouped.critical.len(),
            alerts_high:          grouped.high.len(),
            alerts_medium:        grouped.medium.len(),
        };

        // 6. Commit
        events.push(RunEvent::RunCommitted { run_id: clock.run_id.clone() });
        let model_version = summary.model_version;
        let outputs = RunOutputs {
            health,
            predictions: churn.map(|(_, p)| p),
            model_version,
            alerts,
            events,
        };
        self.store.commit_run(clock, &outputs)?;
        log::info!(
            "Run {} committed: {} customers, {} at risk, {} alerts ({} critical)",
            clock.run_id,
            summary.customers_scored,
            summary.at_risk,
            summary.total_alerts(),
            summary.alerts_critical
        );

        // 7. Notify
        if self.config.notify && !grouped.is_empty() {
            if let Some(sink) = &self.notifier {
                if let Err(e) = sink.notify(&grouped.subject(), &grouped) {
                    log::warn!("Alert notification failed: {e}");
                }
            }
        }

        Ok(summary)
    }

    /// Train and persist a new model version from the current snapshot
    /// without scoring or committing a run.
    pub fn train_only(&mut self, clock: &RunClock) -> HealthResult<ModelVersion> {
        let snapshot = self.store.load_snapshot()?;
        if snapshot.is_empty() {
            return Err(HealthError::NoCustomers);
        }
        let rows = aggregate(&snapshot, clock.as_of);
        self.model.train(&label_rows(&rows), clock.computed_at)
    }

    fn predict_churn(
        &mut self,
        history: &[LabeledRow],
        rows: &[FeatureRow],
        now: DateTime<Utc>,
        events: &mut Vec<RunEvent>,
    ) -> HealthResult<(ModelVersion, Vec<ChurnPrediction>)> {
        let positives = history.iter().filter(|r| r.churned).count();
        let trained = |version| RunEvent::ModelTrained { version, rows: history.len(), positives };

        if self.config.retrain_each_run || self.model.state() == ModelState::Untrained {
            match self.model.train(history, now) {
                Ok(version) => events.push(trained(version)),
                // A failed retrain still leaves the last good artifact usable.
                Err(e) if self.model.state() != ModelState::Untrained => {
                    log::warn!("Retrain failed, using the existing model: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        let version = self.model.ensure_ready(history, now)?;
        let predictions = self.model.predict(rows, now)?;
        let high_risk = predictions.iter().filter(|p| p.risk_level == RiskLevel::High).count();
        events.push(RunEvent::ChurnPredicted {
            version,
            customers: predictions.len(),
            high_risk,
        });
        log::debug!("Churn model v{version} scored {} customers", predictions.len());
        Ok((version, predictions))
    }
}

fn category_counts(health: &[HealthScoreRecord]) -> (usize, usize, usize) {
    health.iter().fold((0, 0, 0), |(r, h, c), rec| match rec.health_category {
        HealthCategory::AtRisk   => (r + 1, h, c),
        HealthCategory::Healthy  => (r, h + 1, c),
        HealthCategory::Champion => (r, h, c + 1),
    })
}

fn average_score(health: &[HealthScoreRecord]) -> f64 {
    if health.is_empty() {
        return 0.0;
    }
    health.iter().map(|h| h.customer_health_score).sum::<f64>() / health.len() as f64
}

fn revenue_at_risk(rows: &[FeatureRow], health: &[HealthScoreRecord]) -> f64 {
    let mrr: HashMap<&str, f64> = rows
        .iter()
        .map(|r| (r.customer_id.as_str(), r.monthly_recurring_revenue))
        .collect();
    health
        .iter()
        .filter(|h| h.health_category == HealthCategory::AtRisk)
        .filter_map(|h| mrr.get(h.customer_id.as_str()))
        .sum()
}
