//! Churn model: supervised churn-probability estimation.
//!
//! The model is a three-state machine:
//!   1. Untrained  no artifact in the store
//!   2. Trained    an artifact is persisted but not loaded in this run
//!   3. Loaded     the artifact is in memory and can score rows
//!
//! train() moves to Trained and replaces any prior artifact wholesale.
//! load() moves Trained to Loaded. ensure_ready() walks whatever
//! transitions are missing, which is how a run recovers from an empty
//! store: it trains from history instead of failing.

pub mod artifact;
pub mod features;
pub mod forest;
pub mod scaler;

use self::{
    artifact::{ArtifactStore, ModelArtifact},
    features::{feature_vector, LabeledRow, FEATURE_COUNT, FEATURE_NAMES},
    forest::RandomForest,
    scaler::StandardScaler,
};
use crate::{
    aggregator::FeatureRow,
    config::ChurnModelConfig,
    error::{HealthError, HealthResult, ModelError},
    types::{CustomerId, ModelVersion},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Low below `low_cut`, High above `high_cut`, Medium in between
    /// (both cut points inclusive to Medium).
    pub fn from_probability(p: f64, low_cut: f64, high_cut: f64) -> Self {
        if p < low_cut {
            Self::Low
        } else if p > high_cut {
            Self::High
        } else {
            Self::Medium
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low    => "Low",
            Self::Medium => "Medium",
            Self::High   => "High",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Low"    => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High"   => Some(Self::High),
            _        => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChurnPrediction {
    pub customer_id:       CustomerId,
    pub contract_value:    f64,
    pub churn_probability: f64,
    pub risk_level:        RiskLevel,
    pub computed_at:       DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Untrained,
    Trained,
    Loaded { version: ModelVersion },
}

// ── Model ────────────────────────────────────────────────────────────────────

pub struct ChurnModel {
    config:   ChurnModelConfig,
    store:    Box<dyn ArtifactStore>,
    state:    ModelState,
    artifact: Option<ModelArtifact>,
}

impl ChurnModel {
    /// Starts Trained if the store already holds an artifact, else Untrained.
    /// Invalid cut points or forest shape are replaced by the defaults.
    pub fn new(config: ChurnModelConfig, store: Box<dyn ArtifactStore>) -> HealthResult<Self> {
        let state = if store.exists()? { ModelState::Trained } else { ModelState::Untrained };
        Ok(Self { config: config.sanitized(), store, state, artifact: None })
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.artifact.as_ref()
    }

    /// Fit scaler and forest on `rows` and persist them as the next version.
    /// Fails without touching the store if there is nothing to learn from.
    pub fn train(&mut self, rows: &[LabeledRow], trained_at: DateTime<Utc>) -> HealthResult<ModelVersion> {
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet.into());
        }
        let positives = rows.iter().filter(|r| r.churned).count();
        if positives == 0 {
            return Err(ModelError::DegenerateTrainingSet { rows: rows.len(), positives }.into());
        }
        if let Some(bad) = rows.iter().find(|r| r.features.len() != FEATURE_COUNT) {
            return Err(ModelError::FeatureMismatch {
                expected: FEATURE_COUNT,
                actual:   bad.features.len(),
            }
            .into());
        }

        let raw: Vec<Vec<f64>> = rows.iter().map(|r| r.features.clone()).collect();
        let labels: Vec<bool> = rows.iter().map(|r| r.churned).collect();
        let scaler = StandardScaler::fit(&raw, FEATURE_COUNT);
        let scaled: Vec<Vec<f64>> = raw.iter().map(|r| scaler.transform(r)).collect();
        let forest = RandomForest::fit(&scaled, &labels, &self.config);

        let version = self.next_version()?;
        let artifact = ModelArtifact {
            version,
            trained_at,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            scaler,
            forest,
            training_rows: rows.len(),
            positive_rows: positives,
        };
        self.store.save(&artifact)?;

        self.artifact = None;
        self.state = ModelState::Trained;
        log::info!(
            "churn: trained model v{version} on {} rows ({positives} churned)",
            rows.len()
        );
        Ok(version)
    }

    /// Read the persisted artifact into memory.
    pub fn load(&mut self) -> HealthResult<ModelVersion> {
        let artifact = self.store.load_latest()?.ok_or(ModelError::ArtifactMissing)?;
        if artifact.scaler.width() != FEATURE_COUNT || artifact.feature_names.len() != FEATURE_COUNT {
            return Err(ModelError::FeatureMismatch {
                expected: FEATURE_COUNT,
                actual:   artifact.scaler.width(),
            }
            .into());
        }
        let version = artifact.version;
        self.artifact = Some(artifact);
        self.state = ModelState::Loaded { version };
        log::debug!("churn: loaded model v{version}");
        Ok(version)
    }

    /// Walk Untrained → Trained → Loaded as needed. An unreadable stored
    /// artifact is replaced by a model trained from `history`.
    pub fn ensure_ready(&mut self, history: &[LabeledRow], now: DateTime<Utc>) -> HealthResult<ModelVersion> {
        if self.state == ModelState::Untrained {
            log::info!("churn: no model artifact found, training from history");
            self.train(history, now)?;
        }
        if let ModelState::Loaded { version } = self.state {
            return Ok(version);
        }
        match self.load() {
            Err(HealthError::Model(ModelError::ArtifactUnreadable(reason))) => {
                log::warn!("churn: stored artifact unreadable ({reason}), retraining from history");
                self.state = ModelState::Untrained;
                self.train(history, now)?;
                self.load()
            }
            loaded => loaded,
        }
    }

    /// Score every active row (contract not ended). Sorted by probability
    /// descending, ties by customer_id ascending.
    pub fn predict(&self, rows: &[FeatureRow], computed_at: DateTime<Utc>) -> HealthResult<Vec<ChurnPrediction>> {
        let artifact = match (&self.state, &self.artifact) {
            (ModelState::Loaded { .. }, Some(a)) => a,
            _ => return Err(ModelError::NotLoaded.into()),
        };

        let mut predictions: Vec<ChurnPrediction> = rows
            .iter()
            .filter(|r| r.is_active())
            .map(|r| {
                let x = artifact.scaler.transform(&feature_vector(r));
                let p = artifact.forest.predict_proba(&x);
                ChurnPrediction {
                    customer_id:       r.customer_id.clone(),
                    contract_value:    r.contract_value,
                    churn_probability: p,
                    risk_level:        RiskLevel::from_probability(
                        p,
                        self.config.low_risk_cut,
                        self.config.high_risk_cut,
                    ),
                    computed_at,
                }
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.churn_probability
                .total_cmp(&a.churn_probability)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });
        Ok(predictions)
    }

    /// ensure_ready() followed by predict().
    pub fn predict_with_recovery(
        &mut self,
        history: &[LabeledRow],
        rows: &[FeatureRow],
        now: DateTime<Utc>,
    ) -> HealthResult<Vec<ChurnPrediction>> {
        self.ensure_ready(history, now)?;
        self.predict(rows, now)
    }

    fn next_version(&self) -> HealthResult<ModelVersion> {
        if let Some(a) = &self.artifact {
            return Ok(a.version + 1);
        }
        match self.store.load_latest() {
            Ok(latest) => Ok(latest.map_or(1, |a| a.version + 1)),
            // An unreadable artifact has no usable version; overwrite it.
            Err(HealthError::Model(ModelError::ArtifactUnreadable(reason))) => {
                log::warn!("churn: ignoring unreadable artifact ({reason})");
                Ok(1)
            }
            Err(e) => Err(e),
        }
    }
}
