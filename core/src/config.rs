//! Engine configuration.
//!
//! Every tunable lives in an explicit value object that is passed into
//! the component that uses it. Defaults are named constants; nothing
//! here is process-wide state.

use crate::error::{HealthError, HealthResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

// ── Health score weights ───────────────────────────────────────────

pub const DEFAULT_USAGE_WEIGHT:        f64 = 0.30;
pub const DEFAULT_SUPPORT_WEIGHT:      f64 = 0.25;
pub const DEFAULT_SECURITY_WEIGHT:     f64 = 0.25;
pub const DEFAULT_SATISFACTION_WEIGHT: f64 = 0.20;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthWeights {
    pub usage:        f64,
    pub support:      f64,
    pub security:     f64,
    pub satisfaction: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            usage:        DEFAULT_USAGE_WEIGHT,
            support:      DEFAULT_SUPPORT_WEIGHT,
            security:     DEFAULT_SECURITY_WEIGHT,
            satisfaction: DEFAULT_SATISFACTION_WEIGHT,
        }
    }
}

impl HealthWeights {
    /// Weights must be finite, non-negative, and sum to 1.0.
    pub fn validate(&self) -> HealthResult<()> {
        let all = [self.usage, self.support, self.security, self.satisfaction];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(HealthError::Config(format!("negative or non-finite health weight in {all:?}")));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(HealthError::Config(format!("health weights sum to {sum}, expected 1.0")));
        }
        Ok(())
    }

    /// The weights themselves if valid, otherwise the defaults.
    pub fn or_default(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                log::warn!("{e}; using default health weights");
                Self::default()
            }
        }
    }
}

// ── Alert thresholds ───────────────────────────────────────────────

pub const DEFAULT_HIGH_CHURN_PROBABILITY:   f64 = 0.7;
pub const DEFAULT_MEDIUM_CHURN_PROBABILITY: f64 = 0.3;
pub const DEFAULT_HIGH_VALUE_CUSTOMER:      f64 = 50_000.0;
pub const DEFAULT_CRITICAL_INCIDENTS:       u32 = 5;
pub const DEFAULT_LOW_SATISFACTION:         f64 = 3.0;

/// Fractional change in usage at or below which USAGE_DECLINE fires.
pub const USAGE_DECLINE_TREND: f64 = -0.30;

/// Recognized keys for a key-value threshold source.
pub const THRESHOLD_KEYS: [&str; 5] = [
    "high_churn_probability",
    "medium_churn_probability",
    "high_value_customer",
    "critical_incidents",
    "low_satisfaction",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertThresholds {
    pub high_churn_probability:   f64,
    pub medium_churn_probability: f64,
    pub high_value_customer:      f64,
    pub critical_incidents:       u32,
    pub low_satisfaction:         f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            high_churn_probability:   DEFAULT_HIGH_CHURN_PROBABILITY,
            medium_churn_probability: DEFAULT_MEDIUM_CHURN_PROBABILITY,
            high_value_customer:      DEFAULT_HIGH_VALUE_CUSTOMER,
            critical_incidents:       DEFAULT_CRITICAL_INCIDENTS,
            low_satisfaction:         DEFAULT_LOW_SATISFACTION,
        }
    }
}

impl AlertThresholds {
    pub fn validate(&self) -> HealthResult<()> {
        let probability = |name: &str, p: f64| -> HealthResult<()> {
            if (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(HealthError::Config(format!("{name}={p} is not a probability")))
            }
        };
        probability("high_churn_probability", self.high_churn_probability)?;
        probability("medium_churn_probability", self.medium_churn_probability)?;
        if self.medium_churn_probability > self.high_churn_probability {
            return Err(HealthError::Config(format!(
                "medium_churn_probability={} exceeds high_churn_probability={}",
                self.medium_churn_probability, self.high_churn_probability
            )));
        }
        if !self.high_value_customer.is_finite() || self.high_value_customer < 0.0 {
            return Err(HealthError::Config(format!(
                "high_value_customer={} must be a non-negative amount",
                self.high_value_customer
            )));
        }
        if !self.low_satisfaction.is_finite() {
            return Err(HealthError::Config("low_satisfaction is not finite".into()));
        }
        Ok(())
    }

    /// Build thresholds from a key-value source. Every recognized key is
    /// required; unknown keys are ignored with a warning.
    pub fn from_key_values(values: &HashMap<String, f64>) -> HealthResult<Self> {
        for key in values.keys() {
            if !THRESHOLD_KEYS.contains(&key.as_str()) {
                log::warn!("Ignoring unknown alert threshold '{key}'");
            }
        }
        let get = |key: &str| -> HealthResult<f64> {
            values
                .get(key)
                .copied()
                .ok_or_else(|| HealthError::Config(format!("missing alert threshold '{key}'")))
        };

        let critical = get("critical_incidents")?;
        if !critical.is_finite() || critical < 0.0 || critical.fract() != 0.0 {
            return Err(HealthError::Config(format!(
                "critical_incidents={critical} must be a non-negative whole number"
            )));
        }

        let thresholds = Self {
            high_churn_probability:   get("high_churn_probability")?,
            medium_churn_probability: get("medium_churn_probability")?,
            high_value_customer:      get("high_value_customer")?,
            critical_incidents:       critical as u32,
            low_satisfaction:         get("low_satisfaction")?,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Build thresholds from a JSON object. Keys that are absent keep
    /// their defaults; a value that is not a number fails the whole set.
    pub fn from_json(raw: &serde_json::Value) -> HealthResult<Self> {
        let fields = raw
            .as_object()
            .ok_or_else(|| HealthError::Config(format!("alert_thresholds must be an object, got {raw}")))?;
        let mut values = Self::default().to_key_values();
        for (key, value) in fields {
            let n = value.as_f64().ok_or_else(|| {
                HealthError::Config(format!("alert threshold '{key}'={value} is not a number"))
            })?;
            values.insert(key.clone(), n);
        }
        Self::from_key_values(&values)
    }

    pub fn to_key_values(&self) -> HashMap<String, f64> {
        [
            ("high_churn_probability", self.high_churn_probability),
            ("medium_churn_probability", self.medium_churn_probability),
            ("high_value_customer", self.high_value_customer),
            ("critical_incidents", f64::from(self.critical_incidents)),
            ("low_satisfaction", self.low_satisfaction),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Resolve a possibly-failed threshold load. A ConfigError is never
    /// fatal: the built-in defaults take over.
    pub fn resolve(loaded: HealthResult<Self>) -> Self {
        match loaded.and_then(|t| t.validate().map(|()| t)) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("{e}; using default alert thresholds");
                Self::default()
            }
        }
    }
}

// ── Churn model ────────────────────────────────────────────────────

pub const DEFAULT_TREE_COUNT:       usize = 100;
pub const DEFAULT_MAX_DEPTH:        usize = 12;
pub const DEFAULT_MIN_SAMPLES_LEAF: usize = 1;
pub const DEFAULT_MODEL_SEED:       u64   = 42;
pub const DEFAULT_LOW_RISK_CUT:     f64   = 0.3;
pub const DEFAULT_HIGH_RISK_CUT:    f64   = 0.7;
/// Contracts ending within this many days are flagged `renewal_soon`.
pub const RENEWAL_HORIZON_DAYS:     i64   = 90;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChurnModelConfig {
    pub tree_count:       usize,
    pub max_depth:        usize,
    pub min_samples_leaf: usize,
    pub seed:             u64,
    /// Probabilities below this are Low risk.
    pub low_risk_cut:     f64,
    /// Probabilities above this are High risk.
    pub high_risk_cut:    f64,
}

impl ChurnModelConfig {
    /// Cut points must be probabilities with low ≤ high, and the forest
    /// needs at least one tree of depth one.
    pub fn validate(&self) -> HealthResult<()> {
        let cuts_ok = (0.0..=1.0).contains(&self.low_risk_cut)
            && (0.0..=1.0).contains(&self.high_risk_cut)
            && self.low_risk_cut <= self.high_risk_cut;
        if !cuts_ok {
            return Err(HealthError::Config(format!(
                "risk cut points low={} high={} must satisfy 0 <= low <= high <= 1",
                self.low_risk_cut, self.high_risk_cut
            )));
        }
        if self.tree_count == 0 || self.max_depth == 0 || self.min_samples_leaf == 0 {
            return Err(HealthError::Config(format!(
                "forest shape trees={} depth={} leaf={} must all be positive",
                self.tree_count, self.max_depth, self.min_samples_leaf
            )));
        }
        Ok(())
    }

    /// Invalid cut points or forest shape are replaced by the defaults;
    /// the seed is always kept.
    pub fn sanitized(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                log::warn!("{e}; using default churn model settings");
                Self { seed: self.seed, ..Self::default() }
            }
        }
    }
}

impl Default for ChurnModelConfig {
    fn default() -> Self {
        Self {
            tree_count:       DEFAULT_TREE_COUNT,
            max_depth:        DEFAULT_MAX_DEPTH,
            min_samples_leaf: DEFAULT_MIN_SAMPLES_LEAF,
            seed:             DEFAULT_MODEL_SEED,
            low_risk_cut:     DEFAULT_LOW_RISK_CUT,
            high_risk_cut:    DEFAULT_HIGH_RISK_CUT,
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(deserialize_with = "weights_or_default")]
    pub health_weights:   HealthWeights,
    #[serde(deserialize_with = "thresholds_or_default")]
    pub alert_thresholds: AlertThresholds,
    pub churn_model:      ChurnModelConfig,
    /// Retrain the churn model every run, replacing the prior artifact.
    pub retrain_each_run: bool,
    /// Forward alerts to the notification sink after commit.
    pub notify:           bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            health_weights:   HealthWeights::default(),
            alert_thresholds: AlertThresholds::default(),
            churn_model:      ChurnModelConfig::default(),
            retrain_each_run: true,
            notify:           true,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    /// Invalid weights or thresholds are replaced by defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        Ok(config.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        self.health_weights = self.health_weights.or_default();
        self.alert_thresholds = AlertThresholds::resolve(Ok(self.alert_thresholds));
        self.churn_model = self.churn_model.sanitized();
        self
    }

    /// Small forest for fast, deterministic unit tests.
    pub fn default_test() -> Self {
        Self {
            churn_model: ChurnModelConfig {
                tree_count: 15,
                max_depth: 6,
                ..ChurnModelConfig::default()
            },
            ..Self::default()
        }
    }
}

// A malformed weights or thresholds section must not fail the whole
// file, so both are read as raw JSON first.

fn weights_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<HealthWeights, D::Error> {
    let raw = serde_json::Value::deserialize(d)?;
    Ok(match serde_json::from_value::<HealthWeights>(raw) {
        Ok(w) => w.or_default(),
        Err(e) => {
            log::warn!("Unreadable health_weights ({e}); using default health weights");
            HealthWeights::default()
        }
    })
}

fn thresholds_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<AlertThresholds, D::Error> {
    let raw = serde_json::Value::deserialize(d)?;
    Ok(AlertThresholds::resolve(AlertThresholds::from_json(&raw)))
}
