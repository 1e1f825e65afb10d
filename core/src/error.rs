use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed {entity} record '{id}': {reason}")]
    Data {
        entity: &'static str,
        id:     String,
        reason: String,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No customers in snapshot")]
    NoCustomers,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HealthError {
    pub fn data(entity: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Data { entity, id: id.into(), reason: reason.into() }
    }
}

/// Churn model failures. These never abort a run: the engine skips the
/// churn-dependent alert rules and keeps the deterministic health score.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Degenerate training set: {positives} churned out of {rows} rows")]
    DegenerateTrainingSet { rows: usize, positives: usize },

    #[error("No model artifact in the store")]
    ArtifactMissing,

    #[error("No model artifact loaded")]
    NotLoaded,

    #[error("Feature width mismatch: artifact expects {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Model artifact unreadable: {0}")]
    ArtifactUnreadable(String),

    #[error("Model artifact could not be written: {0}")]
    ArtifactUnwritable(String),
}

pub type HealthResult<T> = Result<T, HealthError>;
