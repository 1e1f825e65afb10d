//! Churn model artifact and its stores.
//!
//! The artifact bundles the fitted scaler and forest under one version
//! number; they are always saved and loaded together.
//!
//! RULE: the model never touches the filesystem directly. It is handed
//! an ArtifactStore, so tests can swap in MemoryArtifactStore.

use super::{forest::RandomForest, scaler::StandardScaler};
use crate::{
    error::{HealthError, HealthResult, ModelError},
    types::ModelVersion,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    pub version:       ModelVersion,
    pub trained_at:    DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub scaler:        StandardScaler,
    pub forest:        RandomForest,
    pub training_rows: usize,
    pub positive_rows: usize,
}

/// Persistence for the single current model artifact.
pub trait ArtifactStore: Send {
    /// Replace the stored artifact with `artifact`.
    fn save(&self, artifact: &ModelArtifact) -> HealthResult<()>;

    /// The current artifact, or None if nothing has been saved yet.
    /// A stored artifact that cannot be read or parsed is
    /// `ModelError::ArtifactUnreadable`.
    fn load_latest(&self) -> HealthResult<Option<ModelArtifact>>;

    fn exists(&self) -> HealthResult<bool>;
}

impl<T: ArtifactStore + Sync + ?Sized> ArtifactStore for Arc<T> {
    fn save(&self, artifact: &ModelArtifact) -> HealthResult<()> {
        (**self).save(artifact)
    }

    fn load_latest(&self) -> HealthResult<Option<ModelArtifact>> {
        (**self).load_latest()
    }

    fn exists(&self) -> HealthResult<bool> {
        (**self).exists()
    }
}

// ── File store ─────────────────────────────────────────────────────

pub const ARTIFACT_FILE_NAME: &str = "churn_model.json";

/// Stores the artifact as JSON in a directory. Writes go to a temp file
/// that is renamed over the previous artifact, so a concurrent reader
/// sees either the old artifact or the new one, never a partial write.
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE_NAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{ARTIFACT_FILE_NAME}.tmp-{}", std::process::id()))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn save(&self, artifact: &ModelArtifact) -> HealthResult<()> {
        let json = serde_json::to_vec(artifact)?;
        fs::create_dir_all(&self.dir).map_err(unwritable)?;
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(unwritable)?;
        if let Err(e) = fs::rename(&temp, self.artifact_path()) {
            let _ = fs::remove_file(&temp);
            return Err(unwritable(e));
        }
        log::debug!(
            "Saved churn model v{} to {}",
            artifact.version,
            self.artifact_path().display()
        );
        Ok(())
    }

    fn load_latest(&self) -> HealthResult<Option<ModelArtifact>> {
        let path = self.artifact_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(unreadable)?;
        serde_json::from_slice(&bytes).map(Some).map_err(unreadable)
    }

    fn exists(&self) -> HealthResult<bool> {
        Ok(self.artifact_path().is_file())
    }
}

fn unreadable(e: impl std::fmt::Display) -> HealthError {
    ModelError::ArtifactUnreadable(e.to_string()).into()
}

fn unwritable(e: impl std::fmt::Display) -> HealthError {
    ModelError::ArtifactUnwritable(e.to_string()).into()
}

// ── In-memory store ────────────────────────────────────────────────

/// Keeps the serialized artifact in memory. Serializing on save keeps the
/// round trip identical to the file store.
#[derive(Default)]
pub struct MemoryArtifactStore {
    slot:  Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times save() has been called.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

fn poisoned() -> HealthError {
    HealthError::Other(anyhow::anyhow!("artifact store lock poisoned"))
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, artifact: &ModelArtifact) -> HealthResult<()> {
        let json = serde_json::to_string(artifact)?;
        *self.slot.lock().map_err(|_| poisoned())? = Some(json);
        *self.saves.lock().map_err(|_| poisoned())? += 1;
        Ok(())
    }

    fn load_latest(&self) -> HealthResult<Option<ModelArtifact>> {
        let slot = self.slot.lock().map_err(|_| poisoned())?;
        match slot.as_deref() {
            Some(json) => serde_json::from_str(json).map(Some).map_err(unreadable),
            None => Ok(None),
        }
    }

    fn exists(&self) -> HealthResult<bool> {
        Ok(self.slot.lock().map_err(|_| poisoned())?.is_some())
    }
}
