use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use tactica_logging::LogLevel;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    artifact::{ModelArtifact, ModelStatus, TrainingStats},
    config::EngineConfig,
    inference::{InferenceEngine, InferenceError, Prediction, PredictionQuery},
    records::PlanningRecord,
    similarity::{SimilarityEngine, SimilarityError, SimilarityResult},
    store::{ModelStore, StoreError},
    telemetry::{self, EngineTelemetry},
    training::{TrainingEngine, TrainingError},
    workload::{WorkloadError, WorkloadEstimate, WorkloadEstimator},
};

/// Any failure surfaced by [`PredictionService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Training rejected the data.
    #[error(transparent)]
    Training(#[from] TrainingError),
    /// A prediction could not be served.
    #[error(transparent)]
    Inference(#[from] InferenceError),
    /// A similarity query failed.
    #[error(transparent)]
    Similarity(#[from] SimilarityError),
    /// A workload estimate failed.
    #[error(transparent)]
    Workload(#[from] WorkloadError),
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`PredictionService::train`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingOutcome {
    /// Identifier of the new artifact.
    pub artifact_id: Uuid,
    /// Its training summary.
    pub stats: TrainingStats,
    /// Whether the artifact reached disk.
    pub persisted: bool,
    /// Why persisting failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

/// Owns the current model. Reads share a snapshot; training and reset are serialized
/// and swap the snapshot only once a new artifact is complete.
pub struct PredictionService {
    store: ModelStore,
    trainer: TrainingEngine,
    inference: InferenceEngine,
    similarity: SimilarityEngine,
    workload: WorkloadEstimator,
    current: RwLock<Option<Arc<ModelArtifact>>>,
    training_lock: Mutex<()>,
    telemetry: Option<EngineTelemetry>,
}

impl PredictionService {
    /// Builds the components from `config` and loads any stored artifact.
    ///
    /// A missing or unreadable artifact leaves the service untrained; only a
    /// telemetry setup failure is an error.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let telemetry = config.telemetry("tactica.service")?;
        let service = Self {
            store: ModelStore::new(&config.model_path)
                .with_telemetry(telemetry.component("tactica.store")),
            trainer: TrainingEngine::new(config.training.clone())
                .with_telemetry(telemetry.component("tactica.training")),
            inference: InferenceEngine::new(config.inference.clone())
                .with_telemetry(telemetry.component("tactica.inference")),
            similarity: SimilarityEngine::new()
                .with_telemetry(telemetry.component("tactica.similarity")),
            workload: WorkloadEstimator::new()
                .with_telemetry(telemetry.component("tactica.workload")),
            current: RwLock::new(None),
            training_lock: Mutex::new(()),
            telemetry: Some(telemetry),
        };
        match service.reload() {
            Ok(()) | Err(StoreError::NotFound { .. } | StoreError::Corrupted { .. }) => {}
            Err(err) => service.log(
                LogLevel::Error,
                "artifact_load_failed",
                json!({ "error": err.to_string() }),
            ),
        }
        Ok(service)
    }

    /// Assembles a service from prebuilt parts, initially untrained.
    #[must_use]
    pub fn new(store: ModelStore, trainer: TrainingEngine, inference: InferenceEngine) -> Self {
        Self {
            store,
            trainer,
            inference,
            similarity: SimilarityEngine::new(),
            workload: WorkloadEstimator::new(),
            current: RwLock::new(None),
            training_lock: Mutex::new(()),
            telemetry: None,
        }
    }

    /// Replaces the current model with the stored one. On failure the service is untrained.
    pub fn reload(&self) -> Result<(), StoreError> {
        let _guard = self.training_lock.lock();
        match self.store.load() {
            Ok(artifact) => {
                *self.current.write() = Some(Arc::new(artifact));
                Ok(())
            }
            Err(err) => {
                *self.current.write() = None;
                Err(err)
            }
        }
    }

    /// Current model, if any. The snapshot stays valid across later retrains.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<ModelArtifact>> {
        self.current.read().clone()
    }

    /// True when a model is loaded.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.current.read().is_some()
    }

    /// Status of the loaded model.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        self.snapshot()
            .map_or_else(ModelStatus::untrained, |artifact| artifact.status())
    }

    /// Trains on `records`, persists, and swaps in the new model.
    ///
    /// Encoders of the previous model are extended rather than rebuilt. A save failure
    /// still swaps the model in and is reported in the outcome.
    pub fn train(&self, records: &[PlanningRecord]) -> Result<TrainingOutcome, ServiceError> {
        let _guard = self.training_lock.lock();
        let previous = self.snapshot();
        let artifact = self
            .trainer
            .train_with(records, previous.as_deref().map(|a| &a.feature_pipeline))?;
        let persist_error = self.store.save(&artifact).err().map(|err| err.to_string());
        let outcome = TrainingOutcome {
            artifact_id: artifact.id,
            stats: artifact.training_stats.clone(),
            persisted: persist_error.is_none(),
            persist_error,
        };
        *self.current.write() = Some(Arc::new(artifact));
        self.log(
            LogLevel::Info,
            "model_swapped",
            json!({
                "artifact_id": outcome.artifact_id.to_string(),
                "persisted": outcome.persisted,
            }),
        );
        Ok(outcome)
    }

    /// Suggestions for a combination; `top_n` defaults to the configured count.
    pub fn predict(
        &self,
        query: &PredictionQuery,
        top_n: Option<usize>,
    ) -> Result<Vec<Prediction>, ServiceError> {
        let model = self.snapshot();
        let top_n = top_n.unwrap_or(self.inference.config().default_top_n);
        Ok(self.inference.predict(model.as_deref(), query, top_n)?)
    }

    /// Microcycles most similar to `reference`.
    pub fn similar(
        &self,
        records: &[PlanningRecord],
        reference: &str,
        k: usize,
    ) -> Result<Vec<SimilarityResult>, ServiceError> {
        Ok(self.similarity.nearest(records, reference, k)?)
    }

    /// Weekly load estimate for `category`.
    pub fn workload(
        &self,
        records: &[PlanningRecord],
        category: &str,
    ) -> Result<WorkloadEstimate, ServiceError> {
        Ok(self.workload.estimate(records, category)?)
    }

    /// Moves the stored artifact aside and forgets the loaded model.
    pub fn reset(&self) -> Result<Option<PathBuf>, ServiceError> {
        let _guard = self.training_lock.lock();
        let backup = self.store.reset()?;
        *self.current.write() = None;
        self.log(
            LogLevel::Info,
            "model_reset",
            json!({ "backup": backup.as_ref().map(|p| p.display().to_string()) }),
        );
        Ok(backup)
    }

    /// Underlying store.
    #[must_use]
    pub const fn store(&self) -> &ModelStore {
        &self.store
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        telemetry::log(self.telemetry.as_ref(), level, message, metadata);
    }
}
