#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Tactica engine: learns which tactical principles go with a (category, block, weekday, season)
//! combination, ranks historical microcycles by similarity, and estimates weekly workload.

/// Tabular planning records and CSV loading.
#[path = "../records.rs"]
pub mod records;

/// Categorical and multi-label encoders.
#[path = "../encoding/main.rs"]
pub mod encoding;

/// Feature normalization and encoding shared by training and inference.
#[path = "../features.rs"]
pub mod features;

/// Bagged decision-tree classifiers.
#[path = "../forest/main.rs"]
pub mod forest;

/// Training pipeline: validation, grouping, split, fit, evaluation.
#[path = "../training/main.rs"]
pub mod training;

/// Versioned trained artifact.
#[path = "../artifact.rs"]
pub mod artifact;

/// Confidence-scored principle suggestions.
#[path = "../inference.rs"]
pub mod inference;

/// Nearest-microcycle ranking.
#[path = "../similarity.rs"]
pub mod similarity;

/// Weekly workload estimation.
#[path = "../workload.rs"]
pub mod workload;

/// Artifact persistence with backup and quarantine.
#[path = "../store.rs"]
pub mod store;

/// TOML-backed engine configuration.
#[path = "../config.rs"]
pub mod config;

/// Structured logging handle for engine components.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Process-wide service owning the current model.
#[path = "../service.rs"]
pub mod service;

pub use artifact::{ModelArtifact, ModelStatus, TrainingStats, SCHEMA_VERSION};
pub use config::EngineConfig;
pub use encoding::{CategoricalEncoder, EncodingError, LabelSetEncoder, UNSEEN_CODE};
pub use features::{EncodedFeatureVector, FeaturePipeline, FeatureTuple};
pub use forest::{ForestConfig, MultiLabelForest};
pub use inference::{InferenceConfig, InferenceEngine, InferenceError, Prediction, PredictionQuery};
pub use records::{DataSummary, PlanningRecord, Readiness, RecordError, RecordTable};
pub use service::{PredictionService, ServiceError, TrainingOutcome};
pub use similarity::{SimilarityEngine, SimilarityError, SimilarityResult};
pub use store::{ModelStore, StoreError};
pub use telemetry::{EngineTelemetry, EngineTelemetryBuilder};
pub use training::{TrainingConfig, TrainingEngine, TrainingError, TrainingExample};
pub use workload::{WorkloadError, WorkloadEstimate, WorkloadEstimator, WorkloadRange};
