//! Turns planning records into a trained [`ModelArtifact`](crate::artifact::ModelArtifact).

/// Record validation, grouping and model fitting.
pub mod engine;
/// Multi-label evaluation metrics.
pub mod metrics;
/// Seeded train/validation partitioning.
pub mod split;

pub use engine::{TrainingConfig, TrainingEngine, TrainingError, TrainingExample};
pub use metrics::{EvaluationError, EvaluationMetrics};
pub use split::train_validation_split;
