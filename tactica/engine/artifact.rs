use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    encoding::{CategoricalEncoder, LabelSetEncoder},
    features::{FeaturePipeline, BLOCK_FEATURE, CATEGORY_FEATURE, WEEKDAY_FEATURE},
    forest::MultiLabelForest,
};

/// Layout version written into every artifact.
pub const SCHEMA_VERSION: u32 = 2;

/// Summary of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// When training finished.
    pub trained_at: DateTime<Utc>,
    /// Complete records used.
    pub record_count: usize,
    /// Distinct combinations (grouped examples).
    pub example_count: usize,
    /// Exact-match accuracy on the validation split.
    pub accuracy: f64,
    /// Macro F1 on the validation split.
    pub f1: f64,
    /// Categories seen in training, first-seen order.
    pub known_categories: Vec<String>,
    /// Blocks seen in training.
    pub known_blocks: Vec<String>,
    /// Weekdays seen in training.
    pub known_weekdays: Vec<String>,
    /// Width of the label space.
    pub label_count: usize,
}

impl TrainingStats {
    /// Values seen for a categorical feature in the latest training data.
    #[must_use]
    pub fn known_values(&self, feature: &str) -> &[String] {
        match feature {
            CATEGORY_FEATURE => &self.known_categories,
            BLOCK_FEATURE => &self.known_blocks,
            WEEKDAY_FEATURE => &self.known_weekdays,
            _ => &[],
        }
    }

    /// Accuracy as a one-decimal percentage, e.g. `83.3%`.
    #[must_use]
    pub fn accuracy_percentage(&self) -> String {
        format!("{:.1}%", self.accuracy * 100.0)
    }
}

/// Everything needed to answer queries: encoders, classifier and training summary.
///
/// Artifacts are immutable once built; retraining produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Identifier of this training run.
    pub id: Uuid,
    /// Layout version, compared against [`SCHEMA_VERSION`] on load.
    pub schema_version: u32,
    /// Feature encoders.
    pub feature_pipeline: FeaturePipeline,
    /// Principle encoder.
    pub label_encoder: LabelSetEncoder,
    /// One estimator per principle column.
    pub classifier: MultiLabelForest,
    /// Training summary.
    pub training_stats: TrainingStats,
}

impl ModelArtifact {
    /// Wraps freshly trained parts with a new id and the current schema version.
    #[must_use]
    pub fn new(
        feature_pipeline: FeaturePipeline,
        label_encoder: LabelSetEncoder,
        classifier: MultiLabelForest,
        training_stats: TrainingStats,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            feature_pipeline,
            label_encoder,
            classifier,
            training_stats,
        }
    }

    /// True when every part is present and the classifier matches the label width.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.label_encoder.width() > 0
            && self.classifier.len() == self.label_encoder.width()
            && self.feature_pipeline.is_fitted()
    }

    /// Feature encoders keyed by feature name.
    #[must_use]
    pub const fn feature_encoders(&self) -> &IndexMap<String, CategoricalEncoder> {
        self.feature_pipeline.encoders()
    }

    /// Status view of this artifact.
    #[must_use]
    pub fn status(&self) -> ModelStatus {
        ModelStatus::Trained {
            schema_version: self.schema_version,
            artifact_id: self.id,
            stats: self.training_stats.clone(),
        }
    }
}

/// Reported model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelStatus {
    /// No usable model is loaded.
    Untrained {
        /// What to do next.
        message: String,
    },
    /// A model is loaded.
    Trained {
        /// Schema version of the loaded artifact.
        schema_version: u32,
        /// Identifier of the loaded artifact.
        artifact_id: Uuid,
        /// Its training summary.
        stats: TrainingStats,
    },
}

impl ModelStatus {
    /// Standard untrained status.
    #[must_use]
    pub fn untrained() -> Self {
        Self::Untrained {
            message: "model not trained; load planning data and train it".into(),
        }
    }

    /// True for [`ModelStatus::Trained`].
    #[must_use]
    pub const fn is_trained(&self) -> bool {
        matches!(self, Self::Trained { .. })
    }
}
