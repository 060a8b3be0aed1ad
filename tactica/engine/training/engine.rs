use std::collections::BTreeSet;

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tactica_logging::LogLevel;
use thiserror::Error;

use super::{
    metrics::{self, EvaluationError, EvaluationMetrics},
    split::train_validation_split,
};
use crate::{
    artifact::{ModelArtifact, TrainingStats},
    encoding::{EncodingError, LabelSetEncoder},
    features::{FeaturePipeline, FeatureTuple, FEATURE_COUNT},
    forest::{ForestConfig, MultiLabelForest},
    records::{PlanningRecord, PRINCIPLE_COLUMN, TRAINING_COLUMNS},
    telemetry::{self, EngineTelemetry},
};

/// Training hyper-parameters and data thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Minimum complete records, and minimum distinct combinations, required to train.
    pub min_samples: usize,
    /// Fraction of examples held out for validation.
    pub validation_ratio: f64,
    /// Seed for the split and the forests.
    pub seed: u64,
    /// Forest hyper-parameters.
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            validation_ratio: 0.2,
            seed: 42,
            forest: ForestConfig::default(),
        }
    }
}

/// One grouped training row: a combination and every principle recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Normalized combination.
    pub features: FeatureTuple,
    /// Principles recorded for the combination.
    pub labels: BTreeSet<String>,
}

/// Reasons a training run is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainingError {
    /// Too few usable rows or combinations.
    #[error("insufficient data: {reason}")]
    InsufficientData {
        /// What fell short and by how much.
        reason: String,
    },
    /// Required columns with no value in any row.
    #[error("missing required fields: {}", fields.join(", "))]
    MissingFields {
        /// Absent column names.
        fields: Vec<String>,
    },
    /// Label encoding failed.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Builds model artifacts from planning records.
#[derive(Debug, Clone, Default)]
pub struct TrainingEngine {
    config: TrainingConfig,
    telemetry: Option<EngineTelemetry>,
}

impl TrainingEngine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub const fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EngineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains from scratch.
    pub fn train(&self, records: &[PlanningRecord]) -> Result<ModelArtifact, TrainingError> {
        self.train_with(records, None)
    }

    /// Trains, extending `previous` encoders so known values keep their codes.
    pub fn train_with(
        &self,
        records: &[PlanningRecord],
        previous: Option<&FeaturePipeline>,
    ) -> Result<ModelArtifact, TrainingError> {
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "training_started",
            json!({ "records": records.len() }),
        );
        let result = self.fit(records, previous);
        match &result {
            Ok(artifact) => telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Info,
                "training_complete",
                json!({
                    "artifact_id": artifact.id.to_string(),
                    "examples": artifact.training_stats.example_count,
                    "labels": artifact.training_stats.label_count,
                    "accuracy": artifact.training_stats.accuracy,
                    "f1": artifact.training_stats.f1,
                }),
            ),
            Err(err) => telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Warn,
                "training_rejected",
                json!({ "reason": err.to_string() }),
            ),
        }
        result
    }

    /// Validates and normalizes records into `(combination, principle)` pairs.
    pub fn clean(
        &self,
        records: &[PlanningRecord],
    ) -> Result<Vec<(FeatureTuple, String)>, TrainingError> {
        if records.is_empty() {
            return Err(TrainingError::InsufficientData {
                reason: "no records to process".into(),
            });
        }
        let missing: Vec<String> = TRAINING_COLUMNS
            .iter()
            .filter(|column| records.iter().all(|r| r.field(column).is_none()))
            .map(|column| (*column).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(TrainingError::MissingFields { fields: missing });
        }
        let cleaned: Vec<(FeatureTuple, String)> = records
            .iter()
            .filter_map(|record| {
                Some((
                    FeatureTuple::from_record(record)?,
                    record.normalized(PRINCIPLE_COLUMN)?,
                ))
            })
            .collect();
        if cleaned.is_empty() || cleaned.len() < self.config.min_samples {
            return Err(TrainingError::InsufficientData {
                reason: format!(
                    "need at least {} complete records, have {}",
                    self.config.min_samples.max(1),
                    cleaned.len()
                ),
            });
        }
        Ok(cleaned)
    }

    fn fit(
        &self,
        records: &[PlanningRecord],
        previous: Option<&FeaturePipeline>,
    ) -> Result<ModelArtifact, TrainingError> {
        let cleaned = self.clean(records)?;
        let examples = group_examples(&cleaned);
        if examples.len() < self.config.min_samples {
            return Err(TrainingError::InsufficientData {
                reason: format!(
                    "need at least {} distinct combinations, have {}",
                    self.config.min_samples,
                    examples.len()
                ),
            });
        }

        let mut pipeline = previous.cloned().unwrap_or_default();
        pipeline.fit(&examples);
        let mut label_encoder = LabelSetEncoder::default();
        label_encoder.fit(examples.iter().map(|example| &example.labels));

        let x = feature_matrix(&pipeline, &examples);
        let y = label_matrix(&label_encoder, &examples)?;
        let (train_rows, validation_rows) =
            train_validation_split(examples.len(), self.config.validation_ratio, self.config.seed);
        let classifier = MultiLabelForest::fit(
            x.select(Axis(0), &train_rows).view(),
            y.select(Axis(0), &train_rows).view(),
            &self.config.forest,
            self.config.seed,
        );
        let metrics = self.evaluate(
            &classifier,
            x.select(Axis(0), &validation_rows).view(),
            y.select(Axis(0), &validation_rows).view(),
        );

        let stats = TrainingStats {
            trained_at: Utc::now(),
            record_count: cleaned.len(),
            example_count: examples.len(),
            accuracy: metrics.accuracy,
            f1: metrics.f1_macro,
            known_categories: distinct(cleaned.iter().map(|(f, _)| f.category.as_str())),
            known_blocks: distinct(cleaned.iter().map(|(f, _)| f.block.as_str())),
            known_weekdays: distinct(cleaned.iter().map(|(f, _)| f.weekday.as_str())),
            label_count: label_encoder.width(),
        };
        Ok(ModelArtifact::new(pipeline, label_encoder, classifier, stats))
    }

    /// Scores the classifier on held-out rows; failures are logged and scored as zero.
    fn evaluate(
        &self,
        classifier: &MultiLabelForest,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, u8>,
    ) -> EvaluationMetrics {
        let predicted: Vec<u8> = x
            .outer_iter()
            .flat_map(|row| classifier.predict(&row.to_vec()))
            .collect();
        let result = Array2::from_shape_vec((x.nrows(), classifier.len()), predicted)
            .map_err(|_| EvaluationError::ShapeMismatch {
                expected: y.dim(),
                got: (x.nrows(), classifier.len()),
            })
            .and_then(|predicted| metrics::evaluate(y, predicted.view()));
        match result {
            Ok(metrics) => metrics,
            Err(err) => {
                telemetry::log(
                    self.telemetry.as_ref(),
                    LogLevel::Warn,
                    "evaluation_skipped",
                    json!({ "reason": err.to_string() }),
                );
                EvaluationMetrics::default()
            }
        }
    }
}

/// Groups cleaned rows by combination, in first-seen order.
#[must_use]
pub fn group_examples(cleaned: &[(FeatureTuple, String)]) -> Vec<TrainingExample> {
    let mut groups: IndexMap<&FeatureTuple, BTreeSet<String>> = IndexMap::new();
    for (features, principle) in cleaned {
        groups.entry(features).or_default().insert(principle.clone());
    }
    groups
        .into_iter()
        .map(|(features, labels)| TrainingExample {
            features: features.clone(),
            labels,
        })
        .collect()
}

fn feature_matrix(pipeline: &FeaturePipeline, examples: &[TrainingExample]) -> Array2<f64> {
    let mut x = Array2::zeros((examples.len(), FEATURE_COUNT));
    for (mut row, example) in x.outer_iter_mut().zip(examples) {
        let encoded = pipeline.transform(&example.features).to_row();
        for (cell, value) in row.iter_mut().zip(encoded) {
            *cell = value;
        }
    }
    x
}

fn label_matrix(
    encoder: &LabelSetEncoder,
    examples: &[TrainingExample],
) -> Result<Array2<u8>, TrainingError> {
    let mut y = Array2::zeros((examples.len(), encoder.width()));
    for (mut row, example) in y.outer_iter_mut().zip(examples) {
        for (cell, bit) in row.iter_mut().zip(encoder.encode(&example.labels)?) {
            *cell = bit;
        }
    }
    Ok(y)
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<IndexSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORIES: [&str; 3] = ["Cadete", "Juvenil", "Infantil"];
    const BLOCKS: [&str; 2] = ["Inicial", "Final"];
    const WEEKDAYS: [&str; 2] = ["Lunes", "Miercoles"];

    fn dataset() -> Vec<PlanningRecord> {
        let mut records = Vec::new();
        for category in CATEGORIES {
            for block in BLOCKS {
                for weekday in WEEKDAYS {
                    records.push(
                        PlanningRecord::new(category, block, weekday, "Amplitud")
                            .with_season("2024-03"),
                    );
                    if weekday == "Lunes" {
                        records.push(
                            PlanningRecord::new(category, block, weekday, "Presion alta")
                                .with_season("2024-03"),
                        );
                    }
                }
            }
        }
        records
    }

    #[test]
    fn trains_on_twelve_combinations() {
        let engine = TrainingEngine::new(TrainingConfig::default());
        let artifact = engine.train(&dataset()).unwrap();
        assert!(artifact.is_trained());
        let stats = &artifact.training_stats;
        assert_eq!(stats.record_count, 18);
        assert_eq!(stats.example_count, 12);
        assert_eq!(stats.label_count, 2);
        assert_eq!(stats.known_categories, vec!["Cadete", "Juvenil", "Infantil"]);
        assert_eq!(stats.known_weekdays, vec!["Lunes", "Miercoles"]);
        assert!((0.0..=1.0).contains(&stats.accuracy));
        assert!((0.0..=1.0).contains(&stats.f1));
        assert_eq!(artifact.classifier.len(), 2);
    }

    #[test]
    fn groups_rows_into_label_sets() {
        let cleaned = TrainingEngine::default().clean(&dataset()).unwrap();
        let examples = group_examples(&cleaned);
        assert_eq!(examples.len(), 12);
        let first = &examples[0];
        assert_eq!(first.features.category, "Cadete");
        assert_eq!(first.features.season_month, 3);
        assert_eq!(first.labels.len(), 2);
    }

    #[test]
    fn rejects_too_few_combinations() {
        let records: Vec<PlanningRecord> = ["Lunes", "Martes", "Jueves", "Viernes"]
            .iter()
            .flat_map(|day| {
                (0..3).map(move |i| PlanningRecord::new("Cadete", "Inicial", *day, format!("P{i}")))
            })
            .collect();
        let err = TrainingEngine::default().train(&records).unwrap_err();
        assert_eq!(
            err,
            TrainingError::InsufficientData {
                reason: "need at least 10 distinct combinations, have 4".into()
            }
        );
    }

    #[test]
    fn rejects_empty_and_incomplete_input() {
        let engine = TrainingEngine::default();
        assert!(matches!(
            engine.train(&[]),
            Err(TrainingError::InsufficientData { .. })
        ));

        let no_principles: Vec<PlanningRecord> = dataset()
            .into_iter()
            .map(|mut r| {
                r.principle = None;
                r
            })
            .collect();
        assert_eq!(
            engine.train(&no_principles).unwrap_err(),
            TrainingError::MissingFields {
                fields: vec!["principio".into()]
            }
        );

        let blanks: Vec<PlanningRecord> = (0..12)
            .map(|i| PlanningRecord::new("Cadete", " ", "Lunes", format!("P{i}")).with_unit("x"))
            .chain(std::iter::once(PlanningRecord::new(
                "Cadete", "Inicial", "Lunes", "P",
            )))
            .collect();
        assert!(matches!(
            engine.train(&blanks),
            Err(TrainingError::InsufficientData { reason }) if reason.contains("complete records")
        ));
    }

    #[test]
    fn same_seed_trains_identical_classifiers() {
        let engine = TrainingEngine::default();
        let a = engine.train(&dataset()).unwrap();
        let b = engine.train(&dataset()).unwrap();
        assert_eq!(a.classifier, b.classifier);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn retraining_extends_previous_encoders() {
        let engine = TrainingEngine::default();
        let first = engine.train(&dataset()).unwrap();
        let mut records = dataset();
        records.push(PlanningRecord::new("Senior", "Inicial", "Lunes", "Amplitud"));
        records.retain(|r| r.category.as_deref() != Some("Cadete"));
        records.extend(dataset().into_iter().filter(|r| r.category.as_deref() == Some("Cadete")));
        let second = engine
            .train_with(&records, Some(&first.feature_pipeline))
            .unwrap();
        let before = first.feature_pipeline.encoder("categoria").unwrap();
        let after = second.feature_pipeline.encoder("categoria").unwrap();
        for category in CATEGORIES {
            assert_eq!(before.encode(category), after.encode(category));
        }
        assert_eq!(after.encode("Senior"), 3);
    }

    #[test]
    fn failed_evaluation_scores_zero_and_still_trains() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("training.log");
        let telemetry = EngineTelemetry::builder("tactica.training")
            .log_path(&log_path)
            .build()
            .unwrap();
        let engine = TrainingEngine::new(TrainingConfig {
            min_samples: 1,
            ..TrainingConfig::default()
        })
        .with_telemetry(telemetry);
        let artifact = engine
            .train(&[PlanningRecord::new("Cadete", "Inicial", "Lunes", "Amplitud")])
            .unwrap();
        assert!(artifact.is_trained());
        assert_eq!(artifact.training_stats.example_count, 1);
        assert!(artifact.training_stats.accuracy.abs() < f64::EPSILON);
        assert!(artifact.training_stats.f1.abs() < f64::EPSILON);

        let log = std::fs::read_to_string(&log_path).unwrap();
        let skipped = log
            .lines()
            .find(|line| line.contains("evaluation_skipped"))
            .unwrap();
        assert!(skipped.contains("\"WARN\""));
    }
}
