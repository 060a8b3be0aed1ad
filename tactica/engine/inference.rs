use serde::{Deserialize, Serialize};
use serde_json::json;
use tactica_logging::LogLevel;
use thiserror::Error;

use crate::{
    artifact::ModelArtifact,
    encoding::EncodingError,
    features::{
        FeatureTuple, BLOCK_FEATURE, CATEGORICAL_FEATURES, CATEGORY_FEATURE, WEEKDAY_FEATURE,
    },
    telemetry::{self, EngineTelemetry},
};

/// Scoring thresholds for suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Multiplier applied once per unseen feature.
    pub unseen_penalty: f64,
    /// Unseen features at which a query is refused.
    pub max_unseen_features: usize,
    /// Suggestions below this adjusted confidence are dropped.
    pub min_confidence: f64,
    /// Suggestions returned when the caller does not ask for a count.
    pub default_top_n: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            unseen_penalty: 0.7,
            max_unseen_features: 2,
            min_confidence: 0.05,
            default_top_n: 5,
        }
    }
}

/// A combination to score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionQuery {
    /// Category.
    pub category: String,
    /// Block.
    pub block: String,
    /// Weekday.
    pub weekday: String,
    /// Optional `YYYY-MM` season.
    #[serde(default)]
    pub season: Option<String>,
}

impl PredictionQuery {
    /// Query without a season.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        block: impl Into<String>,
        weekday: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            block: block.into(),
            weekday: weekday.into(),
            season: None,
        }
    }

    /// Sets the season.
    #[must_use]
    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self
    }
}

/// One suggested principle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Principle name.
    pub principle: String,
    /// Adjusted confidence in `[0, 1]`.
    pub confidence: f64,
    /// Unseen-value notices shared by every suggestion of the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl Prediction {
    /// Confidence as a one-decimal percentage, e.g. `42.0%`.
    #[must_use]
    pub fn percentage(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}

/// Reasons a query gets no suggestions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// No trained model is available.
    #[error("model not trained; train it before requesting suggestions")]
    NotTrained,
    /// Query is malformed.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What is wrong.
        reason: String,
    },
    /// Too many query values were never seen in training.
    #[error(
        "combination too different from the training data ({} unseen: {})",
        unseen.len(),
        unseen.join(", ")
    )]
    TooDissimilar {
        /// Unseen features with their values.
        unseen: Vec<String>,
    },
    /// Every principle scored below the confidence floor.
    #[error("no principle reached the minimum confidence of {threshold}")]
    NoConfidentSuggestion {
        /// Floor that was applied.
        threshold: f64,
    },
    /// The artifact's label encoder is inconsistent with its classifier.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Ranks principles for a combination against a trained artifact.
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    config: InferenceConfig,
    telemetry: Option<EngineTelemetry>,
}

impl InferenceEngine {
    /// Creates an engine.
    #[must_use]
    pub const fn new(config: InferenceConfig) -> Self {
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
    pub const fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Returns at most `top_n` suggestions, best first.
    ///
    /// Each unseen category, block or weekday multiplies every confidence by
    /// `unseen_penalty`; reaching `max_unseen_features` refuses the query outright.
    pub fn predict(
        &self,
        model: Option<&ModelArtifact>,
        query: &PredictionQuery,
        top_n: usize,
    ) -> Result<Vec<Prediction>, InferenceError> {
        let model = model
            .filter(|artifact| artifact.is_trained())
            .ok_or(InferenceError::NotTrained)?;
        if top_n == 0 {
            return Err(InferenceError::InvalidInput {
                reason: "top_n must be at least 1".into(),
            });
        }
        let features = FeatureTuple::from_raw(
            Some(&query.category),
            Some(&query.block),
            Some(&query.weekday),
            query.season.as_deref(),
        )
        .ok_or_else(|| InferenceError::InvalidInput {
            reason: "category, block and weekday must not be empty".into(),
        })?;

        let unseen = unseen_features(model, &features);
        if unseen.len() >= self.config.max_unseen_features {
            telemetry::log(
                self.telemetry.as_ref(),
                LogLevel::Info,
                "prediction_refused",
                json!({ "unseen": unseen }),
            );
            return Err(InferenceError::TooDissimilar { unseen });
        }

        let row = model.feature_pipeline.transform(&features).to_row();
        let mut ranked: Vec<(usize, f64)> = model
            .classifier
            .scores(&row)
            .into_iter()
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let factor = self.penalty_factor(unseen.len());
        let warnings = (!unseen.is_empty()).then(|| {
            unseen
                .iter()
                .map(|value| format!("{value} was not seen in training"))
                .collect::<Vec<_>>()
        });
        let mut predictions = Vec::new();
        for (index, score) in ranked {
            let confidence = (score * factor).clamp(0.0, 1.0);
            if confidence < self.config.min_confidence {
                break;
            }
            predictions.push(Prediction {
                principle: model.label_encoder.decode(index)?.to_owned(),
                confidence,
                warnings: warnings.clone(),
            });
            if predictions.len() == top_n {
                break;
            }
        }
        if predictions.is_empty() {
            return Err(InferenceError::NoConfidentSuggestion {
                threshold: self.config.min_confidence,
            });
        }
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "prediction_served",
            json!({
                "suggestions": predictions.len(),
                "unseen": unseen.len(),
                "top_confidence": predictions[0].confidence,
            }),
        );
        Ok(predictions)
    }

    /// [`predict`](Self::predict) with the configured default count.
    pub fn predict_default(
        &self,
        model: Option<&ModelArtifact>,
        query: &PredictionQuery,
    ) -> Result<Vec<Prediction>, InferenceError> {
        self.predict(model, query, self.config.default_top_n)
    }

    fn penalty_factor(&self, unseen: usize) -> f64 {
        self.config
            .unseen_penalty
            .powi(i32::try_from(unseen).unwrap_or(i32::MAX))
    }
}

/// Categorical query values absent from the latest training data, as `feature 'value'`.
fn unseen_features(model: &ModelArtifact, features: &FeatureTuple) -> Vec<String> {
    CATEGORICAL_FEATURES
        .iter()
        .zip(features.categorical_values())
        .filter(|(name, value)| {
            !model
                .training_stats
                .known_values(name)
                .iter()
                .any(|known| known == value)
        })
        .map(|(name, value)| format!("{} '{value}'", feature_label(name)))
        .collect()
}

fn feature_label(feature: &str) -> &'static str {
    match feature {
        CATEGORY_FEATURE => "category",
        BLOCK_FEATURE => "block",
        WEEKDAY_FEATURE => "weekday",
        _ => "feature",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        records::PlanningRecord,
        training::{TrainingConfig, TrainingEngine},
    };

    const CATEGORIES: [&str; 3] = ["Cadete", "Juvenil", "Infantil"];
    const BLOCKS: [&str; 2] = ["Inicial", "Final"];
    const WEEKDAYS: [&str; 2] = ["Lunes", "Miercoles"];

    fn trained() -> ModelArtifact {
        let mut records = Vec::new();
        for category in CATEGORIES {
            for block in BLOCKS {
                for weekday in WEEKDAYS {
                    records.push(PlanningRecord::new(category, block, weekday, "Amplitud"));
                    if weekday == "Lunes" {
                        records.push(PlanningRecord::new(category, block, weekday, "Repliegue"));
                    }
                }
            }
        }
        TrainingEngine::new(TrainingConfig::default())
            .train(&records)
            .unwrap()
    }

    #[test]
    fn suggestions_are_sorted_and_bounded() {
        let model = trained();
        let engine = InferenceEngine::default();
        let query = PredictionQuery::new("Cadete", "Inicial", "Lunes");
        let predictions = engine.predict(Some(&model), &query, 5).unwrap();
        assert!(!predictions.is_empty());
        assert!(predictions.len() <= 2);
        assert_eq!(predictions[0].principle, "Amplitud");
        for pair in predictions.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        for prediction in &predictions {
            assert!(prediction.confidence >= 0.05 && prediction.confidence <= 1.0);
            assert!(prediction.warnings.is_none());
        }
        let single = engine.predict(Some(&model), &query, 1).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn one_unseen_feature_is_penalized_and_flagged() {
        let model = trained();
        let engine = InferenceEngine::default();
        let seen = engine
            .predict(
                Some(&model),
                &PredictionQuery::new("Cadete", "Inicial", "Lunes"),
                5,
            )
            .unwrap();
        let unseen = engine
            .predict(
                Some(&model),
                &PredictionQuery::new("Senior", "Inicial", "Lunes"),
                5,
            )
            .unwrap();
        let warnings = unseen[0].warnings.as_ref().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("category 'Senior'"));
        assert!(unseen[0].confidence <= 0.7 + 1e-9);
        assert!(unseen[0].confidence <= seen[0].confidence);
    }

    #[test]
    fn two_unseen_features_are_refused() {
        let model = trained();
        let err = InferenceEngine::default()
            .predict(
                Some(&model),
                &PredictionQuery::new("Senior", "Inicial", "Domingo"),
                5,
            )
            .unwrap_err();
        match err {
            InferenceError::TooDissimilar { unseen } => assert_eq!(unseen.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn three_unseen_features_are_refused() {
        let model = trained();
        let err = InferenceEngine::default()
            .predict(
                Some(&model),
                &PredictionQuery::new("Senior", "Tarde", "Domingo"),
                5,
            )
            .unwrap_err();
        match err {
            InferenceError::TooDissimilar { unseen } => {
                assert_eq!(
                    unseen,
                    vec!["category 'Senior'", "block 'Tarde'", "weekday 'Domingo'"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn threshold_applies_to_penalized_confidence() {
        let model = trained();
        let query = PredictionQuery::new("Senior", "Inicial", "Lunes");
        let features =
            FeatureTuple::from_raw(Some("Senior"), Some("Inicial"), Some("Lunes"), None).unwrap();
        let row = model.feature_pipeline.transform(&features).to_row();
        let top = model
            .classifier
            .scores(&row)
            .into_iter()
            .fold(0.0_f64, f64::max);
        assert!(top > 0.0);

        let min_confidence = top * 0.85;
        let penalized = InferenceEngine::new(InferenceConfig {
            min_confidence,
            ..InferenceConfig::default()
        });
        assert!(matches!(
            penalized.predict(Some(&model), &query, 5),
            Err(InferenceError::NoConfidentSuggestion { .. })
        ));

        let unpenalized = InferenceEngine::new(InferenceConfig {
            min_confidence,
            unseen_penalty: 1.0,
            ..InferenceConfig::default()
        });
        let predictions = unpenalized.predict(Some(&model), &query, 5).unwrap();
        assert!((predictions[0].confidence - top).abs() < 1e-9);
        assert!(predictions[0].warnings.is_some());
    }

    #[test]
    fn missing_model_and_bad_input() {
        let engine = InferenceEngine::default();
        let query = PredictionQuery::new("Cadete", "Inicial", "Lunes");
        assert_eq!(
            engine.predict(None, &query, 5),
            Err(InferenceError::NotTrained)
        );
        let model = trained();
        assert!(matches!(
            engine.predict(Some(&model), &query, 0),
            Err(InferenceError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.predict(Some(&model), &PredictionQuery::new("Cadete", " ", "Lunes"), 3),
            Err(InferenceError::InvalidInput { .. })
        ));
    }

    #[test]
    fn threshold_above_every_score_yields_no_suggestion() {
        let model = trained();
        let engine = InferenceEngine::new(InferenceConfig {
            min_confidence: 1.01,
            ..InferenceConfig::default()
        });
        let err = engine
            .predict_default(
                Some(&model),
                &PredictionQuery::new("Cadete", "Inicial", "Lunes").with_season("2024-03"),
            )
            .unwrap_err();
        assert!(matches!(err, InferenceError::NoConfidentSuggestion { .. }));
    }

    #[test]
    fn percentage_formatting() {
        let prediction = Prediction {
            principle: "Amplitud".into(),
            confidence: 0.42,
            warnings: None,
        };
        assert_eq!(prediction.percentage(), "42.0%");
    }
}
