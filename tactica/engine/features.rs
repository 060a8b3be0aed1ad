use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    encoding::{CategoricalEncoder, UNSEEN_CODE},
    records::PlanningRecord,
    training::TrainingExample,
};

/// Column name of the category feature.
pub const CATEGORY_FEATURE: &str = "categoria";
/// Column name of the block feature.
pub const BLOCK_FEATURE: &str = "bloque";
/// Column name of the weekday feature.
pub const WEEKDAY_FEATURE: &str = "dia";
/// Name of the derived season-month feature.
pub const SEASON_FEATURE: &str = "mes_temporada";
/// Categorical features in encoding order.
pub const CATEGORICAL_FEATURES: [&str; 3] = [CATEGORY_FEATURE, BLOCK_FEATURE, WEEKDAY_FEATURE];
/// Width of an encoded feature vector.
pub const FEATURE_COUNT: usize = 4;
/// Month used when a season identifier is absent or unparseable.
pub const DEFAULT_SEASON_MONTH: u8 = 1;

/// Normalized (category, block, weekday, season month) combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureTuple {
    /// Age group / team category.
    pub category: String,
    /// Training block or phase.
    pub block: String,
    /// Day of the week.
    pub weekday: String,
    /// Month derived from the season identifier (1-12).
    pub season_month: u8,
}

impl FeatureTuple {
    /// Builds a tuple from raw values; `None` when any categorical field is missing.
    #[must_use]
    pub fn from_raw(
        category: Option<&str>,
        block: Option<&str>,
        weekday: Option<&str>,
        season: Option<&str>,
    ) -> Option<Self> {
        Some(Self {
            category: FeaturePipeline::normalize(category)?,
            block: FeaturePipeline::normalize(block)?,
            weekday: FeaturePipeline::normalize(weekday)?,
            season_month: FeaturePipeline::season_month(season),
        })
    }

    /// Builds a tuple from a planning record.
    #[must_use]
    pub fn from_record(record: &PlanningRecord) -> Option<Self> {
        Self::from_raw(
            record.category.as_deref(),
            record.block.as_deref(),
            record.weekday.as_deref(),
            record.season_id.as_deref(),
        )
    }

    /// Categorical values in [`CATEGORICAL_FEATURES`] order.
    #[must_use]
    pub fn categorical_values(&self) -> [&str; 3] {
        [&self.category, &self.block, &self.weekday]
    }
}

/// Integer codes for a [`FeatureTuple`]; unseen values carry [`UNSEEN_CODE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFeatureVector(pub [i64; FEATURE_COUNT]);

impl EncodedFeatureVector {
    /// Row form consumed by the classifier.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        self.0.map(|code| code as f64)
    }

    /// Number of categorical positions holding [`UNSEEN_CODE`].
    #[must_use]
    pub fn unseen_count(&self) -> usize {
        self.0[..CATEGORICAL_FEATURES.len()]
            .iter()
            .filter(|&&code| code == UNSEEN_CODE)
            .count()
    }
}

/// Single normalization and encoding path used by both training and inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    encoders: IndexMap<String, CategoricalEncoder>,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self {
            encoders: CATEGORICAL_FEATURES
                .iter()
                .map(|name| ((*name).to_owned(), CategoricalEncoder::new()))
                .collect(),
        }
    }
}

impl FeaturePipeline {
    /// Trims surrounding whitespace; empty strings and `nan` (any case) become `None`.
    #[must_use]
    pub fn normalize(raw: Option<&str>) -> Option<String> {
        let trimmed = raw?.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }

    /// Month of a `YYYY-MM` season identifier, or [`DEFAULT_SEASON_MONTH`].
    #[must_use]
    pub fn season_month(season: Option<&str>) -> u8 {
        Self::normalize(season)
            .and_then(|season| NaiveDate::parse_from_str(&format!("{season}-01"), "%Y-%m-%d").ok())
            .and_then(|date| u8::try_from(date.month()).ok())
            .unwrap_or(DEFAULT_SEASON_MONTH)
    }

    /// Extends every encoder with the values seen in `examples`; existing codes are kept.
    pub fn fit(&mut self, examples: &[TrainingExample]) {
        for (position, name) in CATEGORICAL_FEATURES.iter().enumerate() {
            let encoder = self.encoders.entry((*name).to_owned()).or_default();
            encoder.fit(
                examples
                    .iter()
                    .map(|example| example.features.categorical_values()[position]),
            );
        }
    }

    /// Encodes a tuple. Unknown values map to [`UNSEEN_CODE`].
    #[must_use]
    pub fn transform(&self, features: &FeatureTuple) -> EncodedFeatureVector {
        let values = features.categorical_values();
        let mut codes = [UNSEEN_CODE; FEATURE_COUNT];
        for (position, name) in CATEGORICAL_FEATURES.iter().enumerate() {
            codes[position] = self
                .encoders
                .get(*name)
                .map_or(UNSEEN_CODE, |encoder| encoder.encode(values[position]));
        }
        codes[FEATURE_COUNT - 1] = i64::from(features.season_month);
        EncodedFeatureVector(codes)
    }

    /// Encoder for one feature.
    #[must_use]
    pub fn encoder(&self, feature: &str) -> Option<&CategoricalEncoder> {
        self.encoders.get(feature)
    }

    /// All feature encoders keyed by feature name.
    #[must_use]
    pub const fn encoders(&self) -> &IndexMap<String, CategoricalEncoder> {
        &self.encoders
    }

    /// True when every categorical feature has at least one code.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        CATEGORICAL_FEATURES.iter().all(|name| {
            self.encoders
                .get(*name)
                .is_some_and(|encoder| !encoder.is_empty())
        })
    }
}
