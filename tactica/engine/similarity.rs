use std::collections::BTreeSet;

use indexmap::IndexMap;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tactica_logging::LogLevel;
use thiserror::Error;

use crate::{
    records::{PlanningRecord, PRINCIPLE_COLUMN, UNIT_COLUMN},
    telemetry::{self, EngineTelemetry},
};

/// Units listed in a not-found error.
const AVAILABLE_PREVIEW: usize = 5;

/// A unit ranked against the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Microcycle identifier.
    pub unit_id: String,
    /// Cosine similarity of principle sets, in `[0, 1]`.
    pub similarity: f64,
}

impl SimilarityResult {
    /// Similarity as a one-decimal percentage.
    #[must_use]
    pub fn percentage(&self) -> String {
        format!("{:.1}%", self.similarity * 100.0)
    }
}

/// Reasons a similarity query fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimilarityError {
    /// Reference unit absent from the data.
    #[error("planning unit '{unit}' not found; available: {}", available.join(", "))]
    UnitNotFound {
        /// Requested unit.
        unit: String,
        /// First few units that do exist.
        available: Vec<String>,
    },
    /// Fewer than two units to compare.
    #[error("need at least 2 planning units to compare, found {found}")]
    InsufficientUnits {
        /// Units present.
        found: usize,
    },
}

/// Ranks microcycles by overlap of their principle sets.
#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine {
    telemetry: Option<EngineTelemetry>,
}

impl SimilarityEngine {
    /// Creates an engine.
    #[must_use]
    pub const fn new() -> Self {
        Self { telemetry: None }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EngineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Principle set of every unit, units in first-seen order. Rows without a
    /// principle do not count.
    #[must_use]
    pub fn unit_principles(records: &[PlanningRecord]) -> IndexMap<String, BTreeSet<String>> {
        let mut units: IndexMap<String, BTreeSet<String>> = IndexMap::new();
        for record in records {
            let (Some(unit), Some(principle)) = (
                record.normalized(UNIT_COLUMN),
                record.normalized(PRINCIPLE_COLUMN),
            ) else {
                continue;
            };
            units.entry(unit).or_default().insert(principle);
        }
        units
    }

    /// Up to `k` units most similar to `reference`, most similar first. Ties keep
    /// first-seen order and the reference itself is never returned.
    pub fn nearest(
        &self,
        records: &[PlanningRecord],
        reference: &str,
        k: usize,
    ) -> Result<Vec<SimilarityResult>, SimilarityError> {
        let units = Self::unit_principles(records);
        let reference = reference.trim();
        let Some(reference_index) = units.get_index_of(reference) else {
            return Err(SimilarityError::UnitNotFound {
                unit: reference.to_owned(),
                available: units.keys().take(AVAILABLE_PREVIEW).cloned().collect(),
            });
        };
        if units.len() < 2 {
            return Err(SimilarityError::InsufficientUnits { found: units.len() });
        }

        let vocabulary: Vec<&String> = units
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let vectors: Vec<Array1<f64>> = units
            .values()
            .map(|principles| membership(principles, &vocabulary))
            .collect();
        let target = vectors[reference_index].view();

        let mut ranked: Vec<(usize, f64)> = vectors
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != reference_index)
            .map(|(index, vector)| (index, cosine_distance(target, vector.view())))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let results: Vec<SimilarityResult> = ranked
            .into_iter()
            .take(k)
            .filter_map(|(index, distance)| {
                units.get_index(index).map(|(unit, _)| SimilarityResult {
                    unit_id: unit.clone(),
                    similarity: (1.0 - distance).clamp(0.0, 1.0),
                })
            })
            .collect();
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "similarity_ranked",
            json!({ "reference": reference, "units": units.len(), "returned": results.len() }),
        );
        Ok(results)
    }
}

fn membership(principles: &BTreeSet<String>, vocabulary: &[&String]) -> Array1<f64> {
    vocabulary
        .iter()
        .map(|principle| if principles.contains(*principle) { 1.0 } else { 0.0 })
        .collect()
}

/// `1 - cos(a, b)`; a zero vector is at distance 1 from everything.
#[must_use]
pub fn cosine_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm <= f64::EPSILON {
        return 1.0;
    }
    1.0 - a.dot(&b) / norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn record(unit: &str, principle: &str) -> PlanningRecord {
        PlanningRecord::new("Cadete", "Inicial", "Lunes", principle).with_unit(unit)
    }

    fn records() -> Vec<PlanningRecord> {
        vec![
            record("MC1", "Amplitud"),
            record("MC1", "Presion alta"),
            record("MC2", "Amplitud"),
            record("MC2", "Presion alta"),
            record("MC3", "Repliegue"),
            record("MC4", "Amplitud"),
            record("MC4", "Repliegue"),
        ]
    }

    #[test]
    fn ranks_identical_units_first() {
        let results = SimilarityEngine::new().nearest(&records(), "MC1", 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].unit_id, "MC2");
        assert!((results[0].similarity - 1.0).abs() < 1e-9);
        assert_eq!(results[1].unit_id, "MC4");
        assert!((results[1].similarity - 0.5).abs() < 1e-9);
        assert_eq!(results[2].unit_id, "MC3");
        assert!(results[2].similarity.abs() < 1e-9);
        assert!(results.iter().all(|r| r.unit_id != "MC1"));
    }

    #[test]
    fn k_limits_results() {
        let engine = SimilarityEngine::new();
        assert_eq!(engine.nearest(&records(), "MC3", 1).unwrap().len(), 1);
        assert!(engine.nearest(&records(), "MC3", 0).unwrap().is_empty());
        assert_eq!(engine.nearest(&records(), "MC3", 10).unwrap().len(), 3);
    }

    #[test]
    fn unknown_unit_lists_available_ones() {
        let err = SimilarityEngine::new()
            .nearest(&records(), "MC9", 3)
            .unwrap_err();
        assert_eq!(
            err,
            SimilarityError::UnitNotFound {
                unit: "MC9".into(),
                available: vec!["MC1".into(), "MC2".into(), "MC3".into(), "MC4".into()],
            }
        );
    }

    #[test]
    fn single_unit_cannot_be_compared() {
        let err = SimilarityEngine::new()
            .nearest(&[record("MC1", "Amplitud")], "MC1", 3)
            .unwrap_err();
        assert_eq!(err, SimilarityError::InsufficientUnits { found: 1 });
    }

    #[test]
    fn units_without_principles_are_ignored() {
        let blank = PlanningRecord {
            principle: None,
            ..record("MC2", "Amplitud")
        };
        let placeholder = PlanningRecord {
            principle: Some("nan".into()),
            ..record("MC3", "Amplitud")
        };
        let engine = SimilarityEngine::new();
        let err = engine
            .nearest(&[record("MC1", "Amplitud"), blank.clone(), placeholder], "MC1", 3)
            .unwrap_err();
        assert_eq!(err, SimilarityError::InsufficientUnits { found: 1 });
        assert!(matches!(
            engine.nearest(&[record("MC1", "Amplitud"), blank], "MC2", 3),
            Err(SimilarityError::UnitNotFound { .. })
        ));
    }

    #[test]
    fn zero_vectors_are_maximally_distant() {
        let zero = array![0.0, 0.0];
        let one = array![1.0, 0.0];
        assert!((cosine_distance(zero.view(), one.view()) - 1.0).abs() < f64::EPSILON);
        assert!(cosine_distance(one.view(), one.view()).abs() < 1e-12);
    }
}
