use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tactica_logging::LogLevel;
use thiserror::Error;

use crate::{
    features::FeaturePipeline,
    records::{PlanningRecord, CATEGORY_COLUMN, UNIT_COLUMN, WEEKDAY_COLUMN},
    telemetry::{self, EngineTelemetry},
};

const AVAILABLE_PREVIEW: usize = 5;

/// Smallest and largest weekly principle totals observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRange {
    /// Lowest weekly total.
    pub min: usize,
    /// Highest weekly total.
    pub max: usize,
}

/// Historical weekly load for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadEstimate {
    /// Category the estimate is for.
    pub category: String,
    /// Mean principles per microcycle.
    pub total_principles_per_week: f64,
    /// Mean principles per active day.
    pub average_per_day: f64,
    /// Mean within-microcycle sample deviation of daily counts; 0 with one microcycle.
    pub stdev: f64,
    /// Distinct weekdays with any activity.
    pub active_weekdays: usize,
    /// Microcycles that contributed.
    pub units_analyzed: usize,
    /// Observed weekly totals.
    pub suggested_range: WorkloadRange,
}

/// Reasons an estimate cannot be made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadError {
    /// No usable rows for the category.
    #[error("no planning data for category '{category}'; available: {}", available.join(", "))]
    NoData {
        /// Requested category.
        category: String,
        /// First few categories that do have data.
        available: Vec<String>,
    },
}

/// Summarizes how many principles a category historically schedules per week.
#[derive(Debug, Clone, Default)]
pub struct WorkloadEstimator {
    telemetry: Option<EngineTelemetry>,
}

impl WorkloadEstimator {
    /// Creates an estimator.
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

    /// Counts rows per (microcycle, weekday), then averages per microcycle.
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(
        &self,
        records: &[PlanningRecord],
        category: &str,
    ) -> Result<WorkloadEstimate, WorkloadError> {
        let wanted = FeaturePipeline::normalize(Some(category));
        let in_category: Vec<&PlanningRecord> = records
            .iter()
            .filter(|r| wanted.is_some() && r.normalized(CATEGORY_COLUMN) == wanted)
            .collect();

        let mut per_day: IndexMap<(String, String), usize> = IndexMap::new();
        for record in &in_category {
            if let (Some(unit), Some(day)) = (
                record.normalized(UNIT_COLUMN),
                record.normalized(WEEKDAY_COLUMN),
            ) {
                *per_day.entry((unit, day)).or_default() += 1;
            }
        }
        if per_day.is_empty() {
            return Err(WorkloadError::NoData {
                category: category.trim().to_owned(),
                available: available_categories(records),
            });
        }

        let mut per_unit: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for ((unit, _), count) in &per_day {
            per_unit.entry(unit.as_str()).or_default().push(*count);
        }
        let totals: Vec<usize> = per_unit.values().map(|days| days.iter().sum()).collect();
        let means: Vec<f64> = per_unit
            .values()
            .map(|days| days.iter().sum::<usize>() as f64 / days.len() as f64)
            .collect();
        let deviations: Vec<f64> = per_unit
            .values()
            .filter_map(|days| sample_stdev(days))
            .collect();

        let units = per_unit.len();
        let stdev = if units < 2 || deviations.is_empty() {
            0.0
        } else {
            mean(&deviations)
        };
        let active_weekdays = in_category
            .iter()
            .filter_map(|r| r.normalized(WEEKDAY_COLUMN))
            .collect::<HashSet<_>>()
            .len();
        let estimate = WorkloadEstimate {
            category: category.trim().to_owned(),
            total_principles_per_week: mean(
                &totals.iter().map(|&t| t as f64).collect::<Vec<_>>(),
            ),
            average_per_day: mean(&means),
            stdev,
            active_weekdays,
            units_analyzed: units,
            suggested_range: WorkloadRange {
                min: totals.iter().copied().min().unwrap_or_default(),
                max: totals.iter().copied().max().unwrap_or_default(),
            },
        };
        telemetry::log(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "workload_estimated",
            json!({ "category": estimate.category, "units": units }),
        );
        Ok(estimate)
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (n - 1); `None` below two values.
#[allow(clippy::cast_precision_loss)]
fn sample_stdev(values: &[usize]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let floats: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let avg = mean(&floats);
    let variance =
        floats.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (floats.len() - 1) as f64;
    Some(variance.sqrt())
}

fn available_categories(records: &[PlanningRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.normalized(CATEGORY_COLUMN))
        .collect::<IndexSet<_>>()
        .into_iter()
        .take(AVAILABLE_PREVIEW)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: &str, unit: &str, day: &str, principle: &str) -> PlanningRecord {
        PlanningRecord::new(category, "Inicial", day, principle).with_unit(unit)
    }

    #[test]
    fn single_unit_has_zero_deviation() {
        let records = vec![
            row("Cadete", "MC1", "Lunes", "A"),
            row("Cadete", "MC1", "Lunes", "B"),
            row("Cadete", "MC1", "Martes", "C"),
            row("Cadete", "MC1", "Jueves", "D"),
        ];
        let estimate = WorkloadEstimator::new().estimate(&records, "Cadete").unwrap();
        assert_eq!(estimate.units_analyzed, 1);
        assert!(estimate.stdev.abs() < f64::EPSILON);
        assert!((estimate.total_principles_per_week - 4.0).abs() < f64::EPSILON);
        assert!((estimate.average_per_day - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(estimate.active_weekdays, 3);
        assert_eq!(estimate.suggested_range, WorkloadRange { min: 4, max: 4 });
    }

    #[test]
    fn averages_across_units() {
        let records = vec![
            row("Cadete", "MC1", "Lunes", "A"),
            row("Cadete", "MC1", "Lunes", "B"),
            row("Cadete", "MC1", "Martes", "C"),
            row("Cadete", "MC1", "Martes", "D"),
            row("Cadete", "MC2", "Lunes", "A"),
            row("Cadete", "MC2", "Lunes", "B"),
            row("Cadete", "MC2", "Lunes", "C"),
            row("Cadete", "MC2", "Miercoles", "D"),
            row("Cadete", "MC2", "Viernes", "E"),
            row("Juvenil", "MC3", "Lunes", "A"),
        ];
        let estimate = WorkloadEstimator::new().estimate(&records, " Cadete ").unwrap();
        assert_eq!(estimate.category, "Cadete");
        assert_eq!(estimate.units_analyzed, 2);
        // MC1 days [2, 2] -> sum 4, mean 2, sd 0; MC2 days [3, 1, 1] -> sum 5, mean 5/3, sd ~1.1547
        assert!((estimate.total_principles_per_week - 4.5).abs() < 1e-9);
        assert!((estimate.average_per_day - (2.0 + 5.0 / 3.0) / 2.0).abs() < 1e-9);
        assert!((estimate.stdev - (4.0_f64 / 3.0).sqrt() / 2.0).abs() < 1e-9);
        assert_eq!(estimate.active_weekdays, 4);
        assert_eq!(estimate.suggested_range, WorkloadRange { min: 4, max: 5 });
    }

    #[test]
    fn unknown_category_lists_available() {
        let records = vec![
            row("Cadete", "MC1", "Lunes", "A"),
            row("Juvenil", "MC2", "Lunes", "A"),
        ];
        let err = WorkloadEstimator::new().estimate(&records, "Senior").unwrap_err();
        assert_eq!(
            err,
            WorkloadError::NoData {
                category: "Senior".into(),
                available: vec!["Cadete".into(), "Juvenil".into()],
            }
        );
        assert!(WorkloadEstimator::new().estimate(&records, "  ").is_err());
    }
}
