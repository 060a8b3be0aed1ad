use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation scores of a trained model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Fraction of rows whose whole label vector was predicted exactly.
    pub accuracy: f64,
    /// Unweighted mean of per-label F1.
    pub f1_macro: f64,
}

/// Reasons evaluation cannot produce numbers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// No validation rows.
    #[error("validation set is empty")]
    EmptyValidationSet,
    /// Label matrices of different shapes.
    #[error("prediction shape {got:?} does not match truth shape {expected:?}")]
    ShapeMismatch {
        /// Shape of the truth matrix.
        expected: (usize, usize),
        /// Shape of the prediction matrix.
        got: (usize, usize),
    },
}

fn check(
    truth: ArrayView2<'_, u8>,
    predicted: ArrayView2<'_, u8>,
) -> Result<(), EvaluationError> {
    if truth.dim() != predicted.dim() {
        return Err(EvaluationError::ShapeMismatch {
            expected: truth.dim(),
            got: predicted.dim(),
        });
    }
    if truth.nrows() == 0 {
        return Err(EvaluationError::EmptyValidationSet);
    }
    Ok(())
}

/// Exact-match (subset) accuracy.
#[allow(clippy::cast_precision_loss)]
pub fn exact_match_accuracy(
    truth: ArrayView2<'_, u8>,
    predicted: ArrayView2<'_, u8>,
) -> Result<f64, EvaluationError> {
    check(truth, predicted)?;
    let hits = truth
        .outer_iter()
        .zip(predicted.outer_iter())
        .filter(|(t, p)| t == p)
        .count();
    Ok(hits as f64 / truth.nrows() as f64)
}

/// Macro-averaged F1; a label with no positives in either matrix scores 0.
#[allow(clippy::cast_precision_loss)]
pub fn macro_f1(
    truth: ArrayView2<'_, u8>,
    predicted: ArrayView2<'_, u8>,
) -> Result<f64, EvaluationError> {
    check(truth, predicted)?;
    let labels = truth.ncols();
    if labels == 0 {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for (t, p) in truth.axis_iter(Axis(1)).zip(predicted.axis_iter(Axis(1))) {
        let (mut tp, mut fp, mut fn_) = (0_usize, 0_usize, 0_usize);
        for (&truth_bit, &pred_bit) in t.iter().zip(p.iter()) {
            match (truth_bit != 0, pred_bit != 0) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let denominator = 2 * tp + fp + fn_;
        if denominator > 0 {
            total += (2 * tp) as f64 / denominator as f64;
        }
    }
    Ok(total / labels as f64)
}

/// Accuracy and macro F1 together.
pub fn evaluate(
    truth: ArrayView2<'_, u8>,
    predicted: ArrayView2<'_, u8>,
) -> Result<EvaluationMetrics, EvaluationError> {
    Ok(EvaluationMetrics {
        accuracy: exact_match_accuracy(truth, predicted)?,
        f1_macro: macro_f1(truth, predicted)?,
    })
}
