use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`LabelSetEncoder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// `encode`/`decode` called before `fit`.
    #[error("label encoder used before it was fitted")]
    NotFitted,
    /// Column index beyond the fitted width.
    #[error("label index {index} is outside the fitted width {width}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Fitted width.
        width: usize,
    },
    /// Indicator vector of the wrong length.
    #[error("indicator vector has width {got}, expected {expected}")]
    WidthMismatch {
        /// Fitted width.
        expected: usize,
        /// Width supplied.
        got: usize,
    },
}

/// Bijection between principle names and fixed-width binary indicator vectors.
///
/// Columns are the sorted union of every principle seen at the latest fit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSetEncoder {
    classes: Option<Vec<String>>,
}

impl LabelSetEncoder {
    /// Fits the column space to the sorted union of `label_sets`, replacing any earlier fit.
    pub fn fit<'a, I>(&mut self, label_sets: I)
    where
        I: IntoIterator<Item = &'a BTreeSet<String>>,
    {
        let union: BTreeSet<&String> = label_sets.into_iter().flatten().collect();
        self.classes = Some(union.into_iter().cloned().collect());
    }

    /// True once `fit` has run.
    #[must_use]
    pub const fn is_fitted(&self) -> bool {
        self.classes.is_some()
    }

    /// Number of columns (0 before fit).
    #[must_use]
    pub fn width(&self) -> usize {
        self.classes.as_ref().map_or(0, Vec::len)
    }

    /// Principle names in column order.
    pub fn classes(&self) -> Result<&[String], EncodingError> {
        self.classes.as_deref().ok_or(EncodingError::NotFitted)
    }

    /// Encodes a set as a 0/1 vector. Principles outside the fitted vocabulary are ignored.
    pub fn encode(&self, labels: &BTreeSet<String>) -> Result<Vec<u8>, EncodingError> {
        Ok(self
            .classes()?
            .iter()
            .map(|class| u8::from(labels.contains(class)))
            .collect())
    }

    /// Principle behind a column index.
    pub fn decode(&self, index: usize) -> Result<&str, EncodingError> {
        let classes = self.classes()?;
        classes
            .get(index)
            .map(String::as_str)
            .ok_or(EncodingError::IndexOutOfRange {
                index,
                width: classes.len(),
            })
    }

    /// Principles behind a list of column indices.
    pub fn decode_indices(&self, indices: &[usize]) -> Result<BTreeSet<String>, EncodingError> {
        indices
            .iter()
            .map(|&index| self.decode(index).map(str::to_owned))
            .collect()
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn inverse(&self, indicator: &[u8]) -> Result<BTreeSet<String>, EncodingError> {
        let width = self.classes()?.len();
        if indicator.len() != width {
            return Err(EncodingError::WidthMismatch {
                expected: width,
                got: indicator.len(),
            });
        }
        self.decode_indices(&nonzero_indices(indicator))
    }
}

/// Positions of the non-zero entries of an indicator vector.
#[must_use]
pub fn nonzero_indices(indicator: &[u8]) -> Vec<usize> {
    indicator
        .iter()
        .enumerate()
        .filter(|(_, &flag)| flag != 0)
        .map(|(index, _)| index)
        .collect()
}
