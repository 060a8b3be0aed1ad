use ndarray::{ArrayView2, Axis};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{tree::DecisionTree, ForestConfig};

/// Bootstrap-aggregated decision trees for one binary label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits `config.n_estimators` trees, each on a bootstrap sample drawn from `seed`.
    #[must_use]
    pub fn fit(x: ArrayView2<'_, f64>, y: &[u8], config: &ForestConfig, seed: u64) -> Self {
        let rows = x.nrows();
        if rows == 0 {
            return Self::default();
        }
        let mut rng = SmallRng::seed_from_u64(seed);
        let trees = (0..config.n_estimators.max(1))
            .map(|_| {
                let sample: Vec<usize> = (0..rows).map(|_| rng.gen_range(0..rows)).collect();
                let mut tree = DecisionTree::new(config.max_depth, config.min_samples_split);
                tree.fit(x, y, &sample, &mut rng);
                tree
            })
            .collect();
        Self { trees }
    }

    /// Mean positive-class probability across trees.
    #[must_use]
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.trees.len() as f64;
        self.trees.iter().map(|tree| tree.predict_proba(row)).sum::<f64>() / count
    }

    /// Class 1 when the mean probability exceeds one half.
    #[must_use]
    pub fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) > 0.5)
    }

    /// Number of trees.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Estimator for one label column. Columns with a single class in training data
/// have no probability model and always answer with that class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelEstimator {
    /// Fitted forest.
    Forest(RandomForest),
    /// Column seen with one class only.
    Constant {
        /// The only class observed.
        class: u8,
    },
}

impl LabelEstimator {
    /// Fits a forest, or a constant when `y` holds one class.
    #[must_use]
    pub fn fit(x: ArrayView2<'_, f64>, y: &[u8], config: &ForestConfig, seed: u64) -> Self {
        match y.first() {
            None => Self::Constant { class: 0 },
            Some(&first) if y.iter().all(|&label| label == first) => {
                Self::Constant { class: first }
            }
            Some(_) => Self::Forest(RandomForest::fit(x, y, config, seed)),
        }
    }

    /// Positive-class probability, when the estimator has one.
    #[must_use]
    pub fn probability(&self, row: &[f64]) -> Option<f64> {
        match self {
            Self::Forest(forest) => Some(forest.predict_proba(row)),
            Self::Constant { .. } => None,
        }
    }

    /// Predicted class.
    #[must_use]
    pub fn predict(&self, row: &[f64]) -> u8 {
        match self {
            Self::Forest(forest) => forest.predict(row),
            Self::Constant { class } => *class,
        }
    }

    /// Probability, falling back to the predicted class as 0.0 or 1.0.
    #[must_use]
    pub fn score(&self, row: &[f64]) -> f64 {
        self.probability(row)
            .unwrap_or_else(|| f64::from(self.predict(row)))
    }
}

/// One [`LabelEstimator`] per label column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiLabelForest {
    estimators: Vec<LabelEstimator>,
}

impl MultiLabelForest {
    /// Fits every column of `y` against `x`. Column `j` uses seed `seed + j`.
    #[must_use]
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, u8>,
        config: &ForestConfig,
        seed: u64,
    ) -> Self {
        let estimators = y
            .axis_iter(Axis(1))
            .zip(0_u64..)
            .map(|(column, offset)| {
                LabelEstimator::fit(x, &column.to_vec(), config, seed.wrapping_add(offset))
            })
            .collect();
        Self { estimators }
    }

    /// Per-label scores, in label column order.
    #[must_use]
    pub fn scores(&self, row: &[f64]) -> Vec<f64> {
        self.estimators.iter().map(|e| e.score(row)).collect()
    }

    /// Per-label predicted classes.
    #[must_use]
    pub fn predict(&self, row: &[f64]) -> Vec<u8> {
        self.estimators.iter().map(|e| e.predict(row)).collect()
    }

    /// Fitted estimators.
    #[must_use]
    pub fn estimators(&self) -> &[LabelEstimator] {
        &self.estimators
    }

    /// Number of label columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    /// True before fitting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }
}
