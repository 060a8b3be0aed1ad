//! Bagged CART classifiers, one binary forest per label column.

use serde::{Deserialize, Serialize};

/// Per-label ensembles and the multi-label wrapper.
pub mod ensemble;
/// Gini decision trees stored as node arenas.
pub mod tree;

pub use ensemble::{LabelEstimator, MultiLabelForest, RandomForest};
pub use tree::{DecisionTree, TreeNode};

/// Forest hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Trees per label.
    pub n_estimators: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum samples a node needs before it may split.
    pub min_samples_split: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            max_depth: 5,
            min_samples_split: 2,
        }
    }
}
