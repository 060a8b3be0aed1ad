use ndarray::ArrayView2;
use rand::{rngs::SmallRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

/// Arena node of a [`DecisionTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Terminal node holding the positive-class fraction.
    Leaf {
        /// Fraction of training samples in this leaf labelled 1.
        probability: f64,
        /// Training samples that reached this leaf.
        samples: usize,
    },
    /// Internal node; rows with `row[feature] <= threshold` go left.
    Split {
        /// Feature column.
        feature: usize,
        /// Split point.
        threshold: f64,
        /// Index of the left child.
        left: usize,
        /// Index of the right child.
        right: usize,
    },
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Binary CART tree split on Gini impurity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    max_depth: usize,
    min_samples_split: usize,
}

impl DecisionTree {
    /// Empty tree with the given limits.
    #[must_use]
    pub const fn new(max_depth: usize, min_samples_split: usize) -> Self {
        Self {
            nodes: Vec::new(),
            max_depth,
            min_samples_split,
        }
    }

    /// Grows the tree on the rows of `x` listed in `samples` (duplicates allowed).
    pub fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[u8],
        samples: &[usize],
        rng: &mut SmallRng,
    ) {
        self.nodes.clear();
        if samples.is_empty() {
            self.nodes.push(TreeNode::Leaf {
                probability: 0.0,
                samples: 0,
            });
            return;
        }
        self.grow(x, y, samples, 0, rng);
    }

    /// Positive-class probability for one row.
    #[must_use]
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { probability, .. }) => return *probability,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or_default();
                    index = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest leaf (0 for a single leaf).
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match nodes.get(index) {
                Some(TreeNode::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    fn grow(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[u8],
        samples: &[usize],
        depth: usize,
        rng: &mut SmallRng,
    ) -> usize {
        let total = samples.len();
        let positives = samples.iter().filter(|&&i| y[i] == 1).count();
        #[allow(clippy::cast_precision_loss)]
        let leaf = TreeNode::Leaf {
            probability: positives as f64 / total as f64,
            samples: total,
        };
        let pure = positives == 0 || positives == total;
        if pure || depth >= self.max_depth || total < self.min_samples_split {
            return self.push(leaf);
        }
        let Some(split) = best_split(x, y, samples, rng) else {
            return self.push(leaf);
        };
        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .copied()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);
        let node = self.push(leaf);
        let left = self.grow(x, y, &left_samples, depth + 1, rng);
        let right = self.grow(x, y, &right_samples, depth + 1, rng);
        self.nodes[node] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node
    }

    fn push(&mut self, node: TreeNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// Features inspected per split: `floor(sqrt(d))`, at least one.
fn candidate_feature_count(features: usize) -> usize {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let count = (features as f64).sqrt() as usize;
    count.max(1)
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Best Gini split among a random subset of features. Constant features do not count
/// toward the subset, so the search keeps drawing until enough informative ones are seen.
fn best_split(
    x: ArrayView2<'_, f64>,
    y: &[u8],
    samples: &[usize],
    rng: &mut SmallRng,
) -> Option<SplitCandidate> {
    let max_features = candidate_feature_count(x.ncols());
    let mut order: Vec<usize> = (0..x.ncols()).collect();
    order.shuffle(rng);

    let mut best: Option<SplitCandidate> = None;
    let mut informative = 0;
    for feature in order {
        if informative >= max_features {
            break;
        }
        let mut column: Vec<(f64, u8)> = samples
            .iter()
            .map(|&i| (x[[i, feature]], y[i]))
            .collect();
        column.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (Some(first), Some(last)) = (column.first(), column.last()) else {
            continue;
        };
        if first.0 >= last.0 {
            continue;
        }
        informative += 1;

        let total = column.len();
        let total_positives = column.iter().filter(|(_, label)| *label == 1).count();
        let mut left_positives = 0;
        for split_at in 1..total {
            left_positives += usize::from(column[split_at - 1].1);
            if column[split_at].0 <= column[split_at - 1].0 {
                continue;
            }
            let right = total - split_at;
            #[allow(clippy::cast_precision_loss)]
            let impurity = (split_at as f64).mul_add(
                gini(left_positives, split_at),
                right as f64 * gini(total_positives - left_positives, right),
            ) / total as f64;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (column[split_at - 1].0 + column[split_at].0) / 2.0,
                    impurity,
                });
            }
        }
    }
    best
}
