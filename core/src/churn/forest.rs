//! Random forest binary classifier.
//!
//! Each tree is a CART tree grown on a bootstrap sample, choosing splits
//! by Gini impurity over a random subset of √d features per node. The
//! class-1 probability is the mean over trees of the positive fraction
//! in the leaf the row lands in.
//!
//! Trees are stored as flat node arenas so artifacts serialize without
//! recursion.

use crate::{config::ChurnModelConfig, rng::TreeRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        positive_fraction: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature:   usize,
        threshold: f64,
        left:      usize,
        right:     usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { positive_fraction } => return *positive_fraction,
                Node::Split { feature, threshold, left, right } => {
                    i = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on scaled rows `x` with labels `y`. Deterministic for a given seed.
    pub fn fit(x: &[Vec<f64>], y: &[bool], config: &ChurnModelConfig) -> Self {
        assert_eq!(x.len(), y.len(), "row/label count mismatch");
        let width = x.first().map(Vec::len).unwrap_or(0);
        let tree_count = config.tree_count.max(1);

        let trees = (0..tree_count)
            .map(|t| {
                let mut rng = TreeRng::new(config.seed, t as u64);
                let sample = rng.bootstrap(x.len());
                let mut grower = TreeGrower {
                    x,
                    y,
                    width,
                    max_features: max_features(width),
                    max_depth: config.max_depth.max(1),
                    min_samples_leaf: config.min_samples_leaf.max(1),
                    rng: &mut rng,
                    nodes: Vec::new(),
                };
                grower.grow(sample, 0);
                DecisionTree { nodes: grower.nodes }
            })
            .collect();

        Self { trees }
    }

    /// Class-1 probability in [0, 1].
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

fn max_features(width: usize) -> usize {
    ((width as f64).sqrt() as usize).max(1)
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

struct SplitCandidate {
    feature:   usize,
    threshold: f64,
    impurity:  f64,
}

struct TreeGrower<'a> {
    x:                &'a [Vec<f64>],
    y:                &'a [bool],
    width:            usize,
    max_features:     usize,
    max_depth:        usize,
    min_samples_leaf: usize,
    rng:              &'a mut TreeRng,
    nodes:            Vec<Node>,
}

impl TreeGrower<'_> {
    /// Grow the subtree for `sample` and return its node index.
    fn grow(&mut self, sample: Vec<usize>, depth: usize) -> usize {
        let positives = sample.iter().filter(|&&i| self.y[i]).count();
        let total = sample.len();
        let leaf = Node::Leaf {
            positive_fraction: if total == 0 { 0.0 } else { positives as f64 / total as f64 },
        };

        let pure = positives == 0 || positives == total;
        if pure || depth >= self.max_depth || total < 2 * self.min_samples_leaf {
            self.nodes.push(leaf);
            return self.nodes.len() - 1;
        }

        let Some(split) = self.best_split(&sample) else {
            self.nodes.push(leaf);
            return self.nodes.len() - 1;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);

        // Reserve this node's slot before growing children.
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { positive_fraction: 0.0 });
        let left_idx = self.grow(left, depth + 1);
        let right_idx = self.grow(right, depth + 1);
        self.nodes[slot] = Node::Split {
            feature:   split.feature,
            threshold: split.threshold,
            left:      left_idx,
            right:     right_idx,
        };
        slot
    }

    /// Evaluate features in random order until `max_features` of them have
    /// produced a valid split. Constant features don't count toward the quota.
    fn best_split(&mut self, sample: &[usize]) -> Option<SplitCandidate> {
        let order = self.rng.sample_distinct(self.width, self.width);
        let mut best: Option<SplitCandidate> = None;
        let mut evaluated = 0;

        for feature in order {
            if evaluated >= self.max_features {
                break;
            }
            let Some(candidate) = self.best_split_on(sample, feature) else {
                continue;
            };
            evaluated += 1;
            if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                best = Some(candidate);
            }
        }
        best
    }

    fn best_split_on(&self, sample: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut values: Vec<(f64, bool)> = sample
            .iter()
            .map(|&i| (self.x[i][feature], self.y[i]))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = values.len();
        let total_pos = values.iter().filter(|v| v.1).count();
        let mut left_pos = 0;
        let mut best: Option<SplitCandidate> = None;

        for i in 0..total - 1 {
            if values[i].1 {
                left_pos += 1;
            }
            let left_n = i + 1;
            let right_n = total - left_n;
            if values[i].0 == values[i + 1].0 {
                continue;
            }
            if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                continue;
            }
            let impurity = (left_n as f64 * gini(left_pos, left_n)
                + right_n as f64 * gini(total_pos - left_pos, right_n))
                / total as f64;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (values[i].0 + values[i + 1].0) / 2.0,
                    impurity,
                });
            }
        }
        best
    }
}
