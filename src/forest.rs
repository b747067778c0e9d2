//! Bootstrap-aggregated CART regression trees.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::predictor::FitError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` tries all of them.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree stored as a flat node arena; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    config: &'a ForestConfig,
    n_features: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl RegressionTree {
    /// Fit on the rows named by `sample` (duplicates allowed, as in a bootstrap draw).
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        sample: Vec<usize>,
        config: &ForestConfig,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = x.first().map(Vec::len).unwrap_or(0);
        let mut grower = Grower {
            x,
            y,
            config,
            n_features,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        grower.grow(sample, 0, rng);

        let mut importances = grower.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        Self {
            nodes: grower.nodes,
            importances,
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}

impl Grower<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let id = self.nodes.len();
        let n = indices.len();
        let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(s, sq), &i| {
            (s + self.y[i], sq + self.y[i] * self.y[i])
        });
        let mean = if n > 0 { sum / n as f64 } else { 0.0 };
        self.nodes.push(Node::Leaf { value: mean });

        let sse = sum_sq - sum * sum / n.max(1) as f64;
        let depth_capped = self.config.max_depth.is_some_and(|max| depth >= max);
        if depth_capped
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || sse <= 1e-12
        {
            return id;
        }

        let Some(split) = self.best_split(&indices, sum, rng) else {
            return id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return id;
        }

        // Impurity decrease in SSE units: children SSE = sum_sq - score.
        let decrease = (sum_sq - sum * sum / n as f64) - (sum_sq - split.score);
        self.importances[split.feature] += decrease.max(0.0);

        let left = self.grow(left_idx, depth + 1, rng);
        let right = self.grow(right_idx, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    // Maximizes sum_l^2/n_l + sum_r^2/n_r, which minimizes the children's SSE.
    fn best_split(
        &self,
        indices: &[usize],
        total_sum: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent_score = total_sum * total_sum / n as f64;

        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);
        if let Some(max) = self.config.max_features {
            features.truncate(max.clamp(1, self.n_features.max(1)));
        }

        let mut best: Option<SplitCandidate> = None;
        let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);
        for feature in features {
            column.clear();
            column.extend(indices.iter().map(|&i| (self.x[i][feature], self.y[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));
            if column[0].0 == column[n - 1].0 {
                continue;
            }

            let mut left_sum = 0.0;
            for k in 0..n - 1 {
                left_sum += column[k].1;
                let n_left = k + 1;
                let n_right = n - n_left;
                if column[k].0 == column[k + 1].0 || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let right_sum = total_sum - left_sum;
                let score =
                    left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                if score <= parent_score + 1e-12 {
                    continue;
                }
                if best.as_ref().is_none_or(|b| score > b.score) {
                    let lo = column[k].0;
                    let hi = column[k + 1].0;
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }
        best
    }
}

/// Averaged ensemble of [`RegressionTree`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Tree `i` draws its bootstrap sample and split order from `seed + i`, so the
    /// result does not depend on how rayon schedules the trees.
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: ForestConfig) -> Result<Self, FitError> {
        if x.is_empty() || y.is_empty() {
            return Err(FitError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(FitError::ShapeMismatch {
                rows: x.len(),
                targets: y.len(),
            });
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(FitError::RaggedRows);
        }

        let n = x.len();
        let n_trees = config.n_trees.max(1);
        let trees: Vec<RegressionTree> = (0..n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = if config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, y, sample, &config, &mut rng)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (acc, imp) in importances.iter_mut().zip(tree.feature_importances()) {
                *acc += imp;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        Ok(Self {
            config,
            trees,
            n_features,
            importances,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Mean decrease in impurity per feature, summing to 1 (all zero if no tree split).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 9.0 }).collect();
        (x, y)
    }

    #[test]
    fn single_tree_recovers_a_step() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_trees: 1,
            bootstrap: false,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let tree = RegressionTree::fit(&x, &y, (0..x.len()).collect(), &config, &mut rng);
        assert_eq!(tree.predict_row(&[3.0, 0.0]), 1.0);
        assert_eq!(tree.predict_row(&[35.0, 2.0]), 9.0);
        assert_eq!(tree.n_leaves(), 2);
        assert!((tree.feature_importances()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn forest_is_deterministic_for_a_seed() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_trees: 10,
            seed: 3,
            ..Default::default()
        };
        let a = RandomForest::fit(&x, &y, config.clone()).unwrap();
        let b = RandomForest::fit(&x, &y, config).unwrap();
        let queries = vec![vec![10.0, 1.0], vec![19.5, 0.0], vec![30.0, 2.0]];
        assert_eq!(a.predict(&queries), b.predict(&queries));
        assert_eq!(a.n_trees(), 10);
    }

    #[test]
    fn constant_target_predicts_the_constant() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y = vec![4.0; 10];
        let forest = RandomForest::fit(&x, &y, ForestConfig::default()).unwrap();
        assert_eq!(forest.predict_row(&[100.0]), 4.0);
        assert!(forest.feature_importances().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_and_mismatched_inputs_are_rejected() {
        assert!(matches!(
            RandomForest::fit(&[], &[], ForestConfig::default()),
            Err(FitError::EmptyTrainingSet)
        ));
        assert!(matches!(
            RandomForest::fit(&[vec![1.0]], &[1.0, 2.0], ForestConfig::default()),
            Err(FitError::ShapeMismatch { .. })
        ));
    }
}
