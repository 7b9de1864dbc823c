//! Gradient-boosted regression trees.
//!
//! Least-squares boosting: the ensemble starts from the target mean and every
//! round fits a depth-limited CART tree to the current residuals, adding a
//! shrunken copy of its prediction. Split search is exhaustive over the
//! sorted feature values and maximises the reduction in squared error.
//!
//! Defaults follow the usual gradient boosting settings (100 rounds,
//! learning rate 0.1) with a small minimum leaf size so the short monthly
//! series this crate deals with can still be split.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Hyperparameters of the boosted ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoostingParams {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage applied to each tree.
    pub learning_rate: f64,
    /// Maximum depth of every tree (root = depth 0).
    pub max_depth: usize,
    /// Minimum number of samples in each leaf.
    pub min_samples_leaf: usize,
    /// Minimum squared-error reduction required to split.
    pub min_gain: f64,
}

/// Leaves of two samples and depth-3 trees. LightGBM's own defaults
/// (`min_child_samples = 20`, `num_leaves = 31`) cannot split a series of a
/// few dozen months and collapse to the mean, so they are not used here.
impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 2,
            min_gain: 1e-12,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", self.n_estimators, "must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(invalid(
                "learning_rate",
                self.learning_rate,
                "must be in (0, 1]",
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(invalid(
                "min_samples_leaf",
                self.min_samples_leaf,
                "must be at least 1",
            ));
        }
        if !(self.min_gain >= 0.0) {
            return Err(invalid("min_gain", self.min_gain, "must be non-negative"));
        }
        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(param: &str, value: T, reason: &str) -> ForecastError {
    ForecastError::InvalidParameter {
        param: param.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
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

/// A single CART regression tree stored as a flat node arena.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    residuals: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(mut self, indices: Vec<usize>) -> RegressionTree {
        self.grow(indices, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        let mean = indices.iter().map(|&i| self.residuals[i]).sum::<f64>() / indices.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.params.max_depth || indices.len() < 2 * self.params.min_samples_leaf {
            return id;
        }

        let Some(split) = self.best_split(&indices) else {
            return id;
        };
        if split.gain <= self.params.min_gain {
            return id;
        }

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);

        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, indices: &[usize]) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf;
        let total: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let base = total * total / n as f64;
        let n_features = self.x[indices[0]].len();

        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..n_features {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            for pos in 1..n {
                left_sum += self.residuals[sorted[pos - 1]];
                let left_n = pos;
                let right_n = n - pos;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let lo = self.x[sorted[pos - 1]][feature];
                let hi = self.x[sorted[pos]][feature];
                if hi <= lo {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - base;

                if best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

impl RegressionTree {
    /// Fit a tree to `residuals` using rows of `x`.
    fn fit(x: &[Vec<f64>], residuals: &[f64], params: &BoostingParams) -> Self {
        TreeBuilder {
            x,
            residuals,
            params,
            nodes: Vec::new(),
        }
        .build((0..residuals.len()).collect())
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    id = if v <= *threshold { *left } else { *right };
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
}

/// Fitted boosted ensemble.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    base_score: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    /// Fit the ensemble on row-major features `x` and targets `y`.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: BoostingParams) -> Result<Self> {
        params.validate()?;

        if y.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        if x.len() != y.len() {
            return Err(ForecastError::InvalidInput(format!(
                "Feature matrix has {} rows but target has {}",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
            return Err(ForecastError::InvalidInput(
                "Feature rows must be non-empty and of equal length".into(),
            ));
        }
        if x.iter().flatten().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidInput(
                "Features and targets must be finite".into(),
            ));
        }

        let base_score = y.iter().sum::<f64>() / y.len() as f64;
        let mut predictions = vec![base_score; y.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y
                .iter()
                .zip(predictions.iter())
                .map(|(t, p)| t - p)
                .collect();
            if residuals.iter().all(|r| r.abs() < 1e-12) {
                break;
            }

            let tree = RegressionTree::fit(x, &residuals, &params);
            for (pred, row) in predictions.iter_mut().zip(x.iter()) {
                *pred += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            params,
            base_score,
            n_features,
            trees,
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.params.learning_rate * t.predict(row))
                .sum::<f64>()
    }

    pub fn predict_many(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_params_valid() {
        assert!(BoostingParams::default().validate().is_ok());
        let bad = BoostingParams {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = BoostingParams {
            min_samples_leaf: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_single_tree_learns_step() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let residuals: Vec<f64> = (0..10).map(|i| if i < 5 { -1.0 } else { 1.0 }).collect();
        let params = BoostingParams {
            max_depth: 1,
            min_samples_leaf: 1,
            ..Default::default()
        };
        let tree = RegressionTree::fit(&x, &residuals, &params);
        assert_eq!(tree.n_leaves(), 2);
        assert_relative_eq!(tree.predict(&[1.0]), -1.0);
        assert_relative_eq!(tree.predict(&[8.0]), 1.0);
        // Threshold sits halfway between 4 and 5
        assert_relative_eq!(tree.predict(&[4.4]), -1.0);
        assert_relative_eq!(tree.predict(&[4.6]), 1.0);
    }

    #[test]
    fn test_boosting_fits_linear_relation() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| 2.0 * i as f64 + 5.0).collect();
        let model = GradientBoostedTrees::fit(&x, &y, BoostingParams::default()).unwrap();

        assert_eq!(model.n_features(), 2);
        assert!(model.n_trees() > 0);
        let preds = model.predict_many(&x);
        let mse: f64 = preds
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        let variance: f64 = {
            let mean = y.iter().sum::<f64>() / y.len() as f64;
            y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / y.len() as f64
        };
        assert!(mse < variance * 0.05, "mse {mse} vs variance {variance}");
    }

    #[test]
    fn test_defaults_split_nine_training_rows() {
        // six months minimum minus three lags leaves very few rows
        let x: Vec<Vec<f64>> = (0..9).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..9).map(|i| if i < 4 { 10.0 } else { 30.0 }).collect();
        let model = GradientBoostedTrees::fit(&x, &y, BoostingParams::default()).unwrap();
        assert!(model.n_trees() > 0);
        assert!(model.predict(&[0.0]) < 15.0);
        assert!(model.predict(&[8.0]) > 25.0);
    }

    #[test]
    fn test_constant_target_gives_constant_model() {
        let x: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let y = vec![7.0; 5];
        let model = GradientBoostedTrees::fit(&x, &y, BoostingParams::default()).unwrap();
        assert_eq!(model.n_trees(), 0);
        assert_relative_eq!(model.predict(&[100.0]), 7.0);
        assert_relative_eq!(model.base_score(), 7.0);
    }

    #[test]
    fn test_out_of_range_inputs_follow_edge_leaves() {
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..12).map(|i| (i * 3 % 7) as f64).collect();
        let model = GradientBoostedTrees::fit(&x, &y, BoostingParams::default()).unwrap();
        assert_relative_eq!(model.predict(&[-50.0]), model.predict(&[0.0]));
        assert_relative_eq!(model.predict(&[500.0]), model.predict(&[11.0]));
    }

    #[test]
    fn test_fit_rejects_bad_shapes() {
        assert!(GradientBoostedTrees::fit(&[], &[], BoostingParams::default()).is_err());
        let x = vec![vec![1.0], vec![2.0, 3.0]];
        assert!(GradientBoostedTrees::fit(&x, &[1.0, 2.0], BoostingParams::default()).is_err());
        let x = vec![vec![1.0]];
        assert!(GradientBoostedTrees::fit(&x, &[1.0, 2.0], BoostingParams::default()).is_err());
        let x = vec![vec![f64::NAN]];
        assert!(GradientBoostedTrees::fit(&x, &[1.0], BoostingParams::default()).is_err());
    }
}
