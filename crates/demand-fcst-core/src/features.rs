//! Lag feature construction for autoregressive demand models.

use crate::error::{ForecastError, Result};

/// Default number of lagged months used as predictors.
pub const DEFAULT_LAGS: usize = 3;

/// Supervised-learning view of a series: each row holds the previous
/// `n_lags` values (most recent first) and the target is the current value.
#[derive(Debug, Clone, PartialEq)]
pub struct LagMatrix {
    pub n_lags: usize,
    /// `features[r] = [y[t-1], y[t-2], ..., y[t-n_lags]]`
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl LagMatrix {
    /// Build lag rows for every position that has a full lag window.
    pub fn build(values: &[f64], n_lags: usize) -> Result<Self> {
        if n_lags == 0 {
            return Err(ForecastError::InvalidParameter {
                param: "n_lags".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let mut features = Vec::with_capacity(values.len().saturating_sub(n_lags));
        let mut targets = Vec::with_capacity(values.len().saturating_sub(n_lags));
        for t in n_lags..values.len() {
            features.push((1..=n_lags).map(|k| values[t - k]).collect());
            targets.push(values[t]);
        }

        Ok(Self {
            n_lags,
            features,
            targets,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Lag vector of the last training row.
    pub fn last_row(&self) -> Option<&[f64]> {
        self.features.last().map(|row| row.as_slice())
    }

    /// Column `j` of the feature matrix (lag `j + 1`).
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.features.iter().map(|row| row[j]).collect()
    }
}

/// Lag vector used to seed a recursive forecast.
///
/// This is the feature row of the last training observation, i.e. the values
/// that preceded the final observed month, so the first prediction is made
/// from the same inputs the model saw for that month.
pub fn latest_lags(values: &[f64], n_lags: usize) -> Option<Vec<f64>> {
    if n_lags == 0 || values.len() <= n_lags {
        return None;
    }
    let t = values.len() - 1;
    Some((1..=n_lags).map(|k| values[t - k]).collect())
}

/// Shift a lag vector by one step, placing `prediction` in front.
pub fn roll_lags(lags: &[f64], prediction: f64) -> Vec<f64> {
    let mut next = Vec::with_capacity(lags.len());
    if lags.is_empty() {
        return next;
    }
    next.push(prediction);
    next.extend_from_slice(&lags[..lags.len() - 1]);
    next
}
