//! Per-series forecasting: lag models and exponential smoothing.

use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::boosting::{BoostingParams, GradientBoostedTrees};
use crate::error::{ForecastError, Result};
use crate::features::{latest_lags, roll_lags, LagMatrix, DEFAULT_LAGS};
use crate::metrics::mse;

use anofox_forecast::models::exponential::{ETSSpec, ETS as ETSModel};
use anofox_forecast::prelude::Forecaster;

/// Upper bound on the number of months a request may forecast.
pub const MAX_HORIZON: usize = 60;

/// Forecasting technique applied to every series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technique {
    /// Gradient-boosted trees on lagged demand.
    #[default]
    LagBoosting,
    /// Ordinary least squares on lagged demand.
    LagLinear,
    /// Holt-Winters when the history covers two seasons, Holt otherwise.
    ExponentialSmoothing,
}

impl Technique {
    /// Months forecast when the request does not set a horizon.
    pub fn default_horizon(&self) -> usize {
        match self {
            Technique::LagBoosting | Technique::LagLinear => 5,
            Technique::ExponentialSmoothing => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Technique::LagBoosting => "lag-boosting",
            Technique::LagLinear => "lag-linear",
            Technique::ExponentialSmoothing => "exponential-smoothing",
        }
    }

    /// Human-readable name for tables and logs.
    pub fn display_name(&self) -> &'static str {
        match self {
            Technique::LagBoosting => "Gradient boosting (lags 1-3)",
            Technique::LagLinear => "Linear autoregression (lags 1-3)",
            Technique::ExponentialSmoothing => "Exponential smoothing",
        }
    }

    pub fn uses_lags(&self) -> bool {
        matches!(self, Technique::LagBoosting | Technique::LagLinear)
    }

    pub fn all() -> &'static [Technique] {
        &[
            Technique::LagBoosting,
            Technique::LagLinear,
            Technique::ExponentialSmoothing,
        ]
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Technique {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "lag-boosting" | "lightgbm" | "gbm" | "boosting" => Ok(Technique::LagBoosting),
            "lag-linear" | "linear" | "ols" => Ok(Technique::LagLinear),
            "exponential-smoothing" | "holt-winters" | "holtwinters" | "hw" | "ets"
            | "smoothing" => Ok(Technique::ExponentialSmoothing),
            _ => Err(ForecastError::InvalidParameter {
                param: "technique".into(),
                value: s.into(),
                reason: "expected one of: lag-boosting, lag-linear, exponential-smoothing".into(),
            }),
        }
    }
}

/// Options shared by every series forecast in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastOptions {
    pub technique: Technique,
    /// Months to forecast; `None` uses the technique default.
    pub horizon: Option<usize>,
    pub n_lags: usize,
    /// Minimum number of monthly observations before a series is modelled.
    pub min_history: usize,
    /// Minimum number of complete lag rows for the lag models.
    pub min_training_rows: usize,
    pub season_length: usize,
    /// History length from which a seasonal term is fitted;
    /// `None` means two full seasons.
    pub seasonal_threshold: Option<usize>,
    pub confidence_level: f64,
    /// Floor point forecasts and lower bounds at zero.
    pub clip_negative: bool,
    pub boosting: BoostingParams,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            technique: Technique::default(),
            horizon: None,
            n_lags: DEFAULT_LAGS,
            min_history: 6,
            min_training_rows: 3,
            season_length: 12,
            seasonal_threshold: None,
            confidence_level: 0.95,
            clip_negative: true,
            boosting: BoostingParams::default(),
        }
    }
}

impl ForecastOptions {
    pub fn for_technique(technique: Technique) -> Self {
        Self {
            technique,
            ..Self::default()
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
            .unwrap_or_else(|| self.technique.default_horizon())
    }

    pub fn seasonal_threshold(&self) -> usize {
        self.seasonal_threshold
            .unwrap_or(2 * self.season_length)
    }

    pub fn validate(&self) -> Result<()> {
        let horizon = self.horizon();
        if horizon == 0 {
            return Err(invalid("horizon", horizon, "must be positive"));
        }
        if horizon > MAX_HORIZON {
            return Err(invalid(
                "horizon",
                horizon,
                &format!("must not exceed {}", MAX_HORIZON),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(invalid(
                "confidence_level",
                self.confidence_level,
                "must be between 0 and 1",
            ));
        }
        if self.n_lags == 0 {
            return Err(invalid("n_lags", self.n_lags, "must be at least 1"));
        }
        if self.season_length < 2 {
            return Err(invalid("season_length", self.season_length, "must be at least 2"));
        }
        if self.min_training_rows == 0 {
            return Err(invalid(
                "min_training_rows",
                self.min_training_rows,
                "must be at least 1",
            ));
        }
        if self.technique == Technique::LagBoosting {
            self.boosting.validate()?;
        }
        Ok(())
    }
}

fn invalid(param: &str, value: impl fmt::Display, reason: &str) -> ForecastError {
    ForecastError::InvalidParameter {
        param: param.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Forecast of a single series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesForecast {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// In-sample fitted values aligned with the last `fitted.len()`
    /// observations of the history.
    pub fitted: Vec<f64>,
    pub model_name: String,
    /// Mean squared error of the fitted values.
    pub mse: Option<f64>,
}

/// Forecast one monthly series with the configured technique.
pub fn forecast_series(values: &[f64], options: &ForecastOptions) -> Result<SeriesForecast> {
    options.validate()?;

    if values.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::InvalidInput(
            "Series contains non-finite values".into(),
        ));
    }
    let needed = options.min_history.max(2);
    if values.len() < needed {
        return Err(ForecastError::InsufficientData {
            needed,
            got: values.len(),
        });
    }

    let horizon = options.horizon();
    let raw = match options.technique {
        Technique::LagBoosting | Technique::LagLinear => forecast_lag_model(values, options)?,
        Technique::ExponentialSmoothing => forecast_smoothing(values, horizon, options)?,
    };

    let tail = &values[values.len() - raw.fitted.len()..];
    let fit_mse = if raw.fitted.is_empty() {
        None
    } else {
        mse(tail, &raw.fitted).ok()
    };
    let residual_sd = residual_std(tail, &raw.fitted).unwrap_or_else(|| std_dev(values));
    let (mut lower, mut upper) =
        calculate_confidence_intervals(&raw.point, residual_sd, options.confidence_level)?;

    let mut point = raw.point;
    if options.clip_negative {
        for v in point.iter_mut().chain(lower.iter_mut()) {
            *v = v.max(0.0);
        }
        for v in upper.iter_mut() {
            *v = v.max(0.0);
        }
    }

    Ok(SeriesForecast {
        point,
        lower,
        upper,
        fitted: raw.fitted,
        model_name: raw.model_name,
        mse: fit_mse,
    })
}

struct RawForecast {
    point: Vec<f64>,
    fitted: Vec<f64>,
    model_name: String,
}

// ============================================================================
// Lag models
// ============================================================================

trait LagRegressor {
    fn predict_one(&self, lags: &[f64]) -> f64;
}

impl LagRegressor for GradientBoostedTrees {
    fn predict_one(&self, lags: &[f64]) -> f64 {
        self.predict(lags)
    }
}

/// Linear autoregression `y = intercept + sum(beta_k * lag_k)`.
#[derive(Debug, Clone)]
struct LinearLagModel {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LagRegressor for LinearLagModel {
    fn predict_one(&self, lags: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(lags.iter())
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }
}

use anofox_regression::prelude::*;

fn fit_linear_lags(matrix: &LagMatrix) -> Result<LinearLagModel> {
    let n = matrix.n_rows();
    let k = matrix.n_lags;

    let x_mat = faer::Mat::from_fn(n, k, |i, j| matrix.features[i][j]);
    let y_col = faer::Col::from_fn(n, |i| matrix.targets[i]);

    let fitted = OlsRegressor::builder()
        .with_intercept(true)
        .build()
        .fit(&x_mat, &y_col)
        .map_err(|e| ForecastError::ComputationError(format!("Failed to fit OLS model: {}", e)))?;

    // Aliased lags (e.g. a perfectly linear history) come back as NaN.
    let intercept = fitted.intercept().unwrap_or(0.0);
    let coeffs_col = fitted.coefficients();
    let coefficients = (0..coeffs_col.nrows())
        .map(|i| coeffs_col[i])
        .map(|b| if b.is_finite() { b } else { 0.0 })
        .collect();

    Ok(LinearLagModel {
        intercept: if intercept.is_finite() { intercept } else { 0.0 },
        coefficients,
    })
}

fn forecast_lag_model(values: &[f64], options: &ForecastOptions) -> Result<RawForecast> {
    let matrix = LagMatrix::build(values, options.n_lags)?;
    if matrix.n_rows() < options.min_training_rows {
        return Err(ForecastError::InsufficientData {
            needed: options.min_training_rows + options.n_lags,
            got: values.len(),
        });
    }

    let (model, model_name): (Box<dyn LagRegressor>, String) = match options.technique {
        Technique::LagLinear => (
            Box::new(fit_linear_lags(&matrix)?),
            format!("LinearAR({})", options.n_lags),
        ),
        _ => {
            let gbt = GradientBoostedTrees::fit(&matrix.features, &matrix.targets, options.boosting)?;
            let name = format!("GBT(lags={}, trees={})", options.n_lags, gbt.n_trees());
            (Box::new(gbt), name)
        }
    };

    let fitted: Vec<f64> = matrix
        .features
        .iter()
        .map(|row| model.predict_one(row))
        .collect();

    let mut lags = latest_lags(values, options.n_lags).ok_or(ForecastError::InsufficientData {
        needed: options.n_lags + 1,
        got: values.len(),
    })?;
    let horizon = options.horizon();
    let mut point = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let prediction = model.predict_one(&lags);
        point.push(prediction);
        lags = roll_lags(&lags, prediction);
    }

    Ok(RawForecast {
        point,
        fitted,
        model_name,
    })
}

// ============================================================================
// Exponential smoothing
// ============================================================================

fn forecast_smoothing(
    values: &[f64],
    horizon: usize,
    options: &ForecastOptions,
) -> Result<RawForecast> {
    let seasonal = values.len() >= options.seasonal_threshold();
    let (notation, period) = if seasonal {
        ("AAA", options.season_length)
    } else {
        ("AAN", 1)
    };

    match forecast_with_ets(values, horizon, period, notation) {
        Ok(raw) if raw.point.len() == horizon && raw.point.iter().all(|v| v.is_finite()) => {
            Ok(raw)
        }
        Ok(_) | Err(_) => {
            tracing::debug!(notation, "ETS fit unusable, using fixed-parameter smoothing");
            if seasonal {
                Ok(holt_winters_additive(
                    values,
                    horizon,
                    options.season_length,
                    0.3,
                    0.1,
                    0.1,
                ))
            } else {
                Ok(holt_linear(values, horizon, 0.3, 0.1))
            }
        }
    }
}

fn forecast_with_ets(
    values: &[f64],
    horizon: usize,
    period: usize,
    notation: &str,
) -> Result<RawForecast> {
    use anofox_forecast::core::TimeSeriesBuilder;

    let spec = ETSSpec::from_notation(notation).map_err(|e| {
        ForecastError::ComputationError(format!("Invalid ETS specification '{}': {}", notation, e))
    })?;

    let time_series = TimeSeriesBuilder::new()
        .values(values.to_vec())
        .build()
        .map_err(|e| {
            ForecastError::ComputationError(format!("Failed to build TimeSeries: {}", e))
        })?;

    let mut forecaster = ETSModel::new(spec, period);
    forecaster
        .fit(&time_series)
        .map_err(|e| ForecastError::ComputationError(format!("Failed to fit ETS model: {}", e)))?;

    let forecast = forecaster.predict(horizon).map_err(|e| {
        ForecastError::ComputationError(format!("Failed to generate ETS forecasts: {}", e))
    })?;

    let point = forecast.point().first().cloned().unwrap_or_default();
    let mut fitted = forecaster
        .fitted_values()
        .map(|v| v.to_vec())
        .unwrap_or_default();
    fitted.retain(|v| v.is_finite());
    fitted.truncate(values.len());

    let model_name = if period > 1 {
        format!("HoltWinters(additive, period={})", period)
    } else {
        "Holt".to_string()
    };

    Ok(RawForecast {
        point,
        fitted,
        model_name,
    })
}

fn holt_linear(values: &[f64], horizon: usize, alpha: f64, beta: f64) -> RawForecast {
    let mut level = values[0];
    let mut trend = values.get(1).map_or(0.0, |v| v - values[0]);
    let mut fitted = Vec::with_capacity(values.len().saturating_sub(1));

    for &v in values.iter().skip(1) {
        fitted.push(level + trend);
        let prev_level = level;
        level = alpha * v + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }

    RawForecast {
        point: (1..=horizon).map(|h| level + trend * h as f64).collect(),
        fitted,
        model_name: "Holt".to_string(),
    }
}

fn holt_winters_additive(
    values: &[f64],
    horizon: usize,
    period: usize,
    alpha: f64,
    beta: f64,
    gamma: f64,
) -> RawForecast {
    let p = period.max(2);
    if values.len() < 2 * p {
        return holt_linear(values, horizon, alpha, beta);
    }

    let initial_level = values[..p].iter().sum::<f64>() / p as f64;
    let mut level = initial_level;
    let mut trend = (values[p..2 * p].iter().sum::<f64>() / p as f64 - initial_level) / p as f64;
    let mut seasonal: Vec<f64> = values[..p].iter().map(|v| v - initial_level).collect();
    let mut fitted = Vec::with_capacity(values.len() - p);

    for (i, &v) in values.iter().enumerate().skip(p) {
        let s_idx = i % p;
        fitted.push(level + trend + seasonal[s_idx]);
        let prev_level = level;
        level = alpha * (v - seasonal[s_idx]) + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        seasonal[s_idx] = gamma * (v - level) + (1.0 - gamma) * seasonal[s_idx];
    }

    let point = (1..=horizon)
        .map(|h| level + trend * h as f64 + seasonal[(values.len() + h - 1) % p])
        .collect();

    RawForecast {
        point,
        fitted,
        model_name: format!("HoltWinters(additive, period={})", p),
    }
}

// ============================================================================
// Intervals
// ============================================================================

fn residual_std(actual: &[f64], fitted: &[f64]) -> Option<f64> {
    if fitted.len() < 2 || actual.len() != fitted.len() {
        return None;
    }
    let residuals: Vec<f64> = actual.iter().zip(fitted).map(|(a, f)| a - f).collect();
    Some(std_dev(&residuals))
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn calculate_confidence_intervals(
    forecasts: &[f64],
    std_error: f64,
    confidence: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::ComputationError(format!("Normal distribution: {}", e)))?;
    let z = normal.inverse_cdf(0.5 + confidence / 2.0);

    let width = |i: usize| z * std_error * ((i + 1) as f64).sqrt();
    let lower = forecasts
        .iter()
        .enumerate()
        .map(|(i, &f)| f - width(i))
        .collect();
    let upper = forecasts
        .iter()
        .enumerate()
        .map(|(i, &f)| f + width(i))
        .collect();

    Ok((lower, upper))
}
