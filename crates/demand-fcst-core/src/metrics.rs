//! Accuracy of fitted values against observed monthly demand.
//!
//! MAE and RMSE are in demand units. MAPE and sMAPE are percentages and
//! leave out months where the ratio is undefined.

use crate::error::{ForecastError, Result};

fn check_pair(actual: &[f64], fitted: &[f64]) -> Result<()> {
    if actual.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    if actual.len() != fitted.len() {
        return Err(ForecastError::InvalidInput(format!(
            "Observed and fitted series differ in length: {} vs {}",
            actual.len(),
            fitted.len()
        )));
    }
    Ok(())
}

fn mean_error(actual: &[f64], fitted: &[f64], err: impl Fn(f64, f64) -> f64) -> Result<f64> {
    check_pair(actual, fitted)?;
    let total: f64 = actual.iter().zip(fitted).map(|(&a, &f)| err(a, f)).sum();
    Ok(total / actual.len() as f64)
}

/// Percentage mean over the months where `term` is defined; NaN if none is.
fn mean_percent(
    actual: &[f64],
    fitted: &[f64],
    term: impl Fn(f64, f64) -> Option<f64>,
) -> Result<f64> {
    check_pair(actual, fitted)?;
    let (sum, n) = actual
        .iter()
        .zip(fitted)
        .filter_map(|(&a, &f)| term(a, f))
        .fold((0.0, 0usize), |(s, n), t| (s + t, n + 1));
    if n == 0 {
        return Ok(f64::NAN);
    }
    Ok(100.0 * sum / n as f64)
}

/// Mean absolute error.
///
/// ```
/// use demand_fcst_core::metrics::mae;
/// let observed = [120.0, 80.0, 100.0];
/// let fitted = [110.0, 90.0, 100.0];
/// assert!((mae(&observed, &fitted).unwrap() - 20.0 / 3.0).abs() < 1e-9);
/// ```
pub fn mae(actual: &[f64], fitted: &[f64]) -> Result<f64> {
    mean_error(actual, fitted, |a, f| (a - f).abs())
}

/// Mean squared error. Shown next to every forecast row.
pub fn mse(actual: &[f64], fitted: &[f64]) -> Result<f64> {
    mean_error(actual, fitted, |a, f| (a - f) * (a - f))
}

pub fn rmse(actual: &[f64], fitted: &[f64]) -> Result<f64> {
    mse(actual, fitted).map(f64::sqrt)
}

/// Mean absolute percentage error. Months with zero demand are left out.
pub fn mape(actual: &[f64], fitted: &[f64]) -> Result<f64> {
    mean_percent(actual, fitted, |a, f| {
        (a != 0.0).then(|| ((a - f) / a).abs())
    })
}

/// Symmetric MAPE (0 to 200). Months where both values are zero are left out.
pub fn smape(actual: &[f64], fitted: &[f64]) -> Result<f64> {
    mean_percent(actual, fitted, |a, f| {
        let scale = a.abs() + f.abs();
        (scale != 0.0).then(|| 2.0 * (a - f).abs() / scale)
    })
}
