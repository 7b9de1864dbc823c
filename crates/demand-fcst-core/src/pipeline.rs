//! End-to-end run: records in, per-row forecasts out.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate_monthly, total_series, MissingMonths, MonthlySeries};
use crate::dataset::DemandRecord;
use crate::error::{ForecastError, Result};
use crate::forecast::{forecast_series, ForecastOptions, Technique};

/// Label of the row that forecasts the sum over all items.
pub const DEFAULT_GLOBAL_LABEL: &str = "All Items";

/// Which series are forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Only the total over all items.
    Global,
    /// Every item on its own.
    #[default]
    PerItem,
    /// The total first, then every item.
    Both,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::PerItem => "per-item",
            Scope::Both => "both",
        }
    }

    pub fn includes_total(&self) -> bool {
        matches!(self, Scope::Global | Scope::Both)
    }

    pub fn includes_items(&self) -> bool {
        matches!(self, Scope::PerItem | Scope::Both)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "global" | "total" => Ok(Scope::Global),
            "item" | "items" | "per-item" | "peritem" => Ok(Scope::PerItem),
            "both" | "all" => Ok(Scope::Both),
            _ => Err(ForecastError::InvalidParameter {
                param: "scope".into(),
                value: s.into(),
                reason: "expected one of: global, per-item, both".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub scope: Scope,
    pub forecast: ForecastOptions,
    pub missing_months: MissingMonths,
    pub global_label: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scope: Scope::default(),
            forecast: ForecastOptions::default(),
            missing_months: MissingMonths::default(),
            global_label: DEFAULT_GLOBAL_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Total,
    Item,
}

/// Forecast of one series together with the history it was fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub label: String,
    pub kind: RowKind,
    pub model_name: String,
    pub history_months: Vec<NaiveDate>,
    pub history_values: Vec<f64>,
    /// Forecast months, starting the month after the last observation.
    pub months: Vec<NaiveDate>,
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub mse: Option<f64>,
}

impl ForecastRow {
    /// Point forecast for `month`, if this row covers it.
    pub fn value_for(&self, month: NaiveDate) -> Option<f64> {
        self.months
            .iter()
            .position(|m| *m == month)
            .and_then(|i| self.point.get(i).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub technique: Technique,
    pub scope: Scope,
    pub horizon: usize,
    pub rows: Vec<ForecastRow>,
    pub skipped: Vec<SkippedItem>,
}

impl ForecastReport {
    /// Sorted union of the forecast months of every row.
    pub fn period_columns(&self) -> Vec<NaiveDate> {
        let months: BTreeSet<NaiveDate> = self
            .rows
            .iter()
            .flat_map(|row| row.months.iter().copied())
            .collect();
        months.into_iter().collect()
    }

    /// Column headers such as `"March 2025"`.
    pub fn period_labels(&self) -> Vec<String> {
        self.period_columns().into_iter().map(month_label).collect()
    }

    pub fn skipped_names(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.item.as_str()).collect()
    }
}

/// Full month name and year, e.g. `"January 2025"`.
pub fn month_label(month: NaiveDate) -> String {
    month.format("%B %Y").to_string()
}

/// Aggregate the records monthly and forecast every requested series.
pub fn run_pipeline(records: &[DemandRecord], options: &PipelineOptions) -> Result<ForecastReport> {
    options.forecast.validate()?;
    if records.is_empty() {
        return Err(ForecastError::InvalidInput(
            "The uploaded file contains no demand rows".into(),
        ));
    }

    let horizon = options.forecast.horizon();
    tracing::info!(
        records = records.len(),
        technique = %options.forecast.technique,
        scope = %options.scope,
        horizon,
        "running forecast pipeline"
    );

    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    if options.scope.includes_total() {
        let total = total_series(records, &options.global_label)?
            .with_missing_months(options.missing_months);
        match forecast_row(total, RowKind::Total, &options.forecast) {
            Ok(row) => rows.push(row),
            Err(ForecastError::InsufficientData { needed, got }) => {
                tracing::warn!(needed, got, "total series too short to forecast");
                skipped.push(SkippedItem {
                    item: options.global_label.clone(),
                    reason: format!("{} months of history, {} needed", got, needed),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if options.scope.includes_items() {
        let series = aggregate_monthly(records);
        tracing::debug!(items = series.len(), "aggregated monthly series");

        for s in series {
            let s = s.with_missing_months(options.missing_months);
            let key = s.key.clone();
            match forecast_row(s, RowKind::Item, &options.forecast) {
                Ok(row) => rows.push(row),
                Err(ForecastError::InsufficientData { needed, got }) => {
                    tracing::warn!(item = %key, needed, got, "skipping item with insufficient data");
                    skipped.push(SkippedItem {
                        item: key,
                        reason: format!("{} months of history, {} needed", got, needed),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    if rows.is_empty() {
        return Err(ForecastError::NoForecastableItems {
            skipped: skipped.into_iter().map(|s| s.item).collect(),
        });
    }

    tracing::info!(
        rows = rows.len(),
        skipped = skipped.len(),
        "forecast pipeline finished"
    );

    Ok(ForecastReport {
        technique: options.forecast.technique,
        scope: options.scope,
        horizon,
        rows,
        skipped,
    })
}

fn forecast_row(series: MonthlySeries, kind: RowKind, options: &ForecastOptions) -> Result<ForecastRow> {
    let forecast = forecast_series(&series.values, options)?;
    let months = series.future_months(forecast.point.len());
    tracing::debug!(
        label = %series.key,
        model = %forecast.model_name,
        history = series.len(),
        "forecast series"
    );

    Ok(ForecastRow {
        label: series.key,
        kind,
        model_name: forecast.model_name,
        history_months: series.months,
        history_values: series.values,
        months,
        point: forecast.point,
        lower: forecast.lower,
        upper: forecast.upper,
        mse: forecast.mse,
    })
}
