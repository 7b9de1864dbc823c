//! Core library of the monthly demand forecasting service.
//!
//! Reads demand spreadsheets, aggregates them per month and item, fits a
//! forecasting model per series and exports the result table.

pub mod aggregate;
pub mod boosting;
pub mod dataset;
pub mod error;
pub mod features;
pub mod forecast;
pub mod imputation;
pub mod metrics;
pub mod pipeline;
pub mod report;

// Re-exports for convenience
pub use aggregate::{aggregate_monthly, month_start, total_series, MissingMonths, MonthlySeries};
pub use boosting::{BoostingParams, GradientBoostedTrees};
pub use dataset::{read_demand, DemandRecord, SpreadsheetFormat};
pub use error::{ForecastError, Result};
pub use features::{LagMatrix, DEFAULT_LAGS};
pub use forecast::{forecast_series, ForecastOptions, SeriesForecast, Technique, MAX_HORIZON};
pub use metrics::{mae, mape, mse, rmse, smape};
pub use pipeline::{
    month_label, run_pipeline, ForecastReport, ForecastRow, PipelineOptions, RowKind, Scope,
    SkippedItem, DEFAULT_GLOBAL_LABEL,
};
pub use report::{render, write_csv, write_xlsx, ReportFormat};
