//! Error types for the demand forecasting pipeline.

use thiserror::Error;

/// Result type for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error types for ingestion, modelling and export.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required columns: Date, Item Code, Demand (missing: {})", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("Invalid value in row {row}, column '{column}': '{value}'")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("No forecastable items found ({} skipped)", .skipped.len())]
    NoForecastableItems { skipped: Vec<String> },

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export error: {0}")]
    ExportError(String),
}

impl ForecastError {
    /// Stable numeric code for API error bodies.
    pub fn to_code(&self) -> i32 {
        match self {
            ForecastError::InvalidInput(_) => 2,
            ForecastError::MissingColumns { .. } => 3,
            ForecastError::InvalidDateFormat(_) => 4,
            ForecastError::InvalidValue { .. } => 5,
            ForecastError::UnsupportedFormat(_) => 6,
            ForecastError::InsufficientData { .. } => 7,
            ForecastError::ComputationError(_) => 8,
            ForecastError::NoForecastableItems { .. } => 9,
            ForecastError::InvalidParameter { .. } => 10,
            ForecastError::Io(_) => 11,
            ForecastError::ExportError(_) => 12,
        }
    }

    /// True when the error was caused by the uploaded data or the request
    /// options rather than by the service itself.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            ForecastError::ComputationError(_)
                | ForecastError::Io(_)
                | ForecastError::ExportError(_)
        )
    }

    /// Short snake_case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::InvalidInput(_) => "invalid_input",
            ForecastError::MissingColumns { .. } => "missing_columns",
            ForecastError::InvalidDateFormat(_) => "invalid_date_format",
            ForecastError::InvalidValue { .. } => "invalid_value",
            ForecastError::UnsupportedFormat(_) => "unsupported_format",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::ComputationError(_) => "computation_error",
            ForecastError::NoForecastableItems { .. } => "no_forecastable_items",
            ForecastError::InvalidParameter { .. } => "invalid_parameter",
            ForecastError::Io(_) => "io_error",
            ForecastError::ExportError(_) => "export_error",
        }
    }
}
