//! Web surface and command line for the demand forecasting pipeline.
//!
//! An upload form and a JSON API accept a demand spreadsheet, run
//! [`demand_fcst_core::run_pipeline`] on a blocking worker and hand the
//! report back as a page, as JSON, or as an xlsx/csv download.

pub mod chart;
pub mod cli;
pub mod config;
pub mod error;
pub mod html;
pub mod logging;
pub mod routes;
pub mod store;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use routes::{router, AppState};
pub use store::DownloadStore;
