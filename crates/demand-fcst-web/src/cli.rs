//! Command line: serve the web surface, or run one forecast offline.

use std::fmt::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use demand_fcst_core::{
    read_demand, render, run_pipeline, ForecastError, ForecastReport, PipelineOptions,
    ReportFormat, Scope, SpreadsheetFormat, Technique,
};

use crate::config::{Config, ConfigError};

#[derive(Parser, Debug)]
#[command(version, about = "Monthly demand forecasting service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to a TOML config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server (default)
    Serve {
        /// Override `server.host`
        #[arg(long)]
        host: Option<IpAddr>,
        /// Override `server.port`
        #[arg(long)]
        port: Option<u16>,
    },
    /// Forecast a demand file and write the report without starting a server
    Forecast {
        /// Demand file (.xlsx, .xls, .ods or .csv)
        #[arg(short, long)]
        input: PathBuf,
        /// Report file ending in .xlsx or .csv (defaults to ml_item_forecast.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// lag-boosting, lag-linear or exponential-smoothing
        #[arg(short, long)]
        technique: Option<Technique>,
        /// per-item, global or both
        #[arg(short, long)]
        scope: Option<Scope>,
        /// Months to forecast
        #[arg(long)]
        horizon: Option<usize>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("Failed to access {1}: {0}")]
    Io(std::io::Error, PathBuf),
}

/// Load the config file and apply the `serve` overrides.
pub fn load_config(path: Option<&Path>, command: Option<&Command>) -> Result<Config, CliError> {
    let mut config = Config::load(path)?;
    if let Some(Command::Serve { host, port }) = command {
        if let Some(host) = host {
            config.server.host = *host;
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    Ok(config)
}

/// Settings of one offline run.
#[derive(Debug, Clone)]
pub struct OfflineRun {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: ReportFormat,
    pub options: PipelineOptions,
}

impl OfflineRun {
    pub fn new(
        config: &Config,
        input: PathBuf,
        output: Option<PathBuf>,
        technique: Option<Technique>,
        scope: Option<Scope>,
        horizon: Option<usize>,
    ) -> Result<Self, CliError> {
        let mut options = config.forecast.pipeline_options();
        if let Some(technique) = technique {
            options.forecast.technique = technique;
        }
        if let Some(scope) = scope {
            options.scope = scope;
        }
        if horizon.is_some() {
            options.forecast.horizon = horizon;
        }

        let (format, output) = match output {
            Some(path) => {
                let name = path.to_string_lossy().into_owned();
                let format = ReportFormat::from_path(&name).ok_or_else(|| {
                    ForecastError::UnsupportedFormat(format!(
                        "'{}' (expected an .xlsx or .csv output file)",
                        name
                    ))
                })?;
                (format, path)
            }
            None => {
                let format = ReportFormat::default();
                (format, PathBuf::from(format.file_name()))
            }
        };

        Ok(Self {
            input,
            output,
            format,
            options,
        })
    }

    /// Read the input, run the pipeline and write the report file.
    pub fn execute(&self) -> Result<ForecastReport, CliError> {
        let name = self.input.to_string_lossy();
        let format = SpreadsheetFormat::from_file_name(&name)?;
        let bytes =
            std::fs::read(&self.input).map_err(|e| CliError::Io(e, self.input.clone()))?;

        let records = read_demand(&bytes, format)?;
        let report = run_pipeline(&records, &self.options)?;

        let data = render(&report, self.format)?;
        std::fs::write(&self.output, data).map_err(|e| CliError::Io(e, self.output.clone()))?;
        tracing::info!(output = %self.output.display(), format = %self.format, "report written");

        Ok(report)
    }
}

/// Plain-text table of the report for the terminal.
pub fn summary(report: &ForecastReport) -> String {
    let (header, rows) = demand_fcst_core::report::table(report);
    let label_width = rows
        .iter()
        .map(|(label, _)| label.chars().count())
        .chain(std::iter::once(header[0].chars().count()))
        .max()
        .unwrap_or(0);
    let cell_width = header[1..]
        .iter()
        .map(|h| h.chars().count())
        .max()
        .unwrap_or(0)
        .max(10);

    let mut out = String::new();
    let _ = write!(out, "{:<w$}", header[0], w = label_width);
    for h in &header[1..] {
        let _ = write!(out, "  {:>w$}", h, w = cell_width);
    }
    out.push('\n');

    for (label, cells) in rows {
        let _ = write!(out, "{:<w$}", label, w = label_width);
        for cell in cells {
            match cell {
                Some(v) => {
                    let _ = write!(out, "  {:>w$.2}", v, w = cell_width);
                }
                None => {
                    let _ = write!(out, "  {:>w$}", "", w = cell_width);
                }
            }
        }
        out.push('\n');
    }

    let skipped = report.skipped_names();
    if !skipped.is_empty() {
        let _ = writeln!(
            out,
            "\n{}{}",
            crate::html::SKIPPED_PREFIX,
            skipped.join(", ")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use demand_fcst_core::{ForecastRow, RowKind, SkippedItem};

    #[test]
    fn test_parse_forecast_command() {
        let cli = Cli::parse_from([
            "demand-fcst",
            "--config",
            "svc.toml",
            "forecast",
            "--input",
            "orders.xlsx",
            "--technique",
            "holt-winters",
            "--scope",
            "both",
            "--horizon",
            "12",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("svc.toml")));
        match cli.command {
            Some(Command::Forecast {
                input,
                output,
                technique,
                scope,
                horizon,
            }) => {
                assert_eq!(input, PathBuf::from("orders.xlsx"));
                assert_eq!(output, None);
                assert_eq!(technique, Some(Technique::ExponentialSmoothing));
                assert_eq!(scope, Some(Scope::Both));
                assert_eq!(horizon, Some(12));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_serve_is_default_and_overrides_apply() {
        let cli = Cli::parse_from(["demand-fcst"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["demand-fcst", "serve", "--port", "9000"]);
        let config = load_config(None, cli.command.as_ref()).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_offline_run_picks_format_from_extension() {
        let config = Config::default();
        let run = OfflineRun::new(
            &config,
            "in.csv".into(),
            Some("out/report.csv".into()),
            None,
            None,
            Some(3),
        )
        .unwrap();
        assert_eq!(run.format, ReportFormat::Csv);
        assert_eq!(run.options.forecast.horizon, Some(3));

        let run = OfflineRun::new(&config, "in.csv".into(), None, None, None, None).unwrap();
        assert_eq!(run.format, ReportFormat::Xlsx);
        assert_eq!(run.output, PathBuf::from("ml_item_forecast.xlsx"));
    }

    #[test]
    fn test_offline_run_rejects_unknown_output_extension() {
        let config = Config::default();
        for output in ["report.txt", "report"] {
            let err = OfflineRun::new(
                &config,
                "in.csv".into(),
                Some(output.into()),
                None,
                None,
                None,
            )
            .unwrap_err();
            assert!(matches!(
                err,
                CliError::Forecast(ForecastError::UnsupportedFormat(_))
            ));
        }
    }

    #[test]
    fn test_summary_lists_rows_and_skipped() {
        let month = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let report = ForecastReport {
            technique: Technique::LagBoosting,
            scope: Scope::PerItem,
            horizon: 1,
            rows: vec![ForecastRow {
                label: "SKU-1".into(),
                kind: RowKind::Item,
                model_name: "GBT".into(),
                history_months: vec![],
                history_values: vec![],
                months: vec![month],
                point: vec![12.345],
                lower: vec![10.0],
                upper: vec![14.0],
                mse: None,
            }],
            skipped: vec![SkippedItem {
                item: "SKU-9".into(),
                reason: "needs 6 months".into(),
            }],
        };

        let text = summary(&report);
        assert!(text.starts_with("Item Name"));
        assert!(text.contains("June 2024"));
        assert!(text.contains("12.35"));
        assert!(text.contains("Skipped items due to insufficient data: SKU-9"));
    }
}
