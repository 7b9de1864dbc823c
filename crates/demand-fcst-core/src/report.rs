//! Export of a forecast report as a workbook or delimited file.
//!
//! Both layouts are the same table: an `Item Name` column followed by one
//! column per forecast month. Cells for months a row does not cover stay
//! blank.

use std::fmt;

use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::pipeline::ForecastReport;

pub const ITEM_NAME_HEADER: &str = "Item Name";
pub const SHEET_NAME: &str = "Forecast";
const FILE_STEM: &str = "ml_item_forecast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", FILE_STEM, self.extension())
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ReportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    /// Format implied by an output path, `None` for unknown extensions.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())?;
        ext.parse().ok()
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ReportFormat::Xlsx),
            "csv" => Ok(ReportFormat::Csv),
            _ => Err(ForecastError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Header row plus one row of optional values per forecast row.
pub fn table(report: &ForecastReport) -> (Vec<String>, Vec<(String, Vec<Option<f64>>)>) {
    let columns = report.period_columns();
    let mut header = vec![ITEM_NAME_HEADER.to_string()];
    header.extend(report.period_labels());

    let rows = report
        .rows
        .iter()
        .map(|row| {
            let cells = columns.iter().map(|m| row.value_for(*m).map(round2)).collect();
            (row.label.clone(), cells)
        })
        .collect();

    (header, rows)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn export_err(e: impl fmt::Display) -> ForecastError {
    ForecastError::ExportError(e.to_string())
}

pub fn write_xlsx(report: &ForecastReport) -> Result<Vec<u8>> {
    let (header, rows) = table(report);

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let number = Format::new().set_num_format("0.00");

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME).map_err(export_err)?;

    for (col, name) in header.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, name, &bold)
            .map_err(export_err)?;
    }
    worksheet.set_column_width(0, 24).map_err(export_err)?;

    for (r, (label, cells)) in rows.iter().enumerate() {
        let row = (r + 1) as u32;
        worksheet.write_string(row, 0, label).map_err(export_err)?;
        for (c, cell) in cells.iter().enumerate() {
            if let Some(v) = cell {
                worksheet
                    .write_number_with_format(row, (c + 1) as u16, *v, &number)
                    .map_err(export_err)?;
            }
        }
    }

    workbook.save_to_buffer().map_err(export_err)
}

pub fn write_csv(report: &ForecastReport) -> Result<Vec<u8>> {
    let (header, rows) = table(report);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header).map_err(export_err)?;
    for (label, cells) in rows {
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(label);
        record.extend(cells.iter().map(|c| match c {
            Some(v) => format!("{:.2}", v),
            None => String::new(),
        }));
        writer.write_record(&record).map_err(export_err)?;
    }

    writer.into_inner().map_err(export_err)
}

/// Serialise `report` in the requested format.
pub fn render(report: &ForecastReport, format: ReportFormat) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Xlsx => write_xlsx(report),
        ReportFormat::Csv => write_csv(report),
    }
}
