//! Spreadsheet ingestion.
//!
//! Reads the first worksheet of an Excel/ODS workbook (via `calamine`) or a
//! CSV file (via `csv`) into [`DemandRecord`]s. Headers are normalised the
//! same way regardless of format: surrounding whitespace is trimmed and every
//! word is title-cased, so `" item code"` and `"ITEM CODE"` both resolve to
//! `Item Code`.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Column holding the observation date.
pub const DATE_COLUMN: &str = "Date";
/// Column holding the item key.
pub const ITEM_COLUMN: &str = "Item Code";
/// Column holding the demanded quantity.
pub const DEMAND_COLUMN: &str = "Demand";

const REQUIRED_COLUMNS: [&str; 3] = [DATE_COLUMN, ITEM_COLUMN, DEMAND_COLUMN];

/// Largest serial number Excel accepts (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    Xlsx,
    Xls,
    Ods,
    Csv,
}

impl SpreadsheetFormat {
    /// Detect the format from a file name extension.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" => Ok(SpreadsheetFormat::Xlsx),
            "xls" => Ok(SpreadsheetFormat::Xls),
            "ods" => Ok(SpreadsheetFormat::Ods),
            "csv" | "txt" => Ok(SpreadsheetFormat::Csv),
            _ => Err(ForecastError::UnsupportedFormat(format!(
                "'{}' (expected .xlsx, .xls, .ods or .csv)",
                name
            ))),
        }
    }

    pub fn is_workbook(&self) -> bool {
        !matches!(self, SpreadsheetFormat::Csv)
    }
}

/// One row of the uploaded demand history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    pub date: NaiveDate,
    pub item: String,
    pub demand: f64,
}

/// A cell value independent of the source format.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) => format_number_key(*v),
            Cell::Text(s) => s.trim().to_string(),
            Cell::DateTime(dt) => dt.to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Float(v) => Cell::Number(*v),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
                Some(parsed) => Cell::DateTime(parsed),
                None => Cell::Number(dt.as_f64()),
            },
        }
    }
}

/// Read demand records from an uploaded file.
pub fn read_demand(bytes: &[u8], format: SpreadsheetFormat) -> Result<Vec<DemandRecord>> {
    let rows = if format.is_workbook() {
        read_workbook_rows(bytes)?
    } else {
        read_csv_rows(bytes)?
    };
    records_from_rows(rows)
}

fn read_workbook_rows(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ForecastError::InvalidInput(format!("Failed to open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ForecastError::InvalidInput("Workbook contains no worksheets".into()))?
        .map_err(|e| ForecastError::InvalidInput(format!("Failed to read worksheet: {}", e)))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ForecastError::InvalidInput(format!("Malformed CSV: {}", e)))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}

fn records_from_rows(rows: Vec<Vec<Cell>>) -> Result<Vec<DemandRecord>> {
    let mut iter = rows.into_iter().enumerate();

    let header = match iter.next() {
        Some((_, header)) => header,
        None => {
            return Err(ForecastError::InvalidInput(
                "The uploaded file is empty".into(),
            ))
        }
    };
    let names: Vec<String> = header
        .iter()
        .map(|cell| normalize_header(&cell.display()))
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !names.iter().any(|n| n == *required))
        .map(|s| s.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ForecastError::MissingColumns { missing });
    }

    let position = |column: &str| names.iter().position(|n| n == column).unwrap_or(0);
    let date_idx = position(DATE_COLUMN);
    let item_idx = position(ITEM_COLUMN);
    let demand_idx = position(DEMAND_COLUMN);

    let mut records = Vec::new();
    for (idx, row) in iter {
        // 1-based spreadsheet row number, header included
        let row_number = idx + 1;
        if row.iter().all(Cell::is_empty) {
            continue;
        }

        let cell = |i: usize| row.get(i).cloned().unwrap_or(Cell::Empty);

        // Rows without a date or an item belong to no group
        let date_cell = cell(date_idx);
        let item = cell(item_idx).display();
        if date_cell.is_empty() || item.is_empty() {
            tracing::debug!(row = row_number, "skipping row without date or item code");
            continue;
        }

        let date = parse_date_cell(&date_cell).ok_or_else(|| {
            ForecastError::InvalidDateFormat(format!(
                "row {}: '{}' is not a recognised date",
                row_number,
                date_cell.display()
            ))
        })?;

        // A blank demand still creates the month, with nothing added to it
        let demand_cell = cell(demand_idx);
        let demand = if demand_cell.is_empty() {
            0.0
        } else {
            parse_demand_cell(&demand_cell).ok_or_else(|| ForecastError::InvalidValue {
                row: row_number,
                column: DEMAND_COLUMN.to_string(),
                value: demand_cell.display(),
            })?
        };

        records.push(DemandRecord { date, item, demand });
    }

    tracing::debug!(records = records.len(), "parsed demand records");
    Ok(records)
}

/// Trim a header and title-case every word.
///
/// A letter is upper-cased when it follows a non-letter (or starts the
/// string) and lower-cased otherwise.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_is_letter = false;
    for ch in raw.trim().chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

fn format_number_key(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    // 1899-12-30 absorbs the Lotus 1900 leap-year bug for serials >= 61
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

fn parse_date_cell(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Number(v) => excel_serial_to_datetime(*v).map(|dt| dt.date()),
        Cell::Text(s) => parse_date_text(s),
        Cell::Empty => None,
    }
}

/// Parse a date written as text in one of the common spreadsheet layouts.
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
    ];
    const DATE_FORMATS: [&str; 7] = [
        "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%d %b %Y", "%d %B %Y", "%d.%m.%Y",
    ];

    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // Fractional seconds and offsets from ISO exports
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // Month-only layouts: "2024-01", "Jan 2024", "January 2024"
    let padded = format!("{}-01", s);
    if let Ok(d) = NaiveDate::parse_from_str(&padded, "%Y-%m-%d") {
        return Some(d);
    }
    let prefixed = format!("1 {}", s);
    for fmt in ["%d %b %Y", "%d %B %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&prefixed, fmt) {
            return Some(d);
        }
    }
    None
}

fn parse_demand_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(v) if v.is_finite() => Some(*v),
        Cell::Text(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" item code "), "Item Code");
        assert_eq!(normalize_header("DEMAND"), "Demand");
        assert_eq!(normalize_header("date"), "Date");
        assert_eq!(normalize_header("item_code"), "Item_Code");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SpreadsheetFormat::from_file_name("History.XLSX").unwrap(),
            SpreadsheetFormat::Xlsx
        );
        assert_eq!(
            SpreadsheetFormat::from_file_name("data.csv").unwrap(),
            SpreadsheetFormat::Csv
        );
        assert!(matches!(
            SpreadsheetFormat::from_file_name("notes.pdf"),
            Err(ForecastError::UnsupportedFormat(_))
        ));
        assert!(SpreadsheetFormat::from_file_name("noextension").is_err());
    }

    #[test]
    fn test_parse_date_text_formats() {
        assert_eq!(parse_date_text("2024-01-15"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date_text("2024-01-15 10:30:00"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date_text("2024/01/15"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date_text("01/15/2024"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date_text("15-Jan-2024"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date_text("Jan 2024"), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_date_text("January 2024"), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_date_text("2024-03"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_date_text("not a date"), None);
        assert_eq!(parse_date_text(""), None);
    }

    #[test]
    fn test_excel_serial_dates() {
        // 45306 is 2024-01-15 in the 1900 date system
        let dt = excel_serial_to_datetime(45306.0).unwrap();
        assert_eq!(dt.date(), ymd(2024, 1, 15));
        assert!(excel_serial_to_datetime(-5.0).is_none());
        assert!(excel_serial_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn test_read_csv_with_messy_headers() {
        let csv = "date , ITEM CODE,demand,Notes\n\
                   2024-01-05,A1,10,x\n\
                   2024-01-20,A1,\"1,250\",\n\
                   2024-02-03,1001,7.5,\n";
        let records = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].item, "A1");
        assert_relative_eq!(records[1].demand, 1250.0);
        assert_eq!(records[2].item, "1001");
        assert_eq!(records[2].date, ymd(2024, 2, 3));
    }

    #[test]
    fn test_missing_columns_reported() {
        let csv = "Date,Qty\n2024-01-01,4\n";
        let err = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap_err();
        match err {
            ForecastError::MissingColumns { missing } => {
                assert_eq!(missing, vec!["Item Code".to_string(), "Demand".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_date_aborts() {
        let csv = "Date,Item Code,Demand\n2024-01-01,A,1\nsoon,A,2\n";
        let err = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidDateFormat(_)));
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn test_blank_demand_counts_as_zero_month() {
        let csv = "Date,Item Code,Demand\n2024-01-01,A,\n2024-02-01,A,3\n";
        let records = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, ymd(2024, 1, 1));
        assert_eq!(records[0].demand, 0.0);

        let csv = "Date,Item Code,Demand\n2024-01-01,A,many\n";
        let err = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidValue { row: 2, .. }));
    }

    #[test]
    fn test_blank_demand_month_keeps_item_forecastable() {
        let mut csv = String::from("Date,Item Code,Demand\n");
        for m in 1..=5 {
            csv.push_str(&format!("2024-{:02}-10,A,{}\n", m, 10 + m));
        }
        csv.push_str("2024-06-10,A,\n");
        let records = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap();
        let series = crate::aggregate::aggregate_monthly(&records);
        assert_eq!(series[0].len(), 6);
        assert_eq!(series[0].values[5], 0.0);
    }

    #[test]
    fn test_rows_without_date_or_item_skipped() {
        let csv = "Date,Item Code,Demand\n2024-01-05,A,10\n,A,5\n2024-02-05,,7\n";
        let records = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item, "A");
        assert_eq!(records[0].demand, 10.0);

        // unreadable date text still aborts the upload
        let csv = "Date,Item Code,Demand\nsoon,A,1\n";
        let err = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidDateFormat(_)));
    }

    #[test]
    fn test_blank_rows_ignored() {
        let csv = "Date,Item Code,Demand\n,,\n2024-01-01,A,2\n";
        let records = read_demand(csv.as_bytes(), SpreadsheetFormat::Csv).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_empty_file() {
        let err = read_demand(b"", SpreadsheetFormat::Csv).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidInput(_)));
    }

    #[test]
    fn test_garbage_workbook_rejected() {
        let err = read_demand(b"definitely not a zip", SpreadsheetFormat::Xlsx).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidInput(_)));
    }
}
