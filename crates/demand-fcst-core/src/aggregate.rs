//! Monthly bucketing and per-item grouping.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::dataset::DemandRecord;
use crate::error::{ForecastError, Result};
use crate::imputation::{fill_gaps_with, interpolate_gaps};

/// How months without any record are treated inside a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMonths {
    /// Keep only months that were observed.
    #[default]
    Skip,
    /// Insert absent months with zero demand.
    Zero,
    /// Insert absent months and interpolate linearly between neighbours.
    Interpolate,
}

impl std::str::FromStr for MissingMonths {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "none" => Ok(MissingMonths::Skip),
            "zero" | "zeros" => Ok(MissingMonths::Zero),
            "interpolate" | "linear" => Ok(MissingMonths::Interpolate),
            _ => Err(ForecastError::InvalidParameter {
                param: "missing_months".into(),
                value: s.into(),
                reason: "expected one of: skip, zero, interpolate".into(),
            }),
        }
    }
}

/// Demand of one item (or of the total) per calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySeries {
    pub key: String,
    /// First day of each month, strictly increasing.
    pub months: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl MonthlySeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_month(&self) -> Option<NaiveDate> {
        self.months.last().copied()
    }

    /// The `horizon` months following the last observed month.
    pub fn future_months(&self, horizon: usize) -> Vec<NaiveDate> {
        match self.last_month() {
            Some(last) => (1..=horizon).map(|h| add_months(last, h as u32)).collect(),
            None => vec![],
        }
    }

    /// Re-index the series onto a contiguous monthly calendar.
    pub fn with_missing_months(self, mode: MissingMonths) -> MonthlySeries {
        if mode == MissingMonths::Skip || self.len() < 2 {
            return self;
        }

        let (first, last) = match (self.months.first(), self.months.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return self,
        };

        let observed: BTreeMap<NaiveDate, f64> = self
            .months
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect();

        let mut months = Vec::new();
        let mut current = first;
        while current <= last {
            months.push(current);
            current = add_months(current, 1);
        }
        let sparse: Vec<Option<f64>> = months.iter().map(|m| observed.get(m).copied()).collect();

        let values = if mode == MissingMonths::Zero {
            fill_gaps_with(&sparse, 0.0)
        } else {
            interpolate_gaps(&sparse)
        };

        MonthlySeries {
            key: self.key,
            months,
            values,
        }
    }
}

/// Get the first day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Shift a month start forward by `n` months.
pub fn add_months(month: NaiveDate, n: u32) -> NaiveDate {
    month.checked_add_months(Months::new(n)).unwrap_or(month)
}

/// Sum demand per (month, item).
///
/// Series come back ordered by their first observed month, ties broken by
/// item key, which matches the order items first appear in a month-sorted
/// table. Keys compare numerically when every item code is a number.
pub fn aggregate_monthly(records: &[DemandRecord]) -> Vec<MonthlySeries> {
    let mut grouped: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for record in records {
        *grouped
            .entry(record.item.as_str())
            .or_default()
            .entry(month_start(record.date))
            .or_insert(0.0) += record.demand;
    }

    let mut series: Vec<MonthlySeries> = grouped
        .into_iter()
        .map(|(key, by_month)| {
            let (months, values) = by_month.into_iter().unzip();
            MonthlySeries {
                key: key.to_string(),
                months,
                values,
            }
        })
        .collect();

    // Numeric item codes compare as numbers, the way a sorted groupby orders them
    let numeric: Option<Vec<f64>> = series.iter().map(|s| s.key.parse::<f64>().ok()).collect();
    match numeric {
        Some(codes) if codes.iter().all(|c| c.is_finite()) => {
            let mut keyed: Vec<(f64, MonthlySeries)> = codes.into_iter().zip(series).collect();
            keyed.sort_by(|(ca, a), (cb, b)| {
                a.months
                    .first()
                    .cmp(&b.months.first())
                    .then(ca.total_cmp(cb))
            });
            keyed.into_iter().map(|(_, s)| s).collect()
        }
        _ => {
            series.sort_by(|a, b| a.months.first().cmp(&b.months.first()));
            series
        }
    }
}

/// Sum demand of all items per month.
pub fn total_series(records: &[DemandRecord], label: &str) -> Result<MonthlySeries> {
    if records.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }

    let mut by_month: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        *by_month.entry(month_start(record.date)).or_insert(0.0) += record.demand;
    }
    let (months, values) = by_month.into_iter().unzip();

    Ok(MonthlySeries {
        key: label.to_string(),
        months,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rec(date: NaiveDate, item: &str, demand: f64) -> DemandRecord {
        DemandRecord {
            date,
            item: item.to_string(),
            demand,
        }
    }

    #[test]
    fn test_month_start_and_add_months() {
        assert_eq!(month_start(ymd(2024, 2, 29)), ymd(2024, 2, 1));
        assert_eq!(add_months(ymd(2024, 11, 1), 3), ymd(2025, 2, 1));
    }

    #[test]
    fn test_aggregate_monthly_sums_and_orders() {
        let records = vec![
            rec(ymd(2024, 2, 3), "B", 1.0),
            rec(ymd(2024, 1, 5), "C", 2.0),
            rec(ymd(2024, 1, 20), "C", 3.0),
            rec(ymd(2024, 1, 9), "A", 4.0),
            rec(ymd(2024, 3, 1), "A", 5.0),
        ];
        let series = aggregate_monthly(&records);
        let keys: Vec<&str> = series.iter().map(|s| s.key.as_str()).collect();
        // A and C start in January (alphabetical), B starts in February
        assert_eq!(keys, vec!["A", "C", "B"]);

        let c = &series[1];
        assert_eq!(c.months, vec![ymd(2024, 1, 1)]);
        assert_relative_eq!(c.values[0], 5.0);

        let a = &series[0];
        assert_eq!(a.months, vec![ymd(2024, 1, 1), ymd(2024, 3, 1)]);
    }

    #[test]
    fn test_numeric_item_codes_order_numerically() {
        let records = vec![
            rec(ymd(2024, 1, 2), "1001", 1.0),
            rec(ymd(2024, 1, 3), "999", 1.0),
            rec(ymd(2023, 12, 1), "5000", 1.0),
            rec(ymd(2024, 1, 4), "20", 1.0),
        ];
        let keys: Vec<String> = aggregate_monthly(&records).into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["5000", "20", "999", "1001"]);

        // one text code falls back to string order
        let records = vec![
            rec(ymd(2024, 1, 2), "1001", 1.0),
            rec(ymd(2024, 1, 3), "999", 1.0),
            rec(ymd(2024, 1, 4), "X1", 1.0),
        ];
        let keys: Vec<String> = aggregate_monthly(&records).into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["1001", "999", "X1"]);
    }

    #[test]
    fn test_total_series() {
        let records = vec![
            rec(ymd(2024, 1, 5), "A", 2.0),
            rec(ymd(2024, 1, 6), "B", 3.0),
            rec(ymd(2024, 2, 1), "A", 1.0),
        ];
        let total = total_series(&records, "All Items").unwrap();
        assert_eq!(total.key, "All Items");
        assert_eq!(total.values, vec![5.0, 1.0]);
        assert!(total_series(&[], "x").is_err());
    }

    #[test]
    fn test_future_months() {
        let series = MonthlySeries {
            key: "A".into(),
            months: vec![ymd(2024, 11, 1), ymd(2024, 12, 1)],
            values: vec![1.0, 2.0],
        };
        assert_eq!(
            series.future_months(2),
            vec![ymd(2025, 1, 1), ymd(2025, 2, 1)]
        );
    }

    #[test]
    fn test_missing_months_fill() {
        let series = MonthlySeries {
            key: "A".into(),
            months: vec![ymd(2024, 1, 1), ymd(2024, 4, 1)],
            values: vec![3.0, 9.0],
        };

        let skipped = series.clone().with_missing_months(MissingMonths::Skip);
        assert_eq!(skipped.len(), 2);

        let zero = series.clone().with_missing_months(MissingMonths::Zero);
        assert_eq!(zero.values, vec![3.0, 0.0, 0.0, 9.0]);
        assert_eq!(zero.months[1], ymd(2024, 2, 1));

        let interp = series.with_missing_months(MissingMonths::Interpolate);
        assert_eq!(interp.values, vec![3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_missing_months_from_str() {
        assert_eq!("Zero".parse::<MissingMonths>().unwrap(), MissingMonths::Zero);
        assert!("fancy".parse::<MissingMonths>().is_err());
    }
}
