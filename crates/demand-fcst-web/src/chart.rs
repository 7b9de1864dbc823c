//! Inline SVG line chart of history and forecast per row.

use std::collections::BTreeSet;
use std::fmt::Write;

use chrono::NaiveDate;

use demand_fcst_core::{month_label, ForecastReport, ForecastRow, RowKind};

use crate::html::escape_html;

pub const DEFAULT_MAX_SERIES: usize = 10;

const WIDTH: f64 = 760.0;
const HEIGHT: f64 = 380.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 170.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 40.0;

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Rows to draw: the total first, then items in report order.
fn chart_rows(report: &ForecastReport, max_series: usize) -> Vec<&ForecastRow> {
    let totals = report.rows.iter().filter(|r| r.kind == RowKind::Total);
    let items = report.rows.iter().filter(|r| r.kind == RowKind::Item);
    totals.chain(items).take(max_series).collect()
}

fn points(
    months: &[NaiveDate],
    values: &[f64],
    x_of: &dyn Fn(NaiveDate) -> f64,
    y_of: &dyn Fn(f64) -> f64,
) -> String {
    let mut out = String::new();
    for (m, v) in months.iter().zip(values.iter()) {
        let _ = write!(out, "{:.1},{:.1} ", x_of(*m), y_of(*v));
    }
    out.trim_end().to_string()
}

/// Render `report` as a standalone `<svg>` element.
pub fn render_svg(report: &ForecastReport, max_series: usize) -> String {
    let rows = chart_rows(report, max_series);

    let axis: Vec<NaiveDate> = rows
        .iter()
        .flat_map(|r| r.history_months.iter().chain(r.months.iter()).copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let y_max = rows
        .iter()
        .flat_map(|r| r.history_values.iter().chain(r.point.iter()))
        .fold(0.0_f64, |acc, v| acc.max(*v));
    let y_max = if y_max > 0.0 { y_max } else { 1.0 };

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let step = if axis.len() > 1 {
        plot_w / (axis.len() - 1) as f64
    } else {
        0.0
    };
    let x_of = |m: NaiveDate| -> f64 {
        let idx = axis.iter().position(|a| *a == m).unwrap_or(0);
        MARGIN_LEFT + idx as f64 * step
    };
    let y_of = |v: f64| -> f64 { MARGIN_TOP + plot_h * (1.0 - v.max(0.0) / y_max) };

    let mut svg = String::new();
    let _ = write!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {w} {h}\" width=\"{w}\" \
         height=\"{h}\" role=\"img\" aria-label=\"Demand forecast chart\">",
        w = WIDTH,
        h = HEIGHT
    );

    // axes
    let x0 = MARGIN_LEFT;
    let x1 = MARGIN_LEFT + plot_w;
    let y0 = MARGIN_TOP + plot_h;
    let _ = write!(
        svg,
        "<line x1=\"{x0}\" y1=\"{y0}\" x2=\"{x1}\" y2=\"{y0}\" stroke=\"#444\"/>\
         <line x1=\"{x0}\" y1=\"{top}\" x2=\"{x0}\" y2=\"{y0}\" stroke=\"#444\"/>",
        top = MARGIN_TOP
    );
    for frac in [0.0, 0.5, 1.0] {
        let v = y_max * frac;
        let _ = write!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\" text-anchor=\"end\">{:.0}</text>",
            x0 - 6.0,
            y_of(v) + 4.0,
            v
        );
    }
    if let (Some(first), Some(last)) = (axis.first(), axis.last()) {
        let _ = write!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\">{}</text>\
             <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"11\" text-anchor=\"end\">{}</text>",
            x0,
            y0 + 18.0,
            month_label(*first),
            x1,
            y0 + 18.0,
            month_label(*last)
        );
    }

    for (i, row) in rows.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let _ = write!(
            svg,
            "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"2\" points=\"{}\"/>",
            color,
            points(&row.history_months, &row.history_values, &x_of, &y_of)
        );

        // forecast continues from the last observed point
        let mut f_months: Vec<NaiveDate> = row.history_months.last().copied().into_iter().collect();
        let mut f_values: Vec<f64> = row.history_values.last().copied().into_iter().collect();
        f_months.extend(row.months.iter().copied());
        f_values.extend(row.point.iter().copied());
        let _ = write!(
            svg,
            "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"2\" stroke-dasharray=\"6 4\" \
             points=\"{}\"/>",
            color,
            points(&f_months, &f_values, &x_of, &y_of)
        );

        let ly = MARGIN_TOP + 14.0 + i as f64 * 18.0;
        let lx = x1 + 14.0;
        let _ = write!(
            svg,
            "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"3\"/>\
             <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\">{}</text>",
            lx,
            ly - 4.0,
            lx + 18.0,
            ly - 4.0,
            color,
            lx + 24.0,
            ly,
            escape_html(&row.label)
        );
    }

    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use demand_fcst_core::{Scope, Technique};

    fn ym(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn row(label: &str, kind: RowKind) -> ForecastRow {
        ForecastRow {
            label: label.into(),
            kind,
            model_name: "GBT".into(),
            history_months: vec![ym(2024, 1), ym(2024, 2)],
            history_values: vec![10.0, 20.0],
            months: vec![ym(2024, 3)],
            point: vec![30.0],
            lower: vec![25.0],
            upper: vec![35.0],
            mse: None,
        }
    }

    fn report(rows: Vec<ForecastRow>) -> ForecastReport {
        ForecastReport {
            technique: Technique::LagBoosting,
            scope: Scope::Both,
            horizon: 1,
            rows,
            skipped: vec![],
        }
    }

    #[test]
    fn test_svg_structure() {
        let svg = render_svg(&report(vec![row("A<1>", RowKind::Item)]), 10);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("A&lt;1&gt;"));
        assert!(svg.contains("January 2024"));
        assert!(svg.contains("March 2024"));
    }

    #[test]
    fn test_total_first_and_series_cap() {
        let rows = vec![
            row("B", RowKind::Item),
            row("C", RowKind::Item),
            row("All Items", RowKind::Total),
        ];
        let r = report(rows);
        let drawn = chart_rows(&r, 2);
        let labels: Vec<&str> = drawn.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["All Items", "B"]);

        let svg = render_svg(&r, 2);
        assert_eq!(svg.matches("<polyline").count(), 4);
        assert!(!svg.contains(">C<"));
    }

    #[test]
    fn test_empty_report_renders_axes() {
        let svg = render_svg(&report(vec![]), 10);
        assert!(svg.contains("<line"));
        assert_eq!(svg.matches("<polyline").count(), 0);
    }
}
