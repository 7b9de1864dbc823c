//! Server-rendered pages for the upload form.

use std::fmt::Write;

use uuid::Uuid;

use demand_fcst_core::{ForecastReport, ReportFormat, Scope, Technique};

use crate::chart::{render_svg, DEFAULT_MAX_SERIES};

pub const TITLE: &str = "Monthly Demand Forecast";
pub const IDLE_MESSAGE: &str = "Upload a monthly Excel file to begin forecasting.";
pub const SKIPPED_PREFIX: &str = "Skipped items due to insufficient data: ";

const STYLE: &str = "\
body{font-family:system-ui,sans-serif;max-width:960px;margin:2rem auto;padding:0 1rem;color:#222}\
form{display:grid;grid-template-columns:10rem 1fr;gap:.5rem 1rem;align-items:center;margin-bottom:1.5rem}\
.box{padding:.75rem 1rem;border-radius:6px;margin:1rem 0}\
.info{background:#e8f1fb}.warning{background:#fff4d6}.error{background:#fde2e1}\
table{border-collapse:collapse;width:100%;font-size:.9rem}\
th,td{border:1px solid #ddd;padding:.3rem .5rem;text-align:right}\
th:first-child,td:first-child{text-align:left}";

/// Escape text for use in HTML and SVG content or attribute values.
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{style}</style>\n</head>\n<body>\n\
         <h1>{title}</h1>\n{form}{body}</body>\n</html>\n",
        title = TITLE,
        style = STYLE,
        form = upload_form(),
        body = body,
    )
}

fn upload_form() -> String {
    let mut techniques = String::new();
    for t in Technique::all() {
        let _ = write!(
            techniques,
            "<option value=\"{}\">{}</option>",
            t.as_str(),
            escape_html(t.display_name())
        );
    }

    let mut scopes = String::new();
    for (scope, label) in [
        (Scope::PerItem, "Per item"),
        (Scope::Global, "All items (total)"),
        (Scope::Both, "Total and per item"),
    ] {
        let _ = write!(scopes, "<option value=\"{}\">{}</option>", scope.as_str(), label);
    }

    format!(
        "<form method=\"post\" action=\"/forecast\" enctype=\"multipart/form-data\">\n\
         <label for=\"file\">Demand file</label>\
         <input id=\"file\" type=\"file\" name=\"file\" accept=\".xlsx,.xls,.ods,.csv\" required>\n\
         <label for=\"technique\">Technique</label>\
         <select id=\"technique\" name=\"technique\">{}</select>\n\
         <label for=\"scope\">Scope</label>\
         <select id=\"scope\" name=\"scope\">{}</select>\n\
         <label for=\"horizon\">Horizon (months)</label>\
         <input id=\"horizon\" type=\"number\" name=\"horizon\" min=\"1\" max=\"60\" \
         placeholder=\"default\">\n\
         <span></span><button type=\"submit\">Forecast</button>\n</form>\n\
         <p>Expected columns: Date, Item Code, Demand</p>\n",
        techniques, scopes
    )
}

/// Landing page: the form and an info line.
pub fn index_page() -> String {
    page(&format!("<div class=\"box info\">{}</div>\n", IDLE_MESSAGE))
}

fn skipped_box(skipped: &[String]) -> String {
    if skipped.is_empty() {
        return String::new();
    }
    format!(
        "<div class=\"box warning\">{}{}</div>\n",
        SKIPPED_PREFIX,
        escape_html(&skipped.join(", "))
    )
}

/// Page with a single error box, plus the skipped-items warning if any.
pub fn error_page(message: &str, skipped: &[String]) -> String {
    page(&format!(
        "<div class=\"box error\">Error: {}</div>\n{}",
        escape_html(message),
        skipped_box(skipped)
    ))
}

fn forecast_table(report: &ForecastReport) -> String {
    let (header, rows) = demand_fcst_core::report::table(report);

    let mut out = String::from("<table>\n<thead><tr>");
    for name in &header {
        let _ = write!(out, "<th>{}</th>", escape_html(name));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for (label, cells) in rows {
        let _ = write!(out, "<tr><td>{}</td>", escape_html(&label));
        for cell in cells {
            match cell {
                Some(v) => {
                    let _ = write!(out, "<td>{:.2}</td>", v);
                }
                None => out.push_str("<td></td>"),
            }
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    out
}

/// Result page: download links, table, chart and skipped-items warning.
pub fn result_page(report: &ForecastReport, download_id: Uuid) -> String {
    let mut body = String::new();

    body.push_str("<p>");
    for format in [ReportFormat::Xlsx, ReportFormat::Csv] {
        let _ = write!(
            body,
            "<a href=\"/downloads/{id}?format={ext}\" download=\"{name}\">Download {upper}</a> ",
            id = download_id,
            ext = format.extension(),
            name = format.file_name(),
            upper = format.extension().to_uppercase(),
        );
    }
    body.push_str("</p>\n");

    body.push_str(&forecast_table(report));
    body.push_str(&render_svg(report, DEFAULT_MAX_SERIES));
    body.push('\n');

    let skipped: Vec<String> = report.skipped.iter().map(|s| s.item.clone()).collect();
    body.push_str(&skipped_box(&skipped));

    page(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>\"A&B\"</b>"),
            "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_index_page_has_form_and_info() {
        let html = index_page();
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.contains("name=\"file\""));
        assert!(html.contains("value=\"exponential-smoothing\""));
        assert!(html.contains(IDLE_MESSAGE));
    }

    #[test]
    fn test_error_page_escapes_and_lists_skipped() {
        let html = error_page("bad <input>", &["A".into(), "B".into()]);
        assert!(html.contains("Error: bad &lt;input&gt;"));
        assert!(html.contains("Skipped items due to insufficient data: A, B"));
        assert!(!html.contains(IDLE_MESSAGE));
    }
}
