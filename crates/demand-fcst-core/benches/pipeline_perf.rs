//! Performance benchmark for the forecast pipeline on many items.
//!
//! Run with: cargo bench --bench pipeline_perf

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use demand_fcst_core::{
    forecast_series, render, run_pipeline, DemandRecord, ForecastOptions, PipelineOptions,
    ReportFormat, Scope, Technique,
};

fn generate_monthly_series(n: usize, seed: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let trend = 0.5 * i as f64;
            let seasonal = 15.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin();
            100.0 + trend + seasonal + ((i * 7 + seed) % 11) as f64 // small noise
        })
        .collect()
}

fn generate_records(n_items: usize, n_months: usize) -> Vec<DemandRecord> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 10).unwrap_or_default();
    (0..n_items)
        .flat_map(|item| {
            generate_monthly_series(n_months, item)
                .into_iter()
                .enumerate()
                .map(move |(i, demand)| DemandRecord {
                    date: start
                        .checked_add_months(chrono::Months::new(i as u32))
                        .unwrap_or(start),
                    item: format!("SKU-{:05}", item),
                    demand,
                })
        })
        .collect()
}

fn benchmark_fn<F, R>(name: &str, iterations: usize, mut f: F) -> Duration
where
    F: FnMut() -> R,
{
    // Warmup
    let _ = f();

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = std::hint::black_box(f());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "{}: total={:?}, per_iter={:?}, iters={}",
        name, elapsed, per_iter, iterations
    );
    elapsed
}

fn main() {
    println!("=== Demand Pipeline Performance Benchmark ===\n");

    println!("--- 1. Single Series ---\n");

    for &n in &[12, 36, 120] {
        let values = generate_monthly_series(n, 0);
        for technique in Technique::all() {
            let options = ForecastOptions::for_technique(*technique);
            benchmark_fn(&format!("forecast_series({}, n={})", technique, n), 50, || {
                forecast_series(&values, &options)
            });
        }
        println!();
    }

    println!("--- 2. Full Pipeline (many items) ---\n");

    for &n_items in &[10, 100, 1000] {
        let records = generate_records(n_items, 36);
        for technique in Technique::all() {
            let mut options = PipelineOptions {
                scope: Scope::Both,
                ..Default::default()
            };
            options.forecast.technique = *technique;

            benchmark_fn(
                &format!("run_pipeline({}, items={})", technique, n_items),
                1,
                || run_pipeline(&records, &options),
            );
        }
        println!();
    }

    println!("--- 3. Report Export ---\n");

    let records = generate_records(1000, 36);
    if let Ok(report) = run_pipeline(&records, &PipelineOptions::default()) {
        for format in [ReportFormat::Xlsx, ReportFormat::Csv] {
            benchmark_fn(&format!("render({}, rows=1000)", format), 5, || {
                render(&report, format)
            });
        }
    }
}
