//! PostHog telemetry integration for anonymous usage tracking.
//!
//! Telemetry is opt-out. It can be disabled via:
//! - Environment variable: DEMAND_FCST_DISABLE_TELEMETRY=1
//! - Config: `[telemetry] enabled = false`
//!
//! Nothing is sent without an API key, and telemetry is automatically
//! disabled in CI environments (detected via common CI environment variables
//! like CI, GITHUB_ACTIONS, GITLAB_CI, etc.). Events never carry item names
//! or demand values.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

#[cfg(feature = "telemetry")]
use std::thread;

use demand_fcst_core::ForecastReport;

use crate::config::TelemetryConfig;

pub const DISABLE_ENV_VAR: &str = "DEMAND_FCST_DISABLE_TELEMETRY";

/// Global telemetry enabled flag
static TELEMETRY_ENABLED: AtomicBool = AtomicBool::new(false);

/// PostHog API key
static TELEMETRY_KEY: OnceLock<String> = OnceLock::new();

/// Anonymous distinct ID (generated once per process)
static DISTINCT_ID: OnceLock<String> = OnceLock::new();

const CI_ENV_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
    "CODEBUILD_BUILD_ID",
];

/// Detects if the code is running in a CI environment.
pub fn is_ci_environment() -> bool {
    CI_ENV_VARS.iter().any(|var| env::var(var).is_ok())
}

/// Decide whether events may be sent, given the environment.
fn resolve_enabled(config: &TelemetryConfig, opted_out: bool, in_ci: bool) -> bool {
    let has_key = config.api_key.as_deref().is_some_and(|k| !k.is_empty());
    config.enabled && has_key && !opted_out && !in_ci
}

/// Initialize telemetry from configuration.
pub fn init_telemetry(config: &TelemetryConfig) {
    let enabled = resolve_enabled(
        config,
        env::var(DISABLE_ENV_VAR).is_ok(),
        is_ci_environment(),
    );
    TELEMETRY_ENABLED.store(enabled, Ordering::SeqCst);
    if !enabled {
        tracing::debug!("telemetry disabled");
        return;
    }

    if let Some(key) = &config.api_key {
        let _ = TELEMETRY_KEY.set(key.clone());
    }
    let _ = DISTINCT_ID.set(uuid::Uuid::new_v4().to_string());
    tracing::info!(
        "anonymous usage telemetry enabled (set {}=1 to opt out)",
        DISABLE_ENV_VAR
    );
}

/// Check if telemetry is enabled.
pub fn is_enabled() -> bool {
    TELEMETRY_ENABLED.load(Ordering::SeqCst)
}

/// Capture a telemetry event.
///
/// Events are sent from a background thread to avoid blocking the caller.
#[cfg(feature = "telemetry")]
pub fn capture_event(event: &str, properties: serde_json::Value) {
    if !is_enabled() {
        return;
    }

    let api_key = match TELEMETRY_KEY.get() {
        Some(key) if !key.is_empty() => key.clone(),
        _ => return,
    };
    let distinct_id = DISTINCT_ID.get().cloned().unwrap_or_default();
    let payload = build_payload(&api_key, event, &distinct_id, properties);

    thread::spawn(move || {
        let _ = ureq::post("https://app.posthog.com/capture")
            .set("Content-Type", "application/json")
            .send_json(payload);
    });
}

/// No-op capture when the telemetry feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn capture_event(_event: &str, _properties: serde_json::Value) {}

fn build_payload(
    api_key: &str,
    event: &str,
    distinct_id: &str,
    properties: serde_json::Value,
) -> serde_json::Value {
    let mut props = serde_json::Map::new();
    props.insert("$lib".into(), "demand-fcst".into());
    props.insert("$lib_version".into(), env!("CARGO_PKG_VERSION").into());
    if let serde_json::Value::Object(extra) = properties {
        props.extend(extra);
    }

    serde_json::json!({
        "api_key": api_key,
        "event": event,
        "properties": props,
        "distinct_id": distinct_id,
    })
}

/// Capture service start.
pub fn capture_service_started() {
    capture_event(
        "service_started",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }),
    );
}

fn forecast_properties(report: &ForecastReport) -> serde_json::Value {
    serde_json::json!({
        "technique": report.technique.as_str(),
        "scope": report.scope.as_str(),
        "horizon": report.horizon,
        "rows": report.rows.len(),
        "skipped": report.skipped.len(),
    })
}

/// Capture a completed forecast. Only counts and options are sent.
pub fn capture_forecast_generated(report: &ForecastReport) {
    capture_event("forecast_generated", forecast_properties(report));
}
