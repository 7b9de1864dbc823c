//! HTTP routes: upload form, JSON API, downloads and health check.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use uuid::Uuid;

use demand_fcst_core::{
    read_demand, render, run_pipeline, ForecastReport, PipelineOptions, ReportFormat, Scope,
    SpreadsheetFormat, Technique,
};

use crate::config::Config;
use crate::error::ApiError;
use crate::html;
use crate::store::DownloadStore;
use crate::telemetry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub downloads: DownloadStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let downloads = DownloadStore::new(&config.downloads);
        Self {
            config: Arc::new(config),
            downloads,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .route("/", get(index))
        .route("/forecast", post(forecast_form))
        .route("/api/v1/forecast", post(forecast_api))
        .route("/downloads/{id}", get(download))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(html::index_page())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Uploaded file plus the per-request options.
#[derive(Debug)]
struct ForecastRequest {
    file_name: String,
    bytes: Vec<u8>,
    options: PipelineOptions,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn read_form(mut multipart: Multipart, defaults: PipelineOptions) -> Result<ForecastRequest, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut options = defaults;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::from_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "file" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(ApiError::from_multipart)?;
                file = Some((name, data.to_vec()));
            }
            "technique" => {
                if let Some(value) = non_empty(field.text().await.map_err(ApiError::from_multipart)?) {
                    options.forecast.technique = value.parse::<Technique>()?;
                }
            }
            "scope" => {
                if let Some(value) = non_empty(field.text().await.map_err(ApiError::from_multipart)?) {
                    options.scope = value.parse::<Scope>()?;
                }
            }
            "horizon" => {
                if let Some(value) = non_empty(field.text().await.map_err(ApiError::from_multipart)?) {
                    let horizon = value.parse::<usize>().map_err(|_| {
                        ApiError::bad_request(
                            "invalid_parameter",
                            format!("Invalid parameter 'horizon' = '{}': expected a whole number", value),
                        )
                    })?;
                    options.forecast.horizon = Some(horizon);
                }
            }
            _ => {
                tracing::debug!(field = %field_name, "ignoring unknown form field");
            }
        }
    }

    let (file_name, bytes) = file
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing_file", "No file was uploaded"))?;

    Ok(ForecastRequest {
        file_name,
        bytes,
        options,
    })
}

/// Parse the upload and run the pipeline on a blocking worker.
async fn run_request(request: ForecastRequest) -> Result<ForecastReport, ApiError> {
    let format = SpreadsheetFormat::from_file_name(&request.file_name)?;
    tracing::info!(
        file = %request.file_name,
        bytes = request.bytes.len(),
        ?format,
        "forecast requested"
    );

    let report = tokio::task::spawn_blocking(move || {
        let records = read_demand(&request.bytes, format)?;
        run_pipeline(&records, &request.options)
    })
    .await??;

    telemetry::capture_forecast_generated(&report);
    Ok(report)
}

async fn forecast_form(State(state): State<AppState>, multipart: Multipart) -> Response {
    let defaults = state.config.forecast.pipeline_options();
    let result: Result<ForecastReport, ApiError> = async {
        let request = read_form(multipart, defaults).await?;
        run_request(request).await
    }
    .await;

    match result {
        Ok(report) => {
            let report = Arc::new(report);
            let id = state.downloads.insert(Arc::clone(&report));
            Html(html::result_page(&report, id)).into_response()
        }
        Err(err) => err.into_html(),
    }
}

#[derive(Debug, Serialize)]
struct ForecastResponse {
    download_id: Uuid,
    #[serde(flatten)]
    report: Arc<ForecastReport>,
}

async fn forecast_api(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ForecastResponse>, ApiError> {
    let defaults = state.config.forecast.pipeline_options();
    let request = read_form(multipart, defaults).await?;
    let report = Arc::new(run_request(request).await?);
    let download_id = state.downloads.insert(Arc::clone(&report));

    Ok(Json(ForecastResponse {
        download_id,
        report,
    }))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    format: Option<String>,
}

/// Report file sent as an attachment.
pub struct FileResponse {
    pub data: Vec<u8>,
    pub format: ReportFormat,
}

impl IntoResponse for FileResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.format.content_type().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", self.format.file_name()),
                ),
            ],
            Body::from(self.data),
        )
            .into_response()
    }
}

async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<FileResponse, ApiError> {
    let format = match query.format.as_deref() {
        Some(f) => f.parse::<ReportFormat>()?,
        None => ReportFormat::default(),
    };

    let report = Uuid::parse_str(&id)
        .ok()
        .and_then(|id| state.downloads.get(&id))
        .ok_or_else(|| ApiError::not_found("Download not found or expired"))?;

    let data = render(&report, format)?;
    Ok(FileResponse { data, format })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  ".into()), None);
        assert_eq!(non_empty(" hw ".into()), Some("hw".to_string()));
    }

    #[test]
    fn test_file_response_headers() {
        let response = FileResponse {
            data: b"Item Name\n".to_vec(),
            format: ReportFormat::Csv,
        }
        .into_response();
        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/csv; charset=utf-8"
        );
        assert!(headers
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("ml_item_forecast.csv"));
    }
}
