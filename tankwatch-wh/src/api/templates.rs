//! CSV template download and upload

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Local;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::inventory::{BulkUpdateBatch, TemplateKind, Violation};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// `bulk` (default) or `stock`
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "bulk".to_string()
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub batch: BulkUpdateBatch,
    /// Empty when the batch can be committed as is
    pub violations: Vec<Violation>,
}

/// GET /api/csv/export?kind=bulk|stock
pub async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let kind: TemplateKind = query.kind.parse().map_err(ApiError::BadRequest)?;
    let today = Local::now().date_naive();
    let body = state.service.export_template(kind, today).await?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", kind.file_name(today)),
        ),
    ];
    Ok((headers, body).into_response())
}

/// POST /api/csv/import
///
/// Body is the CSV text. Parses into a batch without writing anything.
pub async fn import_csv(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ImportResponse>, ApiError> {
    let (batch, violations) = state.service.import_template(&body).await?;
    Ok(Json(ImportResponse { batch, violations }))
}
