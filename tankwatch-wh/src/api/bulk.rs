//! Bulk update endpoints

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tankwatch_common::db::UpdateAttribution;
use tracing::info;

use super::{ApiError, Caller};
use crate::inventory::{BulkUpdateBatch, CommitReport, Tank, Violation};
use crate::AppState;

/// Request body for validate and commit
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    /// Tank id (`<branch_id>:<key>`) to proposed level
    pub changes: BulkUpdateBatch,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub report: CommitReport,
    /// Tank view read back after the commit, `null` if the re-read failed
    pub tanks: Option<Vec<Tank>>,
}

/// POST /api/bulk/validate
pub async fn validate_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let violations = state.service.validate(&request.changes).await?;
    Ok(Json(ValidateResponse {
        valid: violations.is_empty(),
        violations,
    }))
}

/// POST /api/bulk/commit
///
/// 422 with the violation list when the batch is invalid (nothing written),
/// 409 while another commit is running. A 200 may still carry failed
/// branches; check `report.outcome`.
pub async fn commit_bulk(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    info!(
        "Bulk commit requested by {} ({}): {} change(s)",
        caller.actor,
        caller.role,
        request.changes.len()
    );

    let attribution = UpdateAttribution {
        actor: caller.actor,
        notes: request.notes,
        photo_refs: request.photo_refs,
    };
    let (report, tanks) = state.service.commit(&request.changes, &attribution).await?;

    Ok(Json(CommitResponse { report, tanks }))
}
