//! Read-only inventory views

use axum::{extract::State, Json};
use tankwatch_common::time;

use super::ApiError;
use crate::inventory::{BranchRollup, Tank};
use crate::AppState;

/// GET /api/tanks
pub async fn list_tanks(State(state): State<AppState>) -> Result<Json<Vec<Tank>>, ApiError> {
    Ok(Json(state.service.tank_view().await?))
}

/// GET /api/rollup
///
/// One entry per branch, including branches without tanks.
pub async fn get_rollup(
    State(state): State<AppState>,
) -> Result<Json<Vec<BranchRollup>>, ApiError> {
    Ok(Json(state.service.branch_rollup(time::now()).await?))
}
