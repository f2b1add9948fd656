//! tankwatch-wh library - warehouse inventory service
//!
//! Tank status, data freshness and bulk level updates for branch oil tanks,
//! served over HTTP to admin and warehouse staff.

use axum::Router;
use std::sync::Arc;

pub mod api;
pub mod inventory;
pub mod service;
pub mod store;

use service::InventoryService;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InventoryService>,
    /// Enforce role headers; when false every caller acts as admin
    pub role_gating: bool,
}

impl AppState {
    /// Create new application state
    pub fn new(service: Arc<InventoryService>, role_gating: bool) -> Self {
        Self {
            service,
            role_gating,
        }
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` requires an inventory role.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    // Protected routes (require admin or warehouse role)
    let protected = Router::new()
        .route("/api/tanks", get(api::list_tanks))
        .route("/api/rollup", get(api::get_rollup))
        .route("/api/bulk/validate", post(api::validate_bulk))
        .route("/api/bulk/commit", post(api::commit_bulk))
        .route("/api/csv/export", get(api::export_csv))
        .route("/api/csv/import", post(api::import_csv))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::role_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
