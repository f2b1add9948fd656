//! Role gating for the inventory API
//!
//! The caller's role arrives in `x-tankwatch-role` (set by the upstream
//! session layer). Admin and warehouse staff may read and change stock;
//! drivers may not. The optional `x-tankwatch-actor` header names the person
//! for update-log attribution.
//!
//! When gating is disabled in configuration every request acts as admin.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tankwatch_common::Role;
use tracing::warn;

use crate::AppState;

pub const ROLE_HEADER: &str = "x-tankwatch-role";
pub const ACTOR_HEADER: &str = "x-tankwatch-actor";

/// Who is making the request, inserted as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub role: Role,
    pub actor: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn resolve_caller(headers: &HeaderMap, role_gating: bool) -> Result<Caller, AuthError> {
    let role = if role_gating {
        let raw = header_str(headers, ROLE_HEADER).ok_or(AuthError::MissingRole)?;
        let role: Role = raw
            .parse()
            .map_err(|_| AuthError::UnknownRole(raw.to_string()))?;
        if !role.can_manage_inventory() {
            return Err(AuthError::Forbidden(role));
        }
        role
    } else {
        Role::Admin
    };

    let actor = header_str(headers, ACTOR_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| role.to_string());

    Ok(Caller { role, actor })
}

/// Reject callers who may not manage inventory
pub async fn role_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let caller = resolve_caller(request.headers(), state.role_gating).map_err(|e| {
        warn!("Rejected {} {}: {:?}", request.method(), request.uri().path(), e);
        e
    })?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

#[derive(Debug)]
pub enum AuthError {
    MissingRole,
    UnknownRole(String),
    Forbidden(Role),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingRole => (
                StatusCode::UNAUTHORIZED,
                format!("Missing {} header", ROLE_HEADER),
            ),
            AuthError::UnknownRole(raw) => {
                (StatusCode::UNAUTHORIZED, format!("Unknown role '{}'", raw))
            }
            AuthError::Forbidden(role) => (
                StatusCode::FORBIDDEN,
                format!("Role '{}' may not manage inventory", role),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
