//! HTTP API handlers for tankwatch-wh

pub mod auth;
pub mod bulk;
pub mod error;
pub mod health;
pub mod tanks;
pub mod templates;

pub use auth::{role_middleware, Caller};
pub use bulk::{commit_bulk, validate_bulk};
pub use error::ApiError;
pub use health::health_routes;
pub use tanks::{get_rollup, list_tanks};
pub use templates::{export_csv, import_csv};
