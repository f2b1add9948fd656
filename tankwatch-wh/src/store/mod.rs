//! Persistence collaborator for the inventory engine
//!
//! The engine needs exactly four things from storage: the branch documents
//! with their embedded tanks, the oil-type catalogue, the most recent
//! update-log entries, and an atomic single-tank level write that appends
//! one log entry. Backends implement [`InventoryStore`]; the engine never
//! touches SQL or locks directly.

use async_trait::async_trait;
use tankwatch_common::db::{BranchRecord, OilType, UpdateAttribution, UpdateLogEntry};
use thiserror::Error;

use crate::inventory::TankId;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The write was refused because it would break a tank invariant
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// All branches, each with its raw embedded tank list
    async fn fetch_branches(&self) -> StoreResult<Vec<BranchRecord>>;

    async fn fetch_oil_types(&self) -> StoreResult<Vec<OilType>>;

    /// Up to `limit` update-log entries, newest first
    async fn fetch_recent_update_logs(&self, limit: usize) -> StoreResult<Vec<UpdateLogEntry>>;

    /// Atomically replace one tank's level and append its update-log entry
    ///
    /// Reads the owning branch document, locates the tank by key, writes the
    /// document back, and records the change. Either both the level and the
    /// log entry are persisted or neither is.
    async fn write_tank_level(
        &self,
        tank_id: &TankId,
        new_level: f64,
        attribution: &UpdateAttribution,
    ) -> StoreResult<UpdateLogEntry>;

    async fn health_check(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Refuse levels that no tank may hold
///
/// The bulk coordinator validates before writing; this guards the single
/// tank write path for every other caller.
pub(crate) fn check_level(tank_id: &TankId, new_level: f64, capacity: Option<f64>) -> StoreResult<()> {
    if !new_level.is_finite() || new_level < 0.0 {
        return Err(StoreError::Rejected(format!(
            "tank {}: level {} must be a non-negative number",
            tank_id, new_level
        )));
    }
    if let Some(capacity) = capacity {
        if new_level > capacity {
            return Err(StoreError::Rejected(format!(
                "tank {}: level {} exceeds capacity {}",
                tank_id, new_level, capacity
            )));
        }
    }
    Ok(())
}
