//! In-memory implementation of the inventory store.
//!
//! Holds branches, oil types and the update log in `Vec`s guarded by
//! `tokio::sync::RwLock`. Not durable: all state is lost on restart. Used
//! for local development, demos (`--store memory`) and tests.
//!
//! Write faults can be injected per branch so callers can exercise
//! partial-failure handling without a real backend outage.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tankwatch_common::db::{BranchRecord, OilType, UpdateAttribution, UpdateLogEntry};
use tankwatch_common::time;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{check_level, InventoryStore, StoreError, StoreResult};
use crate::inventory::extract::{resolve_oil_type_name, set_embedded_level};
use crate::inventory::TankId;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    branches: Arc<RwLock<Vec<BranchRecord>>>,
    oil_types: Arc<RwLock<Vec<OilType>>>,
    /// Append-only, oldest first
    logs: Arc<RwLock<Vec<UpdateLogEntry>>>,
    /// Branch ids whose writes fail with `StoreError::Unavailable`
    write_faults: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(branches: Vec<BranchRecord>, oil_types: Vec<OilType>) -> Self {
        Self {
            branches: Arc::new(RwLock::new(branches)),
            oil_types: Arc::new(RwLock::new(oil_types)),
            ..Self::default()
        }
    }

    /// Insert a branch, replacing any branch with the same id
    pub async fn upsert_branch(&self, branch: BranchRecord) {
        let mut branches = self.branches.write().await;
        match branches.iter_mut().find(|b| b.id == branch.id) {
            Some(existing) => *existing = branch,
            None => branches.push(branch),
        }
    }

    pub async fn upsert_oil_type(&self, oil_type: OilType) {
        let mut oil_types = self.oil_types.write().await;
        match oil_types.iter_mut().find(|t| t.id == oil_type.id) {
            Some(existing) => *existing = oil_type,
            None => oil_types.push(oil_type),
        }
    }

    /// Append a historical log entry without touching any tank
    pub async fn append_log(&self, entry: UpdateLogEntry) {
        self.logs.write().await.push(entry);
    }

    pub async fn branch(&self, branch_id: &str) -> Option<BranchRecord> {
        self.branches
            .read()
            .await
            .iter()
            .find(|b| b.id == branch_id)
            .cloned()
    }

    pub async fn log_count(&self) -> usize {
        self.logs.read().await.len()
    }

    /// Make every subsequent write to `branch_id` fail
    pub async fn inject_write_fault(&self, branch_id: impl Into<String>) {
        self.write_faults.write().await.insert(branch_id.into());
    }

    pub async fn clear_write_faults(&self) {
        self.write_faults.write().await.clear();
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn fetch_branches(&self) -> StoreResult<Vec<BranchRecord>> {
        Ok(self.branches.read().await.clone())
    }

    async fn fetch_oil_types(&self) -> StoreResult<Vec<OilType>> {
        Ok(self.oil_types.read().await.clone())
    }

    async fn fetch_recent_update_logs(&self, limit: usize) -> StoreResult<Vec<UpdateLogEntry>> {
        let mut logs = self.logs.read().await.clone();
        logs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        logs.truncate(limit);
        Ok(logs)
    }

    async fn write_tank_level(
        &self,
        tank_id: &TankId,
        new_level: f64,
        attribution: &UpdateAttribution,
    ) -> StoreResult<UpdateLogEntry> {
        if self.write_faults.read().await.contains(&tank_id.branch_id) {
            return Err(StoreError::Unavailable(format!(
                "writes to branch {} are failing",
                tank_id.branch_id
            )));
        }

        let oil_types = self.oil_types.read().await.clone();
        // Lock order: branches, then logs
        let mut branches = self.branches.write().await;
        let mut logs = self.logs.write().await;

        let branch = branches
            .iter_mut()
            .find(|b| b.id == tank_id.branch_id)
            .ok_or_else(|| StoreError::NotFound(format!("branch {}", tank_id.branch_id)))?;

        let now = time::now();
        let mut document = branch
            .oil_tanks
            .clone()
            .ok_or_else(|| StoreError::NotFound(format!("tank {}", tank_id)))?;
        let snapshot = set_embedded_level(&mut document, &tank_id.key, new_level, now)
            .ok_or_else(|| StoreError::NotFound(format!("tank {}", tank_id)))?;
        check_level(tank_id, new_level, snapshot.capacity)?;

        branch.oil_tanks = Some(document);

        let entry = UpdateLogEntry {
            id: Uuid::new_v4(),
            branch_id: branch.id.clone(),
            branch_name: branch.name.clone(),
            oil_type_name: resolve_oil_type_name(
                snapshot.oil_type_id.as_deref(),
                snapshot.embedded_name.as_deref(),
                &oil_types,
            ),
            old_level: snapshot.old_level,
            new_level,
            actor: attribution.actor.clone(),
            notes: attribution.notes.clone(),
            photo_refs: attribution.photo_refs.clone(),
            updated_at: now,
        };
        logs.push(entry.clone());

        debug!(
            "Tank {} level {} -> {} (memory)",
            tank_id, entry.old_level, entry.new_level
        );
        Ok(entry)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn store() -> InMemoryStore {
        InMemoryStore::with_data(
            vec![BranchRecord {
                id: "b1".into(),
                name: "North".into(),
                oil_tanks: Some(json!([
                    {"oilTypeId": "diesel", "currentLevel": 100, "capacity": 500}
                ])),
            }],
            vec![OilType { id: "diesel".into(), name: "Diesel".into() }],
        )
    }

    #[tokio::test]
    async fn test_write_updates_document_and_appends_log() {
        let store = store();
        let id = TankId::new("b1", "0");

        let entry = store
            .write_tank_level(&id, 300.0, &UpdateAttribution::new("wh-1").with_notes("dip"))
            .await
            .unwrap();

        assert_eq!(entry.branch_name, "North");
        assert_eq!(entry.oil_type_name, "Diesel");
        assert_eq!(entry.old_level, 100.0);
        assert_eq!(entry.new_level, 300.0);
        assert_eq!(entry.notes.as_deref(), Some("dip"));

        let branch = store.branch("b1").await.unwrap();
        assert_eq!(branch.oil_tanks.unwrap()[0]["currentLevel"], json!(300.0));
        assert_eq!(store.log_count().await, 1);
    }

    #[tokio::test]
    async fn test_over_capacity_write_is_rejected_without_side_effects() {
        let store = store();
        let id = TankId::new("b1", "0");

        let result = store
            .write_tank_level(&id, 501.0, &UpdateAttribution::new("wh-1"))
            .await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));
        let branch = store.branch("b1").await.unwrap();
        assert_eq!(branch.oil_tanks.unwrap()[0]["currentLevel"], json!(100));
        assert_eq!(store.log_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_tank_is_not_found() {
        let store = store();
        let attribution = UpdateAttribution::new("wh-1");

        let missing_branch = store
            .write_tank_level(&TankId::new("nope", "0"), 1.0, &attribution)
            .await;
        let missing_key = store
            .write_tank_level(&TankId::new("b1", "9"), 1.0, &attribution)
            .await;

        assert!(matches!(missing_branch, Err(StoreError::NotFound(_))));
        assert!(matches!(missing_key, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let store = store();
        store.inject_write_fault("b1").await;

        let result = store
            .write_tank_level(&TankId::new("b1", "0"), 10.0, &UpdateAttribution::new("x"))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        store.clear_write_faults().await;
        assert!(store
            .write_tank_level(&TankId::new("b1", "0"), 10.0, &UpdateAttribution::new("x"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_recent_logs_newest_first_and_limited() {
        let store = store();
        let base = Utc::now();
        for i in 0..5 {
            store
                .append_log(UpdateLogEntry {
                    id: Uuid::new_v4(),
                    branch_id: "b1".into(),
                    branch_name: "North".into(),
                    oil_type_name: "Diesel".into(),
                    old_level: 0.0,
                    new_level: i as f64,
                    actor: "seed".into(),
                    notes: None,
                    photo_refs: Vec::new(),
                    updated_at: base - Duration::days(i),
                })
                .await;
        }

        let logs = store.fetch_recent_update_logs(3).await.unwrap();

        let levels: Vec<f64> = logs.iter().map(|l| l.new_level).collect();
        assert_eq!(levels, vec![0.0, 1.0, 2.0]);
    }
}
