//! Inventory service
//!
//! Ties the pure inventory functions to a store. Every read re-fetches from
//! the store; nothing is cached between calls, so a view taken after a
//! commit always reflects what actually landed.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tankwatch_common::db::UpdateAttribution;
use thiserror::Error;
use tracing::{debug, warn};

use crate::inventory::csv_io::{self, ExportError, ImportError, TemplateKind};
use crate::inventory::rollup::build_branch_rollups;
use crate::inventory::{
    extract_tanks, validate_batch, BranchRollup, BulkUpdateBatch, BulkUpdateCoordinator,
    CommitError, CommitReport, Tank, Violation,
};
use crate::store::{InventoryStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    coordinator: BulkUpdateCoordinator,
    update_log_limit: usize,
}

impl InventoryService {
    pub fn new(store: Arc<dyn InventoryStore>, update_log_limit: usize) -> Self {
        Self {
            coordinator: BulkUpdateCoordinator::new(Arc::clone(&store)),
            store,
            update_log_limit,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn health_check(&self) -> ServiceResult<()> {
        Ok(self.store.health_check().await?)
    }

    /// Current tanks across all branches
    pub async fn tank_view(&self) -> ServiceResult<Vec<Tank>> {
        let branches = self.store.fetch_branches().await?;
        let oil_types = self.store.fetch_oil_types().await?;
        Ok(extract_tanks(&branches, &oil_types))
    }

    /// Freshness rollup of every branch on the local calendar
    pub async fn branch_rollup(&self, now: DateTime<Utc>) -> ServiceResult<Vec<BranchRollup>> {
        self.branch_rollup_in(now, &Local).await
    }

    pub async fn branch_rollup_in<Tz: TimeZone + Sync>(
        &self,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> ServiceResult<Vec<BranchRollup>> {
        let branches = self.store.fetch_branches().await?;
        let oil_types = self.store.fetch_oil_types().await?;
        let logs = self
            .store
            .fetch_recent_update_logs(self.update_log_limit)
            .await?;

        let tanks = extract_tanks(&branches, &oil_types);
        debug!(
            "Rollup over {} branch(es), {} tank(s), {} log entries",
            branches.len(),
            tanks.len(),
            logs.len()
        );
        Ok(build_branch_rollups(&branches, &tanks, &logs, now, tz))
    }

    /// Violations of `batch` against the current tank view
    pub async fn validate(&self, batch: &BulkUpdateBatch) -> ServiceResult<Vec<Violation>> {
        let tanks = self.tank_view().await?;
        Ok(validate_batch(batch, &tanks))
    }

    /// Commit `batch` and return the report with a freshly read tank view
    ///
    /// Once writes have run the report is always returned. The view is `None`
    /// if re-reading the store fails; callers re-fetch it separately.
    pub async fn commit(
        &self,
        batch: &BulkUpdateBatch,
        attribution: &UpdateAttribution,
    ) -> ServiceResult<(CommitReport, Option<Vec<Tank>>)> {
        let tanks = self.tank_view().await?;
        let report = self.coordinator.commit(batch, &tanks, attribution).await?;
        let refreshed = match self.tank_view().await {
            Ok(tanks) => Some(tanks),
            Err(e) => {
                warn!("Tank view refresh after commit failed: {}", e);
                None
            }
        };
        Ok((report, refreshed))
    }

    pub async fn export_template(
        &self,
        kind: TemplateKind,
        export_date: NaiveDate,
    ) -> ServiceResult<String> {
        let tanks = self.tank_view().await?;
        Ok(csv_io::export_template(kind, &tanks, export_date)?)
    }

    /// Parse a bulk template into a batch plus any commit-blocking violations
    pub async fn import_template(
        &self,
        csv_text: &str,
    ) -> ServiceResult<(BulkUpdateBatch, Vec<Violation>)> {
        let tanks = self.tank_view().await?;
        let batch = csv_io::import_template(csv_text, &tanks)?;
        let violations = validate_batch(&batch, &tanks);
        Ok((batch, violations))
    }
}
