//! Bulk tank-level updates
//!
//! A [`BulkUpdateBatch`] is a plain map from tank to proposed level. The UI
//! stages values into it one by one and the CSV importer produces one
//! wholesale; both end up here.
//!
//! Committing is all-or-nothing with respect to validation and
//! best-effort with respect to storage:
//! - any capacity or negativity violation refuses the whole batch before a
//!   single write is issued;
//! - writes are grouped by branch and the groups run strictly one after
//!   another. Tanks are sub-records of their branch document, so two writes
//!   to the same branch in flight at once would each read the old document
//!   and one update would be lost;
//! - a failing branch stops its own group but not the branches after it,
//!   and the report says exactly which branches did not land.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tankwatch_common::db::{UpdateAttribution, UpdateLogEntry};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::extract::{Tank, TankId};
use crate::store::InventoryStore;

/// Proposed new levels keyed by tank, not yet persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulkUpdateBatch {
    changes: BTreeMap<TankId, f64>,
}

impl BulkUpdateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a proposed level, replacing any earlier value for the tank
    ///
    /// Staged values are not checked here; out-of-range values are reported
    /// by [`validate_batch`] and block [`BulkUpdateCoordinator::commit`].
    pub fn stage(&mut self, tank_id: TankId, new_level: f64) -> Option<f64> {
        self.changes.insert(tank_id, new_level)
    }

    pub fn unstage(&mut self, tank_id: &TankId) -> Option<f64> {
        self.changes.remove(tank_id)
    }

    /// Discard every staged change
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn get(&self, tank_id: &TankId) -> Option<f64> {
        self.changes.get(tank_id).copied()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TankId, f64)> {
        self.changes.iter().map(|(id, level)| (id, *level))
    }
}

impl FromIterator<(TankId, f64)> for BulkUpdateBatch {
    fn from_iter<I: IntoIterator<Item = (TankId, f64)>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}

/// Why a staged value cannot be written
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    ExceedsCapacity { capacity: f64 },
    Negative,
    NotANumber,
    UnknownTank,
}

/// One staged entry that breaks a tank invariant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub tank_id: TankId,
    pub branch_name: Option<String>,
    pub oil_type_name: Option<String>,
    pub value: f64,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let branch = self.branch_name.as_deref().unwrap_or("?");
        let oil = self.oil_type_name.as_deref().unwrap_or("?");
        match &self.kind {
            ViolationKind::ExceedsCapacity { capacity } => write!(
                f,
                "{} / {} ({}): {} L exceeds capacity {} L",
                branch, oil, self.tank_id, self.value, capacity
            ),
            ViolationKind::Negative => write!(
                f,
                "{} / {} ({}): {} L is below 0 L",
                branch, oil, self.tank_id, self.value
            ),
            ViolationKind::NotANumber => write!(
                f,
                "{} / {} ({}): level is not a finite number",
                branch, oil, self.tank_id
            ),
            ViolationKind::UnknownTank => write!(f, "{}: no such tank", self.tank_id),
        }
    }
}

/// Every staged entry that may not be written, in tank-id order
///
/// An empty result is the precondition for [`BulkUpdateCoordinator::commit`].
pub fn validate_batch(batch: &BulkUpdateBatch, tanks: &[Tank]) -> Vec<Violation> {
    let index: HashMap<&TankId, &Tank> = tanks.iter().map(|t| (&t.id, t)).collect();

    batch
        .iter()
        .filter_map(|(tank_id, value)| {
            let Some(tank) = index.get(tank_id) else {
                return Some(Violation {
                    tank_id: tank_id.clone(),
                    branch_name: None,
                    oil_type_name: None,
                    value,
                    kind: ViolationKind::UnknownTank,
                });
            };

            let kind = if !value.is_finite() {
                ViolationKind::NotANumber
            } else if value < 0.0 {
                ViolationKind::Negative
            } else if value > tank.capacity {
                ViolationKind::ExceedsCapacity {
                    capacity: tank.capacity,
                }
            } else {
                return None;
            };

            Some(Violation {
                tank_id: tank_id.clone(),
                branch_name: Some(tank.branch_name.clone()),
                oil_type_name: Some(tank.oil_type_name.clone()),
                value,
                kind,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Every staged change was written
    Succeeded,
    /// Some branches were written, at least one was not
    PartiallySucceeded,
    /// Nothing was written
    Failed,
}

/// The write that stopped a branch group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchFailure {
    pub tank_id: TankId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchCommitResult {
    pub branch_id: String,
    pub branch_name: String,
    /// Number of tanks staged for this branch
    pub requested: usize,
    pub applied: Vec<UpdateLogEntry>,
    pub failure: Option<BranchFailure>,
}

impl BranchCommitResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReport {
    pub outcome: CommitOutcome,
    pub branches: Vec<BranchCommitResult>,
}

impl CommitReport {
    fn from_results(branches: Vec<BranchCommitResult>) -> Self {
        let failed = branches.iter().filter(|b| !b.is_success()).count();
        let applied: usize = branches.iter().map(|b| b.applied.len()).sum();

        let outcome = if failed == 0 {
            CommitOutcome::Succeeded
        } else if applied == 0 {
            CommitOutcome::Failed
        } else {
            CommitOutcome::PartiallySucceeded
        };

        Self { outcome, branches }
    }

    pub fn failed_branches(&self) -> impl Iterator<Item = &BranchCommitResult> {
        self.branches.iter().filter(|b| !b.is_success())
    }

    pub fn applied_count(&self) -> usize {
        self.branches.iter().map(|b| b.applied.len()).sum()
    }
}

#[derive(Debug, Error)]
pub enum CommitError {
    /// Blocking: nothing was written
    #[error("batch rejected with {} violation(s)", .0.len())]
    Validation(Vec<Violation>),

    #[error("another bulk commit is already in progress")]
    CommitInProgress,
}

/// Staged entries of one branch, in tank order
struct BranchGroup<'a> {
    branch_id: &'a str,
    branch_name: &'a str,
    entries: Vec<(&'a Tank, f64)>,
}

/// Group staged entries by owning branch
///
/// Branches appear in the order their first tank appears in `tanks`, so
/// a commit walks branches in the same order the dashboard lists them.
fn group_by_branch<'a>(batch: &BulkUpdateBatch, tanks: &'a [Tank]) -> Vec<BranchGroup<'a>> {
    let mut groups: Vec<BranchGroup<'a>> = Vec::new();
    let mut positions: HashMap<&'a str, usize> = HashMap::new();

    for tank in tanks {
        let Some(level) = batch.get(&tank.id) else {
            continue;
        };
        let position = *positions.entry(tank.branch_id.as_str()).or_insert_with(|| {
            groups.push(BranchGroup {
                branch_id: &tank.branch_id,
                branch_name: &tank.branch_name,
                entries: Vec::new(),
            });
            groups.len() - 1
        });
        groups[position].entries.push((tank, level));
    }

    groups
}

/// Applies validated batches through the store, one branch at a time
pub struct BulkUpdateCoordinator {
    store: Arc<dyn InventoryStore>,
    in_flight: Mutex<()>,
}

impl BulkUpdateCoordinator {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(()),
        }
    }

    /// Write every staged level
    ///
    /// `tanks` must be a fresh view of the store; capacities are taken from
    /// it. After this returns, re-read the tank view rather than patching
    /// it locally: some branches may not have been written, and
    /// last-updated stamps come from the store.
    ///
    /// Overlapping calls on one coordinator are refused with
    /// [`CommitError::CommitInProgress`] rather than queued.
    pub async fn commit(
        &self,
        batch: &BulkUpdateBatch,
        tanks: &[Tank],
        attribution: &UpdateAttribution,
    ) -> Result<CommitReport, CommitError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| CommitError::CommitInProgress)?;

        let violations = validate_batch(batch, tanks);
        if !violations.is_empty() {
            warn!(
                "Bulk commit by {} refused: {} violation(s)",
                attribution.actor,
                violations.len()
            );
            return Err(CommitError::Validation(violations));
        }

        let groups = group_by_branch(batch, tanks);
        info!(
            "Bulk commit by {}: {} tank(s) across {} branch(es)",
            attribution.actor,
            batch.len(),
            groups.len()
        );

        let mut results = Vec::with_capacity(groups.len());
        for group in groups {
            // Awaited to completion before the next branch starts
            results.push(self.apply_branch(group, attribution).await);
        }

        let report = CommitReport::from_results(results);
        match report.outcome {
            CommitOutcome::Succeeded => info!(
                "Bulk commit succeeded: {} tank(s) written",
                report.applied_count()
            ),
            outcome => warn!(
                "Bulk commit {:?}: {} tank(s) written, {} branch(es) failed",
                outcome,
                report.applied_count(),
                report.failed_branches().count()
            ),
        }

        Ok(report)
    }

    async fn apply_branch(
        &self,
        group: BranchGroup<'_>,
        attribution: &UpdateAttribution,
    ) -> BranchCommitResult {
        let mut applied = Vec::with_capacity(group.entries.len());
        let mut failure = None;

        for (tank, level) in &group.entries {
            match self.store.write_tank_level(&tank.id, *level, attribution).await {
                Ok(entry) => applied.push(entry),
                Err(e) => {
                    warn!(
                        "Write to tank {} ({} / {}) failed, skipping rest of branch: {}",
                        tank.id, tank.branch_name, tank.oil_type_name, e
                    );
                    failure = Some(BranchFailure {
                        tank_id: tank.id.clone(),
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        BranchCommitResult {
            branch_id: group.branch_id.to_string(),
            branch_name: group.branch_name.to_string(),
            requested: group.entries.len(),
            applied,
            failure,
        }
    }
}
