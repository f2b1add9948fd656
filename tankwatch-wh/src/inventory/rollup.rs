//! Branch-level freshness rollup

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tankwatch_common::db::{BranchRecord, UpdateLogEntry};

use super::extract::{Tank, TankId};
use super::staleness::{classify_staleness, latest_update_for, StalenessTier};

/// How well a branch's tank readings are being maintained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollupStatus {
    /// Every tank is either never updated or older than a week
    NeedsAttention,
    PartiallyUpdated,
    /// Every tank is recent (trivially true for a branch without tanks)
    FullyUpdated,
}

/// Number of tanks in each staleness tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub never: usize,
    pub recent: usize,
    pub stale: usize,
    pub old: usize,
}

impl TierCounts {
    pub fn record(&mut self, tier: StalenessTier) {
        match tier {
            StalenessTier::Never => self.never += 1,
            StalenessTier::Recent => self.recent += 1,
            StalenessTier::Stale => self.stale += 1,
            StalenessTier::Old => self.old += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.never + self.recent + self.stale + self.old
    }
}

/// Freshness detail for one tank inside a rollup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TankFreshness {
    pub tank_id: TankId,
    pub oil_type_name: String,
    pub tier: StalenessTier,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchRollup {
    pub branch_id: String,
    pub branch_name: String,
    pub status: RollupStatus,
    pub counts: TierCounts,
    pub tanks: Vec<TankFreshness>,
}

/// Combine per-tank tiers into one branch status
pub fn rollup<I>(tiers: I) -> (RollupStatus, TierCounts)
where
    I: IntoIterator<Item = StalenessTier>,
{
    let mut counts = TierCounts::default();
    for tier in tiers {
        counts.record(tier);
    }

    let total = counts.total();
    // Checked before needs-attention so an empty branch is fully updated
    let status = if counts.recent == total {
        RollupStatus::FullyUpdated
    } else if counts.never + counts.old == total {
        RollupStatus::NeedsAttention
    } else {
        RollupStatus::PartiallyUpdated
    };

    (status, counts)
}

/// One rollup per branch, in branch order, using the calendar of `tz`
///
/// Branches without tanks are included and roll up as fully updated.
pub fn build_branch_rollups<Tz: TimeZone>(
    branches: &[BranchRecord],
    tanks: &[Tank],
    logs: &[UpdateLogEntry],
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<BranchRollup> {
    branches
        .iter()
        .map(|branch| {
            let detail: Vec<TankFreshness> = tanks
                .iter()
                .filter(|t| t.branch_id == branch.id)
                .map(|t| {
                    let last_update = latest_update_for(t, logs);
                    TankFreshness {
                        tank_id: t.id.clone(),
                        oil_type_name: t.oil_type_name.clone(),
                        tier: classify_staleness(last_update, now, tz),
                        last_update,
                    }
                })
                .collect();

            let (status, counts) = rollup(detail.iter().map(|d| d.tier));

            BranchRollup {
                branch_id: branch.id.clone(),
                branch_name: branch.name.clone(),
                status,
                counts,
                tanks: detail,
            }
        })
        .collect()
}
