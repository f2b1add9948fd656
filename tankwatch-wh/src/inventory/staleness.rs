//! Data freshness of tank readings
//!
//! Freshness is measured in calendar days, not rolling 24-hour windows: both
//! the last update and "now" are reduced to their date in the caller's time
//! zone before subtracting. A reading taken at 23:55 yesterday is one day old at 00:05.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tankwatch_common::db::UpdateLogEntry;
use tankwatch_common::time::calendar_days_between;

use super::extract::Tank;

/// Readings at most this many calendar days old are recent
pub const RECENT_MAX_DAYS: i64 = 1;
/// Readings at most this many calendar days old (and not recent) are stale
pub const STALE_MAX_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessTier {
    /// No update has ever been logged for the tank
    Never,
    Recent,
    Stale,
    Old,
}

impl fmt::Display for StalenessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StalenessTier::Never => "never",
            StalenessTier::Recent => "recent",
            StalenessTier::Stale => "stale",
            StalenessTier::Old => "old",
        };
        f.write_str(s)
    }
}

/// Classify a tank's freshness using the calendar of `tz`
pub fn classify_staleness<Tz: TimeZone>(
    last_update: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tz: &Tz,
) -> StalenessTier {
    let Some(last_update) = last_update else {
        return StalenessTier::Never;
    };

    // Same day and clock-skewed future readings both land here
    let days = calendar_days_between(last_update, now, tz);
    if days <= RECENT_MAX_DAYS {
        StalenessTier::Recent
    } else if days <= STALE_MAX_DAYS {
        StalenessTier::Stale
    } else {
        StalenessTier::Old
    }
}

/// Most recent logged update for a tank
///
/// Log entries only carry names, so they are matched on
/// `(branch_name, oil_type_name)`. Renaming a branch detaches its history.
pub fn latest_update_for(tank: &Tank, logs: &[UpdateLogEntry]) -> Option<DateTime<Utc>> {
    logs.iter()
        .filter(|log| log.branch_name == tank.branch_name && log.oil_type_name == tank.oil_type_name)
        .map(|log| log.updated_at)
        .max()
}
