//! Tank fill level classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// At or below this fill percentage a tank is critical
pub const CRITICAL_MAX_PERCENT: f64 = 5.0;
/// At or below this fill percentage (and above critical) a tank is low
pub const LOW_MAX_PERCENT: f64 = 25.0;
/// At or above this fill percentage a tank is full
pub const FULL_MIN_PERCENT: f64 = 95.0;

/// Operational status of a tank derived from its fill percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TankStatus {
    Critical,
    Low,
    Normal,
    Full,
}

impl TankStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TankStatus::Critical => "critical",
            TankStatus::Low => "low",
            TankStatus::Normal => "normal",
            TankStatus::Full => "full",
        }
    }
}

impl fmt::Display for TankStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fill percentage of a tank
///
/// A tank with no usable capacity reads as empty rather than failing.
pub fn fill_percentage(current_level: f64, capacity: f64) -> f64 {
    if !(capacity > 0.0) || !current_level.is_finite() || !capacity.is_finite() {
        return 0.0;
    }
    current_level / capacity * 100.0
}

/// Classify a tank by fill level
///
/// Thresholds are checked critical first and full last, so the boundaries
/// 5%, 25% and 95% are deterministic.
pub fn classify_level(current_level: f64, capacity: f64) -> TankStatus {
    let percentage = fill_percentage(current_level, capacity);

    if percentage <= CRITICAL_MAX_PERCENT {
        TankStatus::Critical
    } else if percentage <= LOW_MAX_PERCENT {
        TankStatus::Low
    } else if percentage >= FULL_MIN_PERCENT {
        TankStatus::Full
    } else {
        TankStatus::Normal
    }
}
