//! Warehouse inventory engine
//!
//! Pure classification of tank levels and data freshness, plus the bulk
//! update path that writes new levels back through the store:
//!
//! - [`status`]: fill level → operational status
//! - [`extract`]: branch documents → flat tank list
//! - [`staleness`]: last update → freshness tier
//! - [`rollup`]: tank tiers → branch status
//! - [`bulk`]: staged batch → validated, sequential per-branch writes
//! - [`csv_io`]: CSV templates in and out of the bulk batch shape

pub mod bulk;
pub mod csv_io;
pub mod extract;
pub mod rollup;
pub mod staleness;
pub mod status;

pub use bulk::{
    validate_batch, BranchCommitResult, BranchFailure, BulkUpdateBatch, BulkUpdateCoordinator,
    CommitError, CommitOutcome, CommitReport, Violation, ViolationKind,
};
pub use csv_io::{
    export_template, import_template, ExportError, ImportError, RowError, TemplateKind,
};
pub use extract::{extract_branch_tanks, extract_tanks, Tank, TankId, UNKNOWN_OIL_TYPE};
pub use rollup::{build_branch_rollups, rollup, BranchRollup, RollupStatus, TierCounts};
pub use staleness::{classify_staleness, latest_update_for, StalenessTier};
pub use status::{classify_level, fill_percentage, TankStatus};
