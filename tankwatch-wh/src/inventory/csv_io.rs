//! CSV templates for bulk updates
//!
//! Two templates are produced:
//! - `bulk`: one row per tank with an editable `New Level (L)` column. It is
//!   prefilled with the current level so the untouched file imports as a
//!   batch that changes nothing.
//! - `stock`: a read-only stock report.
//!
//! Only the bulk template is imported. Importing never writes; it produces
//! a [`BulkUpdateBatch`] for the coordinator, or the complete list of
//! problems found in the file.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::string::FromUtf8Error;
use thiserror::Error;
use tracing::{debug, warn};

use super::bulk::BulkUpdateBatch;
use super::extract::{Tank, TankId};

pub const HEADER_BRANCH_NAME: &str = "Branch Name";
pub const HEADER_OIL_TYPE: &str = "Oil Type";
pub const HEADER_CURRENT_LEVEL: &str = "Current Level (L)";
pub const HEADER_CAPACITY: &str = "Capacity (L)";
pub const HEADER_NEW_LEVEL: &str = "New Level (L)";
pub const HEADER_TANK_ID: &str = "Tank ID";
pub const HEADER_STATUS: &str = "Status";
pub const HEADER_EXPORT_DATE: &str = "Export Date";

const BULK_HEADERS: [&str; 6] = [
    HEADER_BRANCH_NAME,
    HEADER_OIL_TYPE,
    HEADER_CURRENT_LEVEL,
    HEADER_CAPACITY,
    HEADER_NEW_LEVEL,
    HEADER_TANK_ID,
];

const STOCK_HEADERS: [&str; 6] = [
    HEADER_BRANCH_NAME,
    HEADER_OIL_TYPE,
    HEADER_CURRENT_LEVEL,
    HEADER_CAPACITY,
    HEADER_STATUS,
    HEADER_EXPORT_DATE,
];

/// Columns an import cannot do without
const REQUIRED_IMPORT_HEADERS: [&str; 4] = [
    HEADER_BRANCH_NAME,
    HEADER_OIL_TYPE,
    HEADER_NEW_LEVEL,
    HEADER_TANK_ID,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Bulk,
    StockReport,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Bulk => "bulk",
            TemplateKind::StockReport => "stock",
        }
    }

    /// Suggested download file name
    pub fn file_name(self, export_date: NaiveDate) -> String {
        match self {
            TemplateKind::Bulk => format!("bulk-update-{}.csv", export_date.format("%Y-%m-%d")),
            TemplateKind::StockReport => {
                format!("stock-report-{}.csv", export_date.format("%Y-%m-%d"))
            }
        }
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bulk" => Ok(TemplateKind::Bulk),
            "stock" | "stock_report" | "stock-report" => Ok(TemplateKind::StockReport),
            other => Err(format!("Unknown template kind '{}' (expected bulk or stock)", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] FromUtf8Error),
}

/// A problem with one row of an imported file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// 1-based line in the file, header included
    pub line: u64,
    /// As written in the file
    pub tank_id: Option<String>,
    pub branch_name: Option<String>,
    pub oil_type_name: Option<String>,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unreadable CSV: {0}")]
    Malformed(String),

    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    #[error("{} row(s) could not be imported", .0.len())]
    Rows(Vec<RowError>),
}

fn format_litres(value: f64) -> String {
    format!("{}", value)
}

/// Render `tanks` as the chosen template
pub fn export_template(
    kind: TemplateKind,
    tanks: &[Tank],
    export_date: NaiveDate,
) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let date = export_date.format("%Y-%m-%d").to_string();

    match kind {
        TemplateKind::Bulk => {
            writer.write_record(BULK_HEADERS)?;
            for tank in tanks {
                let current = format_litres(tank.current_level);
                writer.write_record([
                    tank.branch_name.as_str(),
                    tank.oil_type_name.as_str(),
                    current.as_str(),
                    format_litres(tank.capacity).as_str(),
                    current.as_str(),
                    tank.id.to_string().as_str(),
                ])?;
            }
        }
        TemplateKind::StockReport => {
            writer.write_record(STOCK_HEADERS)?;
            for tank in tanks {
                writer.write_record([
                    tank.branch_name.as_str(),
                    tank.oil_type_name.as_str(),
                    format_litres(tank.current_level).as_str(),
                    format_litres(tank.capacity).as_str(),
                    tank.status.as_str(),
                    date.as_str(),
                ])?;
            }
        }
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    debug!("Exported {} template with {} tank(s)", kind.as_str(), tanks.len());
    Ok(String::from_utf8(bytes)?)
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

fn names_match(written: &str, expected: &str) -> bool {
    written.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// Parse a filled-in bulk template against the current tank view
///
/// Every row is checked and every problem reported; a single bad row makes
/// the whole import fail. Column order does not matter and header names are
/// matched ignoring case and surrounding spaces. Blank rows are ignored.
pub fn import_template(csv_text: &str, tanks: &[Tank]) -> Result<BulkUpdateBatch, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ImportError::Malformed(format!("Failed to read CSV headers: {}", e)))?
        .clone();

    let header_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| (normalize_header(header), idx))
        .collect();

    let missing: Vec<String> = REQUIRED_IMPORT_HEADERS
        .iter()
        .filter(|h| !header_map.contains_key(&normalize_header(h)))
        .map(|h| h.to_string())
        .collect();
    if !missing.is_empty() {
        warn!("CSV import missing column(s): {}", missing.join(", "));
        return Err(ImportError::MissingHeaders(missing));
    }

    let column = |name: &str| header_map.get(&normalize_header(name)).copied();
    let (Some(branch_col), Some(oil_col), Some(level_col), Some(id_col)) = (
        column(HEADER_BRANCH_NAME),
        column(HEADER_OIL_TYPE),
        column(HEADER_NEW_LEVEL),
        column(HEADER_TANK_ID),
    ) else {
        return Err(ImportError::MissingHeaders(
            REQUIRED_IMPORT_HEADERS.iter().map(|h| h.to_string()).collect(),
        ));
    };

    let index: HashMap<&TankId, &Tank> = tanks.iter().map(|t| (&t.id, t)).collect();
    let mut seen: HashSet<TankId> = HashSet::new();
    let mut batch = BulkUpdateBatch::new();
    let mut errors = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| ImportError::Malformed(e.to_string()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let field = |idx: usize| record.get(idx).filter(|s| !s.is_empty());
        let raw_id = field(id_col);
        let branch_name = field(branch_col);
        let oil_type_name = field(oil_col);

        let mut row_error = |message: String| {
            errors.push(RowError {
                line,
                tank_id: raw_id.map(str::to_string),
                branch_name: branch_name.map(str::to_string),
                oil_type_name: oil_type_name.map(str::to_string),
                message,
            });
        };

        let Some(raw_id) = raw_id else {
            row_error("Missing tank id".to_string());
            continue;
        };
        let tank_id = match raw_id.parse::<TankId>() {
            Ok(id) => id,
            Err(e) => {
                row_error(e.to_string());
                continue;
            }
        };
        let Some(tank) = index.get(&tank_id) else {
            row_error(format!("Unknown tank {}", tank_id));
            continue;
        };
        if !seen.insert(tank_id.clone()) {
            row_error(format!("Tank {} appears more than once", tank_id));
            continue;
        }

        if !names_match(branch_name.unwrap_or(""), &tank.branch_name) {
            row_error(format!(
                "Branch name does not match tank {} (expected '{}')",
                tank_id, tank.branch_name
            ));
        }
        if !names_match(oil_type_name.unwrap_or(""), &tank.oil_type_name) {
            row_error(format!(
                "Oil type does not match tank {} (expected '{}')",
                tank_id, tank.oil_type_name
            ));
        }

        let Some(raw_level) = field(level_col) else {
            row_error("Missing new level".to_string());
            continue;
        };
        let Ok(level) = raw_level.parse::<f64>() else {
            row_error(format!("New level '{}' is not a number", raw_level));
            continue;
        };

        if !level.is_finite() {
            row_error(format!("New level {} is not a finite number", level));
        } else if level < 0.0 {
            row_error(format!("New level {} L is below 0 L", level));
        } else if level > tank.capacity {
            row_error(format!(
                "New level {} L exceeds capacity {} L",
                level, tank.capacity
            ));
        } else {
            batch.stage(tank_id, level);
        }
    }

    if !errors.is_empty() {
        warn!("CSV import rejected: {} row error(s)", errors.len());
        return Err(ImportError::Rows(errors));
    }

    debug!("CSV import staged {} tank(s)", batch.len());
    Ok(batch)
}
