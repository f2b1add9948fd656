//! Database models
//!
//! Branches are stored document-style: the branch row carries its tanks as a
//! raw JSON value in `oil_tanks`, which historically has been either an array
//! of tank objects or an object keyed by tank key. Interpreting that value is
//! the inventory engine's job, so it is kept untyped here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub oil_tanks: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OilType {
    pub id: String,
    pub name: String,
}

/// One accepted tank-level change. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLogEntry {
    pub id: Uuid,
    pub branch_id: String,
    pub branch_name: String,
    pub oil_type_name: String,
    pub old_level: f64,
    pub new_level: f64,
    pub actor: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Who made a change and what they attached to it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateAttribution {
    pub actor: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
}

impl UpdateAttribution {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            notes: None,
            photo_refs: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
