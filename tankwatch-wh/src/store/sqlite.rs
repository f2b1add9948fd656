//! SQLite implementation of the inventory store
//!
//! Branch documents keep their embedded tanks as JSON text in
//! `branches.oil_tanks`, so a tank write is a read-modify-write of one row.
//! The row update and the log insert share a transaction: either both land
//! or neither does.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tankwatch_common::db::{init_database, BranchRecord, OilType, UpdateAttribution, UpdateLogEntry};
use tankwatch_common::time;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{check_level, InventoryStore, StoreError, StoreResult};
use crate::inventory::extract::{resolve_oil_type_name, set_embedded_level};
use crate::inventory::TankId;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `db_path`
    pub async fn open(db_path: &Path) -> tankwatch_common::Result<Self> {
        Ok(Self::new(init_database(db_path).await?))
    }

    /// Insert or replace a branch document
    pub async fn upsert_branch(&self, branch: &BranchRecord) -> StoreResult<()> {
        let oil_tanks = branch
            .oil_tanks
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO branches (id, name, oil_tanks)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                oil_tanks = excluded.oil_tanks,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(oil_tanks)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_oil_type(&self, oil_type: &OilType) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO oil_types (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&oil_type.id)
        .bind(&oil_type.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a historical log entry without touching any tank
    pub async fn append_log(&self, entry: &UpdateLogEntry) -> StoreResult<()> {
        insert_log(&self.pool, entry).await
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    // Fixed width and always 'Z' so text order equals time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

async fn insert_log<'e, E>(executor: E, entry: &UpdateLogEntry) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let photo_refs = serde_json::to_string(&entry.photo_refs)?;

    sqlx::query(
        r#"
        INSERT INTO tank_update_logs
            (id, branch_id, branch_name, oil_type_name, old_level, new_level,
             actor, notes, photo_refs, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(&entry.branch_id)
    .bind(&entry.branch_name)
    .bind(&entry.oil_type_name)
    .bind(entry.old_level)
    .bind(entry.new_level)
    .bind(&entry.actor)
    .bind(&entry.notes)
    .bind(photo_refs)
    .bind(format_timestamp(entry.updated_at))
    .execute(executor)
    .await?;

    Ok(())
}

fn log_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Option<UpdateLogEntry>> {
    let id: String = row.try_get("id")?;
    let updated_at: String = row.try_get("updated_at")?;

    let (Ok(id), Ok(updated_at)) = (
        Uuid::parse_str(&id),
        DateTime::parse_from_rfc3339(&updated_at),
    ) else {
        warn!("Skipping unreadable update log row {}", id);
        return Ok(None);
    };

    let photo_refs: String = row.try_get("photo_refs")?;

    Ok(Some(UpdateLogEntry {
        id,
        branch_id: row.try_get("branch_id")?,
        branch_name: row.try_get("branch_name")?,
        oil_type_name: row.try_get("oil_type_name")?,
        old_level: row.try_get("old_level")?,
        new_level: row.try_get("new_level")?,
        actor: row.try_get("actor")?,
        notes: row.try_get("notes")?,
        photo_refs: serde_json::from_str(&photo_refs).unwrap_or_default(),
        updated_at: updated_at.with_timezone(&Utc),
    }))
}

#[async_trait]
impl InventoryStore for SqliteStore {
    async fn fetch_branches(&self) -> StoreResult<Vec<BranchRecord>> {
        let rows: Vec<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id, name, oil_tanks FROM branches ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, raw)| {
                let oil_tanks = raw.and_then(|text| match serde_json::from_str::<Value>(&text) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("Branch {} has unreadable oil_tanks: {}", id, e);
                        None
                    }
                });
                BranchRecord { id, name, oil_tanks }
            })
            .collect())
    }

    async fn fetch_oil_types(&self) -> StoreResult<Vec<OilType>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM oil_types ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| OilType { id, name })
            .collect())
    }

    async fn fetch_recent_update_logs(&self, limit: usize) -> StoreResult<Vec<UpdateLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, branch_id, branch_name, oil_type_name, old_level, new_level,
                   actor, notes, photo_refs, updated_at
            FROM tank_update_logs
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entry) = log_from_row(row)? {
                logs.push(entry);
            }
        }
        Ok(logs)
    }

    async fn write_tank_level(
        &self,
        tank_id: &TankId,
        new_level: f64,
        attribution: &UpdateAttribution,
    ) -> StoreResult<UpdateLogEntry> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT name, oil_tanks FROM branches WHERE id = ?")
                .bind(&tank_id.branch_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (branch_name, raw) =
            row.ok_or_else(|| StoreError::NotFound(format!("branch {}", tank_id.branch_id)))?;
        let raw = raw.ok_or_else(|| StoreError::NotFound(format!("tank {}", tank_id)))?;

        let now = time::now();
        let mut document: Value = serde_json::from_str(&raw)?;
        let snapshot = set_embedded_level(&mut document, &tank_id.key, new_level, now)
            .ok_or_else(|| StoreError::NotFound(format!("tank {}", tank_id)))?;
        check_level(tank_id, new_level, snapshot.capacity)?;

        let catalogue: Vec<OilType> = match snapshot.oil_type_id.as_deref() {
            Some(oil_type_id) => {
                sqlx::query_as::<_, (String, String)>("SELECT id, name FROM oil_types WHERE id = ?")
                    .bind(oil_type_id)
                    .fetch_all(&mut *tx)
                    .await?
                    .into_iter()
                    .map(|(id, name)| OilType { id, name })
                    .collect()
            }
            None => Vec::new(),
        };

        sqlx::query("UPDATE branches SET oil_tanks = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(serde_json::to_string(&document)?)
            .bind(&tank_id.branch_id)
            .execute(&mut *tx)
            .await?;

        let entry = UpdateLogEntry {
            id: Uuid::new_v4(),
            branch_id: tank_id.branch_id.clone(),
            branch_name,
            oil_type_name: resolve_oil_type_name(
                snapshot.oil_type_id.as_deref(),
                snapshot.embedded_name.as_deref(),
                &catalogue,
            ),
            old_level: snapshot.old_level,
            new_level,
            actor: attribution.actor.clone(),
            notes: attribution.notes.clone(),
            photo_refs: attribution.photo_refs.clone(),
            updated_at: now,
        };
        insert_log(&mut *tx, &entry).await?;

        tx.commit().await?;

        debug!(
            "Tank {} level {} -> {} (sqlite)",
            tank_id, entry.old_level, entry.new_level
        );
        Ok(entry)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
