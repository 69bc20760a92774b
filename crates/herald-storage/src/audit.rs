//! Append-only audit log.
//!
//! Entries are never updated or deleted. Reads return the newest entries
//! first, ties broken by insertion order.

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use herald_core::error::{HeraldError, Result};
use herald_core::types::{AuditAction, AuditEntry};

use crate::repository::{from_millis, to_millis};

pub(crate) fn append(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    let metadata = serde_json::to_string(&entry.metadata)?;
    conn.execute(
        "INSERT INTO audit_log (id, action_type, item_internal_id, author, result_id,
                                success, error, performed_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id.to_string(),
            entry.action_type.to_string(),
            entry.item_internal_id.map(|id| id.to_string()),
            entry.author,
            entry.result_id,
            entry.success as i32,
            entry.error,
            to_millis(entry.performed_at),
            metadata,
        ],
    )
    .map_err(|e| HeraldError::Storage(format!("Failed to append audit entry: {}", e)))?;
    Ok(())
}

pub(crate) fn list(
    conn: &Connection,
    item_internal_id: Option<Uuid>,
    limit: usize,
) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, action_type, item_internal_id, author, result_id,
                    success, error, performed_at, metadata
             FROM audit_log
             WHERE (?1 IS NULL OR item_internal_id = ?1)
             ORDER BY performed_at DESC, seq DESC
             LIMIT ?2",
        )
        .map_err(|e| HeraldError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(
            params![item_internal_id.map(|id| id.to_string()), limit as i64],
            |row| Ok(row_to_entry(row)),
        )
        .map_err(|e| HeraldError::Storage(e.to_string()))?;

    let mut entries = Vec::new();
    for row in rows {
        let entry = row.map_err(|e| HeraldError::Storage(e.to_string()))??;
        entries.push(entry);
    }
    Ok(entries)
}

fn row_to_entry(row: &Row<'_>) -> Result<AuditEntry> {
    let get_err = |e: rusqlite::Error| HeraldError::Storage(e.to_string());

    let id: String = row.get(0).map_err(get_err)?;
    let action_type: String = row.get(1).map_err(get_err)?;
    let item_id: Option<String> = row.get(2).map_err(get_err)?;
    let success: i64 = row.get(5).map_err(get_err)?;
    let metadata: String = row.get(8).map_err(get_err)?;

    let parse_uuid =
        |s: &str| Uuid::parse_str(s).map_err(|e| HeraldError::Storage(format!("Invalid id: {}", e)));

    Ok(AuditEntry {
        id: parse_uuid(&id)?,
        action_type: action_type
            .parse::<AuditAction>()
            .map_err(HeraldError::Storage)?,
        item_internal_id: item_id.as_deref().map(parse_uuid).transpose()?,
        author: row.get(3).map_err(get_err)?,
        result_id: row.get(4).map_err(get_err)?,
        success: success != 0,
        error: row.get(6).map_err(get_err)?,
        performed_at: from_millis(row.get(7).map_err(get_err)?)?,
        metadata: serde_json::from_str(&metadata)?,
    })
}
