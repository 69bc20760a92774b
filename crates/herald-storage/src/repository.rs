//! SQLite implementation of [`ItemStore`].
//!
//! Conditional writes are single `UPDATE ... WHERE state = 'open'` (or
//! `blocked = 0`) statements; the row count tells the caller whether the write
//! was applied.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use herald_core::error::{HeraldError, Result};
use herald_core::types::{
    AuditEntry, AuthorRecord, BlockReason, CandidateFilter, Item, SkipReason,
};

use crate::audit;
use crate::db::Database;
use crate::store::{ItemStore, UpsertOutcome};

const ITEM_COLUMNS: &str = "internal_id, external_id, author, body, url, category, created_at, \
     state, skip_reason, skip_at, acted_at, result_id, first_seen_at, last_seen_at, mentioned_users";

/// SQLite-backed item store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Convenience constructor over a fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(Database::in_memory()?)))
    }
}

impl ItemStore for SqliteStore {
    fn upsert_item(&self, item: &Item, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        let mentioned = serde_json::to_string(&item.mentioned_users)?;
        self.db.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO items (internal_id, external_id, author, body, url, category,
                                        created_at, state, first_seen_at, last_seen_at, mentioned_users)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8, ?8, ?9)
                     ON CONFLICT(external_id) DO NOTHING",
                    params![
                        item.internal_id.to_string(),
                        item.external_id,
                        item.author,
                        item.body,
                        item.url,
                        item.category.to_string(),
                        to_millis(item.created_at),
                        to_millis(now),
                        mentioned,
                    ],
                )
                .map_err(|e| HeraldError::Storage(format!("Failed to insert item: {}", e)))?;

            if inserted == 0 {
                conn.execute(
                    "UPDATE items SET last_seen_at = ?1 WHERE external_id = ?2",
                    params![to_millis(now), item.external_id],
                )
                .map_err(|e| HeraldError::Storage(format!("Failed to refresh item: {}", e)))?;
            }

            let stored = query_item(conn, "external_id = ?1", &item.external_id)?.ok_or_else(
                || HeraldError::Storage(format!("Item {} vanished after upsert", item.external_id)),
            )?;

            if inserted == 0 {
                debug!(external_id = %item.external_id, "Refreshed known item");
                Ok(UpsertOutcome::Refreshed(stored))
            } else {
                debug!(external_id = %item.external_id, internal_id = %stored.internal_id, "Stored new item");
                Ok(UpsertOutcome::Created(stored))
            }
        })
    }

    fn get_item(&self, internal_id: Uuid) -> Result<Option<Item>> {
        self.db
            .with_conn(|conn| query_item(conn, "internal_id = ?1", &internal_id.to_string()))
    }

    fn get_item_by_external_id(&self, external_id: &str) -> Result<Option<Item>> {
        self.db
            .with_conn(|conn| query_item(conn, "external_id = ?1", external_id))
    }

    fn find_candidates(&self, filter: &CandidateFilter, limit: usize) -> Result<Vec<Item>> {
        let category = filter.category.map(|c| c.to_string());
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE state = 'open'
                   AND author NOT IN (SELECT author FROM authors WHERE blocked = 1)
                   AND (?1 IS NULL OR author = ?1)
                   AND (?2 IS NULL OR category = ?2)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| HeraldError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(
                    params![filter.author, category, limit as i64],
                    |row| Ok(row_to_item(row)),
                )
                .map_err(|e| HeraldError::Storage(e.to_string()))?;

            let mut items = Vec::new();
            for row in rows {
                let item = row.map_err(|e| HeraldError::Storage(e.to_string()))??;
                items.push(item);
            }
            Ok(items)
        })
    }

    fn mark_skipped_if_open(
        &self,
        internal_id: Uuid,
        reason: SkipReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE items SET state = 'skipped', skip_reason = ?1, skip_at = ?2
                     WHERE internal_id = ?3 AND state = 'open'",
                    params![reason.to_string(), to_millis(now), internal_id.to_string()],
                )
                .map_err(|e| HeraldError::Storage(format!("Failed to mark item skipped: {}", e)))?;
            Ok(changed == 1)
        })
    }

    fn mark_acted_if_open(
        &self,
        internal_id: Uuid,
        result_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE items SET state = 'acted', acted_at = ?1, result_id = ?2
                     WHERE internal_id = ?3 AND state = 'open'",
                    params![to_millis(now), result_id, internal_id.to_string()],
                )
                .map_err(|e| HeraldError::Storage(format!("Failed to mark item acted: {}", e)))?;
            Ok(changed == 1)
        })
    }

    fn increment_skip_count(&self, author: &str) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "INSERT INTO authors (author, skip_count) VALUES (?1, 1)
                     ON CONFLICT(author) DO UPDATE SET skip_count = skip_count + 1
                     RETURNING skip_count",
                    params![author],
                    |row| row.get(0),
                )
                .map_err(|e| {
                    HeraldError::Storage(format!("Failed to increment skip count: {}", e))
                })?;
            Ok(count.max(0) as u64)
        })
    }

    fn block_author_if_unblocked(
        &self,
        author: &str,
        reason: BlockReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "INSERT INTO authors (author, skip_count, blocked, blocked_at, blocked_reason)
                     VALUES (?1, 0, 1, ?2, ?3)
                     ON CONFLICT(author) DO UPDATE
                        SET blocked = 1, blocked_at = excluded.blocked_at,
                            blocked_reason = excluded.blocked_reason
                        WHERE blocked = 0",
                    params![author, to_millis(now), reason.to_string()],
                )
                .map_err(|e| HeraldError::Storage(format!("Failed to block author: {}", e)))?;
            Ok(changed == 1)
        })
    }

    fn get_author(&self, author: &str) -> Result<Option<AuthorRecord>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT author, skip_count, blocked, blocked_at, blocked_reason
                     FROM authors WHERE author = ?1",
                    params![author],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| HeraldError::Storage(e.to_string()))?;

            let Some((author, skip_count, blocked, blocked_at, blocked_reason)) = row else {
                return Ok(None);
            };

            Ok(Some(AuthorRecord {
                author,
                skip_count: skip_count.max(0) as u64,
                blocked: blocked != 0,
                blocked_at: blocked_at.map(from_millis).transpose()?,
                blocked_reason: blocked_reason
                    .map(|r| r.parse::<BlockReason>().map_err(HeraldError::Storage))
                    .transpose()?,
            }))
        })
    }

    fn is_author_blocked(&self, author: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let blocked: Option<i64> = conn
                .query_row(
                    "SELECT blocked FROM authors WHERE author = ?1",
                    params![author],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| HeraldError::Storage(e.to_string()))?;
            Ok(blocked.unwrap_or(0) != 0)
        })
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.db.with_conn(|conn| audit::append(conn, entry))
    }

    fn list_audit(&self, item_internal_id: Option<Uuid>, limit: usize) -> Result<Vec<AuditEntry>> {
        self.db
            .with_conn(|conn| audit::list(conn, item_internal_id, limit))
    }

    fn count_items(&self) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
                .map_err(|e| HeraldError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

// =============================================================================
// Row helpers
// =============================================================================

pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| HeraldError::Storage(format!("Invalid timestamp: {}", ms)))
}

fn query_item(conn: &rusqlite::Connection, predicate: &str, key: &str) -> Result<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE {predicate}");
    let result = conn
        .query_row(&sql, params![key], |row| Ok(row_to_item(row)))
        .optional()
        .map_err(|e| HeraldError::Storage(e.to_string()))?;

    match result {
        Some(item) => Ok(Some(item?)),
        None => Ok(None),
    }
}

fn row_to_item(row: &Row<'_>) -> Result<Item> {
    let get_err = |e: rusqlite::Error| HeraldError::Storage(e.to_string());

    let internal_id: String = row.get(0).map_err(get_err)?;
    let category: String = row.get(5).map_err(get_err)?;
    let state: String = row.get(7).map_err(get_err)?;
    let skip_reason: Option<String> = row.get(8).map_err(get_err)?;
    let skip_at: Option<i64> = row.get(9).map_err(get_err)?;
    let acted_at: Option<i64> = row.get(10).map_err(get_err)?;
    let mentioned: String = row.get(14).map_err(get_err)?;

    Ok(Item {
        internal_id: Uuid::parse_str(&internal_id)
            .map_err(|e| HeraldError::Storage(format!("Invalid item id: {}", e)))?,
        external_id: row.get(1).map_err(get_err)?,
        author: row.get(2).map_err(get_err)?,
        body: row.get(3).map_err(get_err)?,
        url: row.get(4).map_err(get_err)?,
        category: category.parse().map_err(HeraldError::Storage)?,
        created_at: from_millis(row.get(6).map_err(get_err)?)?,
        state: state.parse().map_err(HeraldError::Storage)?,
        skip_reason: skip_reason
            .map(|r| r.parse::<SkipReason>().map_err(HeraldError::Storage))
            .transpose()?,
        skip_at: skip_at.map(from_millis).transpose()?,
        acted_at: acted_at.map(from_millis).transpose()?,
        result_id: row.get(11).map_err(get_err)?,
        first_seen_at: from_millis(row.get(12).map_err(get_err)?)?,
        last_seen_at: from_millis(row.get(13).map_err(get_err)?)?,
        mentioned_users: serde_json::from_str(&mentioned)?,
    })
}
