//! Database schema migrations.
//!
//! Applies the initial schema: items, authors, audit_log and the
//! schema_migrations bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use herald_core::error::HeraldError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), HeraldError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| HeraldError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| HeraldError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema. Timestamps are epoch milliseconds.
fn apply_v1(conn: &Connection) -> Result<(), HeraldError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS items (
            internal_id     TEXT PRIMARY KEY NOT NULL,
            external_id     TEXT NOT NULL UNIQUE,
            author          TEXT NOT NULL,
            body            TEXT NOT NULL DEFAULT '',
            url             TEXT NOT NULL DEFAULT '',
            category        TEXT NOT NULL
                            CHECK (category IN ('mention', 'authored_post')),
            created_at      INTEGER NOT NULL,
            state           TEXT NOT NULL DEFAULT 'open'
                            CHECK (state IN ('open', 'acted', 'skipped')),
            skip_reason     TEXT,
            skip_at         INTEGER,
            acted_at        INTEGER,
            result_id       TEXT,
            first_seen_at   INTEGER NOT NULL,
            last_seen_at    INTEGER NOT NULL,
            mentioned_users TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_items_state_created
            ON items (state, created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_items_author_state
            ON items (author, state);

        CREATE TABLE IF NOT EXISTS authors (
            author          TEXT PRIMARY KEY NOT NULL,
            skip_count      INTEGER NOT NULL DEFAULT 0,
            blocked         INTEGER NOT NULL DEFAULT 0,
            blocked_at      INTEGER,
            blocked_reason  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_authors_blocked
            ON authors (blocked)
            WHERE blocked = 1;

        CREATE TABLE IF NOT EXISTS audit_log (
            seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
            id                  TEXT NOT NULL UNIQUE,
            action_type         TEXT NOT NULL
                                CHECK (action_type IN ('acted', 'skipped', 'blocked',
                                                      'posted', 'reposted')),
            item_internal_id    TEXT,
            author              TEXT NOT NULL,
            result_id           TEXT,
            success             INTEGER NOT NULL,
            error               TEXT,
            performed_at        INTEGER NOT NULL,
            metadata            TEXT NOT NULL DEFAULT 'null'
        );

        CREATE INDEX IF NOT EXISTS idx_audit_item
            ON audit_log (item_internal_id, performed_at DESC)
            WHERE item_internal_id IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_audit_performed
            ON audit_log (performed_at DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| HeraldError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_items_external_id_unique() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO items (internal_id, external_id, author, category, created_at, first_seen_at, last_seen_at)
             VALUES ('a', 'ext-1', 'alice', 'mention', 1, 1, 1)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO items (internal_id, external_id, author, category, created_at, first_seen_at, last_seen_at)
             VALUES ('b', 'ext-1', 'alice', 'mention', 1, 1, 1)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_items_state_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO items (internal_id, external_id, author, category, created_at, state, first_seen_at, last_seen_at)
             VALUES ('a', 'ext-1', 'alice', 'mention', 1, 'acting', 1, 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_items_category_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO items (internal_id, external_id, author, category, created_at, first_seen_at, last_seen_at)
             VALUES ('a', 'ext-1', 'alice', 'retweet', 1, 1, 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_authors_defaults() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO authors (author) VALUES ('alice')", [])
            .unwrap();

        let (count, blocked): (i64, i64) = conn
            .query_row(
                "SELECT skip_count, blocked FROM authors WHERE author = 'alice'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(blocked, 0);
    }

    #[test]
    fn test_audit_action_type_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO audit_log (id, action_type, author, success, performed_at)
             VALUES ('x', 'deleted', 'alice', 1, 1)",
            [],
        );
        assert!(result.is_err());
    }
}
