/**
 * Durable offline queue backed by a single SQLite database.
 *
 * Two tables, one per record family:
 * - `error_log` - captured error payloads, auto-assigned keys. The
 *   serialized normalized value is stored alongside the payload so the
 *   dedup check is a single indexed equality query.
 * - `snapshot_log` - session-recording batches, explicit epoch-ms keys.
 *
 * Timestamps are epoch milliseconds (i64). A record without a timestamp
 * is treated as already expired by `clear_logs`.
 *
 * Every operation fails closed: when the connection is gone or a query
 * errors, the operation logs at `warn` and returns a neutral value. The
 * agent must keep running with a broken store underneath it.
 */
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::AgentError;
use crate::util::now_ms;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS error_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER,            -- epoch ms; NULL counts as expired
    value TEXT,                   -- serialized normalized value (dedup key)
    payload TEXT NOT NULL         -- full captured-error record as JSON
);

CREATE INDEX IF NOT EXISTS idx_error_log_value ON error_log(value);

CREATE TABLE IF NOT EXISTS snapshot_log (
    id INTEGER PRIMARY KEY,       -- explicit key, epoch ms at checkout
    timestamp INTEGER,
    payload TEXT NOT NULL         -- JSON array of recording events
);
"#;

// ---------------------------------------------------------------------------
// Table / OfflineRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Error,
    Snapshot,
}

impl Table {
    pub const fn as_str(self) -> &'static str {
        match self {
            Table::Error => "error_log",
            Table::Snapshot => "snapshot_log",
        }
    }
}

/// One persisted row of either table.
#[derive(Debug, Clone)]
pub struct OfflineRecord {
    /// Row key. `None` before insertion into `error_log`.
    pub id: Option<i64>,

    pub timestamp: Option<i64>,

    /// Dedup key column; only populated for error records.
    pub value: Option<String>,

    pub payload: Value,
}

impl OfflineRecord {
    /// An error record ready for insertion.
    pub fn error(timestamp: i64, value: String, payload: Value) -> Self {
        Self {
            id: None,
            timestamp: Some(timestamp),
            value: Some(value),
            payload,
        }
    }

    /// A snapshot batch keyed by its checkout time.
    pub fn snapshot(id: i64, payload: Value) -> Self {
        Self {
            id: Some(id),
            timestamp: Some(id),
            value: None,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// OfflineStore
// ---------------------------------------------------------------------------

/**
 * Handle to the offline database. Cloning shares the underlying
 * connection; the agent opens one handle per install and hands clones to
 * the pipeline, the worker, and the snapshot sink.
 */
#[derive(Clone)]
pub struct OfflineStore {
    conn: Arc<Mutex<Connection>>,
}

impl OfflineStore {
    pub fn open(path: &Path) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private database for tests and hosts without a writable directory.
    pub fn open_in_memory() -> Result<Self, AgentError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /*
     * All public operations funnel through here so the fail-closed
     * behavior lives in one place.
     */
    fn with_conn<T>(&self, default: T, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> T {
        let guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(_) => return default,
        };
        match f(&guard) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "offline store operation failed");
                default
            }
        }
    }

    /// Inserts a record. Key collisions on the snapshot table are no-ops.
    pub fn add_log(&self, record: &OfflineRecord, table: Table) {
        let payload = record.payload.to_string();
        self.with_conn((), |conn| {
            match table {
                Table::Error => conn.execute(
                    "INSERT INTO error_log (timestamp, value, payload) VALUES (?1, ?2, ?3)",
                    params![record.timestamp, record.value, payload],
                ),
                Table::Snapshot => conn.execute(
                    "INSERT OR IGNORE INTO snapshot_log (id, timestamp, payload) \
                     VALUES (?1, ?2, ?3)",
                    params![record.id, record.timestamp, payload],
                ),
            }
            .map(|_| ())
        });
    }

    /// Upserts a record by key.
    pub fn update_log(&self, record: &OfflineRecord, table: Table) {
        let payload = record.payload.to_string();
        self.with_conn((), |conn| {
            match table {
                Table::Error => conn.execute(
                    "INSERT OR REPLACE INTO error_log (id, timestamp, value, payload) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![record.id, record.timestamp, record.value, payload],
                ),
                Table::Snapshot => conn.execute(
                    "INSERT OR REPLACE INTO snapshot_log (id, timestamp, payload) \
                     VALUES (?1, ?2, ?3)",
                    params![record.id, record.timestamp, payload],
                ),
            }
            .map(|_| ())
        });
    }

    /// All records of a table in key order.
    pub fn get_logs(&self, table: Table) -> Vec<OfflineRecord> {
        self.with_conn(Vec::new(), |conn| {
            let sql = match table {
                Table::Error => {
                    "SELECT id, timestamp, value, payload FROM error_log ORDER BY id"
                }
                Table::Snapshot => {
                    "SELECT id, timestamp, NULL, payload FROM snapshot_log ORDER BY id"
                }
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| {
                let payload: String = row.get(3)?;
                Ok(OfflineRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    value: row.get(2)?,
                    payload: serde_json::from_str(&payload).unwrap_or(Value::Null),
                })
            })?;
            rows.collect()
        })
    }

    /**
     * Retention pruning. `max_age_days == 0` truncates the table;
     * otherwise rows older than the cutoff, and rows that never got a
     * timestamp, are deleted.
     */
    pub fn clear_logs(&self, table: Table, max_age_days: u32) {
        self.with_conn((), |conn| {
            if max_age_days == 0 {
                return conn
                    .execute(&format!("DELETE FROM {}", table.as_str()), [])
                    .map(|_| ());
            }
            let cutoff = now_ms() - i64::from(max_age_days) * 86_400_000;
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE timestamp IS NULL OR timestamp < ?1",
                    table.as_str()
                ),
                params![cutoff],
            )
            .map(|_| ())
        });
    }

    /// Exact-match dedup probe against persisted error records.
    pub fn has_value(&self, value: &str) -> bool {
        self.with_conn(false, |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM error_log WHERE value = ?1)",
                params![value],
                |row| row.get(0),
            )
        })
    }

    pub fn count(&self, table: Table) -> usize {
        self.with_conn(0, |conn| {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table.as_str()),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> OfflineStore {
        OfflineStore::open_in_memory().unwrap()
    }

    #[test]
    fn open_on_disk_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus-offline.db");

        let first = OfflineStore::open(&path).unwrap();
        first.add_log(
            &OfflineRecord::error(now_ms(), "\"boom\"".into(), json!({"value": "boom"})),
            Table::Error,
        );
        drop(first);

        /* Re-opening sees the existing schema and data. */
        let second = OfflineStore::open(&path).unwrap();
        assert_eq!(second.count(Table::Error), 1);
    }

    #[test]
    fn add_get_round_trip() {
        let store = store();
        store.add_log(
            &OfflineRecord::error(123, "\"a\"".into(), json!({"value": "a"})),
            Table::Error,
        );
        store.add_log(
            &OfflineRecord::snapshot(456, json!([{"kind": "mutation"}])),
            Table::Snapshot,
        );

        let errors = store.get_logs(Table::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].timestamp, Some(123));
        assert_eq!(errors[0].value.as_deref(), Some("\"a\""));
        assert_eq!(errors[0].payload, json!({"value": "a"}));

        let snapshots = store.get_logs(Table::Snapshot);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, Some(456));
    }

    #[test]
    fn update_log_upserts_by_key() {
        let store = store();
        store.update_log(&OfflineRecord::snapshot(1, json!(["old"])), Table::Snapshot);
        store.update_log(&OfflineRecord::snapshot(1, json!(["new"])), Table::Snapshot);

        let snapshots = store.get_logs(Table::Snapshot);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].payload, json!(["new"]));
    }

    #[test]
    fn clear_with_zero_removes_everything() {
        let store = store();
        for i in 0..3 {
            store.add_log(
                &OfflineRecord::error(now_ms(), format!("\"{i}\""), json!(i)),
                Table::Error,
            );
        }
        store.clear_logs(Table::Error, 0);
        assert_eq!(store.count(Table::Error), 0);
    }

    #[test]
    fn clear_prunes_old_and_timestampless_records() {
        let store = store();
        let now = now_ms();

        /* Fresh, stale, and timestamp-less rows. */
        store.add_log(
            &OfflineRecord::error(now, "\"fresh\"".into(), json!("fresh")),
            Table::Error,
        );
        store.add_log(
            &OfflineRecord::error(now - 10 * 86_400_000, "\"stale\"".into(), json!("stale")),
            Table::Error,
        );
        store.add_log(
            &OfflineRecord {
                id: None,
                timestamp: None,
                value: Some("\"untimed\"".into()),
                payload: json!("untimed"),
            },
            Table::Error,
        );

        store.clear_logs(Table::Error, 7);

        let remaining = store.get_logs(Table::Error);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].payload, json!("fresh"));
    }

    #[test]
    fn has_value_is_exact_match() {
        let store = store();
        store.add_log(
            &OfflineRecord::error(now_ms(), "{\"a\":1}".into(), json!({})),
            Table::Error,
        );

        assert!(store.has_value("{\"a\":1}"));
        assert!(!store.has_value("{\"a\":2}"));
        assert!(!store.has_value("{\"a\":1} "));
    }
}
