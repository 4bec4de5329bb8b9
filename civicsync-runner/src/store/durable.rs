//! Durable store: one table per entity, rows of `(id, payload, updated_at)`.
//!
//! Payloads are JSON text. Indicator series are stored one row per indicator
//! id; the other entities are single documents under the row id `default`.

use super::StoreError;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Row id for entities stored as one document.
pub const SINGLETON_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    IndicatorSeries,
    Neighborhoods,
    Projects,
    InternalAggregates,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::IndicatorSeries,
        Table::Neighborhoods,
        Table::Projects,
        Table::InternalAggregates,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::IndicatorSeries => "indicator_series",
            Table::Neighborhoods => "neighborhoods",
            Table::Projects => "projects",
            Table::InternalAggregates => "internal_aggregates",
        }
    }
}

pub trait DurableStore: Send + Sync {
    /// All `(id, payload)` rows of `table`, ordered by id.
    fn read_rows(&self, table: Table) -> Result<Vec<(String, String)>, StoreError>;

    /// Insert or replace each row by id.
    fn upsert_rows(&self, table: Table, rows: &[(String, String)]) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        Self::apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "durable store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn apply_schema(conn: &Connection) -> Result<(), StoreError> {
        for table in Table::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
                table.name()
            ))?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStore for SqliteStore {
    fn read_rows(&self, table: Table) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, payload FROM {} ORDER BY id",
            table.name()
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_rows(&self, table: Table, rows: &[(String, String)]) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, payload, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                   payload = excluded.payload,
                   updated_at = excluded.updated_at",
                table.name()
            ))?;
            for (id, payload) in rows {
                stmt.execute(params![id, payload, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, payload: &str) -> (String, String) {
        (id.to_string(), payload.to_string())
    }

    #[test]
    fn upsert_replaces_by_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_rows(Table::IndicatorSeries, &[row("b", "[1]"), row("a", "[2]")])
            .unwrap();
        store
            .upsert_rows(Table::IndicatorSeries, &[row("b", "[3]")])
            .unwrap();
        assert_eq!(
            store.read_rows(Table::IndicatorSeries).unwrap(),
            vec![row("a", "[2]"), row("b", "[3]")]
        );
    }

    #[test]
    fn tables_are_independent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_rows(Table::Projects, &[row(SINGLETON_ID, "[]")])
            .unwrap();
        assert!(store.read_rows(Table::Neighborhoods).unwrap().is_empty());
    }

    #[test]
    fn reopening_keeps_rows_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("civic.db");
        SqliteStore::open(&path)
            .unwrap()
            .upsert_rows(Table::Neighborhoods, &[row(SINGLETON_ID, "[]")])
            .unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.read_rows(Table::Neighborhoods).unwrap().len(), 1);
    }
}
