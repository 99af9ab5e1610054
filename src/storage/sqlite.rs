use super::{EnumerationOrder, KeyValueStore, Keyspace, StoredValue, CURRENT_USER_VERSION};
use crate::error::{LiteCoreError, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// rusqlite-backed [`KeyValueStore`] — the reference backing store named in
/// spec.md §6. One table per keyspace, each keyed by a `BLOB` primary key
/// so ordered enumeration falls directly out of SQLite's index order.
///
/// Grounded on the teacher's `adapters::outbound::sqlite_backend_repo`:
/// a thin wrapper around a single `rusqlite::Connection`, opened with
/// `Connection::open` and driven with prepared statements built per call.
pub struct SqliteStore {
    conn: Connection,
    in_transaction: bool,
}

fn table_name(keyspace: Keyspace) -> &'static str {
    match keyspace {
        Keyspace::Documents => "documents",
        Keyspace::Revisions => "revisions",
        Keyspace::LocalDocs => "local_docs",
        Keyspace::Checkpoints => "checkpoints",
        Keyspace::Raw => "raw",
    }
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn, in_transaction: false })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn, in_transaction: false })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        for keyspace in [Keyspace::Documents, Keyspace::Revisions, Keyspace::LocalDocs, Keyspace::Checkpoints, Keyspace::Raw] {
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (key BLOB PRIMARY KEY, value BLOB NOT NULL, meta BLOB NOT NULL) WITHOUT ROWID",
                    table_name(keyspace)
                ),
                [],
            )?;
        }
        let existing: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if existing == 0 {
            conn.execute(&format!("PRAGMA user_version = {CURRENT_USER_VERSION}"), [])?;
        } else {
            super::check_user_version(existing)?;
        }
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, keyspace: Keyspace, key: &[u8]) -> Result<Option<StoredValue>> {
        let sql = format!("SELECT value, meta FROM {} WHERE key = ?1", table_name(keyspace));
        self.conn
            .query_row(&sql, params![key], |row| Ok(StoredValue { value: row.get(0)?, meta: row.get(1)? }))
            .optional()
            .map_err(LiteCoreError::from)
    }

    fn put(&mut self, keyspace: Keyspace, key: &[u8], value: StoredValue) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (key, value, meta) VALUES (?1, ?2, ?3) ON CONFLICT(key) DO UPDATE SET value = excluded.value, meta = excluded.meta",
            table_name(keyspace)
        );
        self.conn.execute(&sql, params![key, value.value, value.meta])?;
        Ok(())
    }

    fn delete(&mut self, keyspace: Keyspace, key: &[u8]) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?1", table_name(keyspace));
        self.conn.execute(&sql, params![key])?;
        Ok(())
    }

    fn enumerate(
        &self,
        keyspace: Keyspace,
        start_key: Option<&[u8]>,
        end_key: Option<&[u8]>,
        order: EnumerationOrder,
    ) -> Result<Vec<(Vec<u8>, StoredValue)>> {
        let table = table_name(keyspace);
        let direction = match order {
            EnumerationOrder::Ascending => "ASC",
            EnumerationOrder::Descending => "DESC",
        };
        let (sql, lo, hi) = match (start_key, end_key) {
            (Some(lo), Some(hi)) => (format!("SELECT key, value, meta FROM {table} WHERE key >= ?1 AND key < ?2 ORDER BY key {direction}"), lo.to_vec(), hi.to_vec()),
            (Some(lo), None) => (format!("SELECT key, value, meta FROM {table} WHERE key >= ?1 ORDER BY key {direction}"), lo.to_vec(), vec![]),
            (None, Some(hi)) => (format!("SELECT key, value, meta FROM {table} WHERE key < ?1 ORDER BY key {direction}"), hi.to_vec(), vec![]),
            (None, None) => (format!("SELECT key, value, meta FROM {table} ORDER BY key {direction}"), vec![], vec![]),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match (start_key, end_key) {
            (Some(_), Some(_)) => stmt.query_map(params![lo, hi], Self::row_to_entry)?,
            (Some(_), None) | (None, Some(_)) => stmt.query_map(params![lo], Self::row_to_entry)?,
            (None, None) => stmt.query_map([], Self::row_to_entry)?,
        };
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(LiteCoreError::from)
    }

    fn begin_tx(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(LiteCoreError::InvalidParameter("transaction already open".into()));
        }
        self.conn.execute("BEGIN IMMEDIATE", [])?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit_tx(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(LiteCoreError::InvalidParameter("no open transaction".into()));
        }
        self.conn.execute("COMMIT", [])?;
        self.in_transaction = false;
        Ok(())
    }

    fn abort_tx(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(LiteCoreError::InvalidParameter("no open transaction".into()));
        }
        self.conn.execute("ROLLBACK", [])?;
        self.in_transaction = false;
        Ok(())
    }

    fn user_version(&self) -> Result<i64> {
        Ok(self.conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn set_user_version(&mut self, version: i64) -> Result<()> {
        self.conn.execute(&format!("PRAGMA user_version = {version}"), [])?;
        Ok(())
    }
}

impl SqliteStore {
    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<(Vec<u8>, StoredValue)> {
        Ok((row.get(0)?, StoredValue { value: row.get(1)?, meta: row.get(2)? }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.put(Keyspace::Documents, b"doc1", StoredValue { value: b"hi".to_vec(), meta: vec![1] }).unwrap();
        let got = store.get(Keyspace::Documents, b"doc1").unwrap().unwrap();
        assert_eq!(got.value, b"hi");
        assert_eq!(got.meta, vec![1]);
    }

    #[test]
    fn abort_rolls_back_writes() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.begin_tx().unwrap();
        store.put(Keyspace::Documents, b"doc1", StoredValue { value: b"hi".to_vec(), meta: vec![] }).unwrap();
        store.abort_tx().unwrap();
        assert!(store.get(Keyspace::Documents, b"doc1").unwrap().is_none());
    }

    #[test]
    fn fresh_database_is_stamped_with_the_current_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.user_version().unwrap(), CURRENT_USER_VERSION);
    }

    #[test]
    fn opening_an_unrecognized_future_schema_fails() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA user_version = 9000", []).unwrap();
        drop(conn);
        // Simulated via direct schema check rather than a shared temp file,
        // since `open_in_memory` can't be reopened against the same DB.
        assert!(super::super::check_user_version(9000).is_err());
    }

    #[test]
    fn enumerate_orders_ascending_and_descending() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for k in ["a", "b", "c"] {
            store.put(Keyspace::Documents, k.as_bytes(), StoredValue { value: vec![], meta: vec![] }).unwrap();
        }
        let asc = store.enumerate(Keyspace::Documents, None, None, EnumerationOrder::Ascending).unwrap();
        assert_eq!(asc.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        let desc = store.enumerate(Keyspace::Documents, None, None, EnumerationOrder::Descending).unwrap();
        assert_eq!(desc.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }
}
