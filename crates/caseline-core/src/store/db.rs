//! Connection ownership, schema management and the store's locking
//! discipline.
//!
//! The store is a best-effort cache of data derivable from the case, never
//! the source of truth: read operations log storage failures and degrade to
//! neutral results instead of propagating them. Only the transactional bulk
//! path returns errors, so a failed or cancelled population rolls back.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::CoreConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Population was cancelled cooperatively; the open transaction rolls
    /// back. Not a failure.
    #[error("population cancelled")]
    Cancelled,
}

/// The embedded events database. All operations serialize on one exclusive
/// lock: there is no reader/writer parallelism against the single backing
/// file.
pub struct EventStore {
    pub(super) conn: Mutex<Connection>,
    path: PathBuf,
}

impl EventStore {
    /// Open (creating or upgrading in place if needed) the events database
    /// of the given case.
    pub fn open(config: &CoreConfig) -> Result<EventStore, StoreError> {
        std::fs::create_dir_all(&config.case_dir)?;
        let path = config.events_db_path();
        let conn = Connection::open(&path)?;
        configure_connection(&conn)?;
        init_schema(&conn)?;
        info!("opened events database at {}", path.display());
        Ok(EventStore {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `body` inside one transaction, holding the store lock for the
    /// whole of it. Commits on `Ok`, rolls back on any `Err` (including
    /// cancellation).
    pub fn in_transaction<T>(
        &self,
        body: impl FnOnce(&StoreWriter<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let txn = conn.transaction()?;
        match body(&StoreWriter { txn: &txn }) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    warn!("rollback after failed population also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Drop and recreate every table. Population entry point only.
    pub fn reinitialize(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "DROP TABLE IF EXISTS hash_set_hits;\n\
             DROP TABLE IF EXISTS hash_sets;\n\
             DROP TABLE IF EXISTS tags;\n\
             DROP TABLE IF EXISTS events;\n\
             DROP TABLE IF EXISTS db_info;",
        )?;
        init_schema(&conn)?;
        Ok(())
    }

    /// Drop and recreate only the tag applications, clearing the derived
    /// `tagged` flags so a tag replay starts from a clean slate.
    pub fn reinitialize_tags(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch("DROP TABLE IF EXISTS tags;")?;
        create_tags_table(&conn)?;
        conn.execute("UPDATE events SET tagged = 0", [])?;
        Ok(())
    }

    /// Refresh the query planner statistics after a bulk load.
    pub fn analyze(&self) {
        let conn = self.conn.lock();
        if let Err(err) = conn.execute_batch("ANALYZE; ANALYZE sqlite_master;") {
            warn!("failed to analyze events database: {err}");
        }
    }

    /// True when the schema carries the three optional columns and at least
    /// one data source has been recorded. Pre-upgrade databases answer false
    /// and need a full repopulation (no real object has id 0, which is the
    /// default the upgrade backfills).
    pub fn is_schema_current(&self) -> bool {
        let conn = self.conn.lock();
        for column in ["datasource_id", "tagged", "hash_hit"] {
            match has_events_column(&conn, column) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(err) => {
                    error!("failed to introspect events schema: {err}");
                    return false;
                }
            }
        }
        match conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE datasource_id IS NOT NULL AND datasource_id != 0)",
            [],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(found) => found != 0,
            Err(err) => {
                error!("failed to probe for recorded data sources: {err}");
                false
            }
        }
    }

    /// Best-effort write to the key/value metadata table.
    pub fn set_db_info(&self, key: &str, value: i64) {
        let conn = self.conn.lock();
        if let Err(err) = conn.execute(
            "INSERT OR REPLACE INTO db_info (key, value) VALUES (?1, ?2)",
            params![key, value],
        ) {
            warn!("failed to store db_info {key}: {err}");
        }
    }

    pub fn db_info_value(&self, key: &str) -> Option<i64> {
        let conn = self.conn.lock();
        match conn
            .query_row(
                "SELECT value FROM db_info WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to read db_info {key}: {err}");
                None
            }
        }
    }
}

/// Scoped handle for writes within one open transaction.
pub struct StoreWriter<'a> {
    pub(super) txn: &'a Transaction<'a>,
}

pub(crate) fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    // no OS crash recovery is needed for a rebuildable cache, so trade
    // durability for io throughput
    conn.execute_batch(
        "PRAGMA synchronous = OFF;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA cache_size = 50000;\n\
         PRAGMA auto_vacuum = 0;\n\
         PRAGMA read_uncommitted = ON;",
    )
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS db_info (\n\
           key TEXT,\n\
           value INTEGER,\n\
           PRIMARY KEY (key));\n\
         CREATE TABLE IF NOT EXISTS events (\n\
           event_id INTEGER PRIMARY KEY,\n\
           datasource_id INTEGER,\n\
           file_id INTEGER,\n\
           artifact_id INTEGER,\n\
           time INTEGER,\n\
           sub_type INTEGER,\n\
           base_type INTEGER,\n\
           full_description TEXT,\n\
           med_description TEXT,\n\
           short_description TEXT,\n\
           known_state INTEGER,\n\
           hash_hit INTEGER,\n\
           tagged INTEGER);\n\
         CREATE TABLE IF NOT EXISTS hash_sets (\n\
           hash_set_id INTEGER PRIMARY KEY,\n\
           hash_set_name VARCHAR(255) UNIQUE NOT NULL);\n\
         CREATE TABLE IF NOT EXISTS hash_set_hits (\n\
           hash_set_id INTEGER REFERENCES hash_sets(hash_set_id) NOT NULL,\n\
           event_id INTEGER REFERENCES events(event_id) NOT NULL,\n\
           PRIMARY KEY (hash_set_id, event_id));",
    )?;
    create_tags_table(conn)?;

    // A database written before these columns existed is upgraded in place.
    // Column presence, not a version number, is the migration signal.
    for column in ["datasource_id", "tagged", "hash_hit"] {
        if !has_events_column(conn, column)? {
            conn.execute(
                &format!("ALTER TABLE events ADD COLUMN {column} INTEGER"),
                [],
            )?;
        }
    }

    create_index(conn, "events", &["datasource_id"])?;
    create_index(conn, "events", &["event_id", "hash_hit"])?;
    create_index(conn, "events", &["event_id", "tagged"])?;
    create_index(conn, "events", &["file_id"])?;
    create_index(conn, "events", &["artifact_id"])?;
    create_index(conn, "events", &["sub_type", "short_description", "time"])?;
    create_index(conn, "events", &["base_type", "short_description", "time"])?;
    create_index(conn, "events", &["time"])?;
    create_index(conn, "events", &["known_state"])?;
    Ok(())
}

fn create_tags_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tags (\n\
           tag_id INTEGER NOT NULL,\n\
           tag_name_id INTEGER NOT NULL,\n\
           tag_name_display_name TEXT NOT NULL,\n\
           event_id INTEGER REFERENCES events(event_id) NOT NULL,\n\
           PRIMARY KEY (event_id, tag_name_id));",
    )
}

fn create_index(conn: &Connection, table: &str, columns: &[&str]) -> rusqlite::Result<()> {
    let index_name = format!("{table}_{}_idx", columns.join("_"));
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS {index_name} ON {table}({})",
            columns.join(",")
        ),
        [],
    )?;
    Ok(())
}

fn has_events_column(conn: &Connection, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare("PRAGMA table_info(events)")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_schema() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(&CoreConfig::new(dir.path())).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.count_all_events(), 0);
        assert_eq!(store.min_time(), -1);
        assert_eq!(store.max_time(), -1);
    }

    #[test]
    fn test_old_schema_gains_columns_on_open() {
        let dir = tempdir().unwrap();
        let config = CoreConfig::new(dir.path());
        {
            let conn = Connection::open(config.events_db_path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE events (\n\
                   event_id INTEGER PRIMARY KEY,\n\
                   file_id INTEGER,\n\
                   artifact_id INTEGER,\n\
                   time INTEGER,\n\
                   sub_type INTEGER,\n\
                   base_type INTEGER,\n\
                   full_description TEXT,\n\
                   med_description TEXT,\n\
                   short_description TEXT,\n\
                   known_state INTEGER);",
            )
            .unwrap();
            conn.execute(
                "INSERT INTO events (file_id, time, sub_type, base_type, full_description, \
                 med_description, short_description, known_state) \
                 VALUES (7, 1000, 1, 0, '/img/a.txt', '/img', '/img/', 0)",
                [],
            )
            .unwrap();
        }

        let store = EventStore::open(&config).unwrap();
        {
            let conn = store.conn.lock();
            for column in ["datasource_id", "tagged", "hash_hit"] {
                assert!(
                    has_events_column(&conn, column).unwrap(),
                    "missing upgraded column {column}"
                );
            }
        }
        // the pre-upgrade row reads back with neutral values for the new columns
        let event = store.event_by_id(1).expect("pre-upgrade row still readable");
        assert_eq!(event.data_source_id, 0);
        assert!(!event.hash_hit);
        assert!(!event.tagged);
        // no data source recorded yet, so a full repopulation is required
        assert!(!store.is_schema_current());
    }

    #[test]
    fn test_reinitialize_clears_everything() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(&CoreConfig::new(dir.path())).unwrap();
        store.set_db_info("last_populated", 12345);
        store.reinitialize().unwrap();
        assert_eq!(store.count_all_events(), 0);
        assert_eq!(store.db_info_value("last_populated"), None);
    }

    #[test]
    fn test_db_info_round_trip() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(&CoreConfig::new(dir.path())).unwrap();
        assert_eq!(store.db_info_value("last_populated"), None);
        store.set_db_info("last_populated", 1700000000);
        assert_eq!(store.db_info_value("last_populated"), Some(1700000000));
        store.set_db_info("last_populated", 1700000999);
        assert_eq!(store.db_info_value("last_populated"), Some(1700000999));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let dir = tempdir().unwrap();
        let store = EventStore::open(&CoreConfig::new(dir.path())).unwrap();
        let result: Result<(), StoreError> = store.in_transaction(|writer| {
            writer.txn.execute(
                "INSERT INTO events (file_id, time, sub_type, base_type) VALUES (1, 10, 1, 0)",
                [],
            )?;
            Err(StoreError::Cancelled)
        });
        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert_eq!(store.count_all_events(), 0);
    }
}
