//! SQLite-backed strategy log.
//!
//! One row per record. The sequence number is the primary key, so storage
//! rejects duplicates on its own. Parameters are kept as a JSON array of
//! strings, exactly as logged.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;

use crate::error::StorageError;
use crate::history::LogStore;
use crate::strategy::{Strategy, StrategyRecord};

pub struct SqliteLog {
    conn: Connection,
}

impl std::fmt::Debug for SqliteLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLog")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteLog {
    /// Open (or create) the log at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let log = Self { conn };
        log.migrate()?;
        Ok(log)
    }

    /// Open an in-memory log (for tests and scratch replays).
    pub fn open_memory() -> Result<Self, StorageError> {
        let log = Self {
            conn: Connection::open_in_memory()?,
        };
        log.migrate()?;
        Ok(log)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS strategies (
                seq         INTEGER PRIMARY KEY,
                recorded_at TEXT NOT NULL,
                actor       TEXT NOT NULL,
                name        TEXT NOT NULL,
                params      TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn insert(conn: &Connection, record: &StrategyRecord) -> Result<(), StorageError> {
        let seq = i64::try_from(record.seq)
            .map_err(|_| StorageError::Corrupt(format!("sequence {} out of range", record.seq)))?;
        let params_json = serde_json::to_string(&record.strategy.params())?;
        let result = conn.execute(
            "INSERT INTO strategies (seq, recorded_at, actor, name, params)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                seq,
                record.when.to_rfc3339_opts(SecondsFormat::Micros, true),
                record.actor,
                record.name(),
                params_json,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::DuplicateSequence(record.seq))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_record(
        seq: i64,
        recorded_at: String,
        actor: String,
        name: String,
        params_json: String,
    ) -> Result<StrategyRecord, StorageError> {
        let when = DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| StorageError::Corrupt(format!("record #{seq}: bad timestamp: {e}")))?
            .with_timezone(&Utc);
        let params: Vec<String> = serde_json::from_str(&params_json)?;
        let strategy = Strategy::from_parts(&name, &params)
            .map_err(|e| StorageError::Corrupt(format!("record #{seq}: {e}")))?;
        let seq = u64::try_from(seq)
            .map_err(|_| StorageError::Corrupt(format!("negative sequence {seq}")))?;
        Ok(StrategyRecord::new(seq, when, actor, strategy))
    }
}

impl LogStore for SqliteLog {
    fn append(&mut self, record: &StrategyRecord) -> Result<(), StorageError> {
        if record.seq <= self.last_sequence()? {
            return Err(StorageError::DuplicateSequence(record.seq));
        }
        Self::insert(&self.conn, record)
    }

    fn records_after(&self, after: u64) -> Result<Vec<StrategyRecord>, StorageError> {
        let after = i64::try_from(after).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT seq, recorded_at, actor, name, params
             FROM strategies WHERE seq > ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![after], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, recorded_at, actor, name, params_json) = row?;
            records.push(Self::row_to_record(seq, recorded_at, actor, name, params_json)?);
        }
        Ok(records)
    }

    fn last_sequence(&self) -> Result<u64, StorageError> {
        let max: i64 =
            self.conn
                .query_row("SELECT COALESCE(MAX(seq), 0) FROM strategies", [], |row| {
                    row.get(0)
                })?;
        Ok(u64::try_from(max).unwrap_or(0))
    }

    fn replace_all(&mut self, records: &[StrategyRecord]) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM strategies", [])?;
        for record in records {
            Self::insert(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }
}
