//! SQLite-backed event log.

use crate::error::db_err;
use crate::{EventLog, Registration, StorageError};
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use pp_types::{LoggedEvent, PhaseEvent, PhaseStatus, Run, RunId, Unit, UnitId};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS unit (
    run_id INTEGER NOT NULL REFERENCES run(id),
    id TEXT NOT NULL,
    metadata TEXT NOT NULL,
    PRIMARY KEY (run_id, id)
);
CREATE TABLE IF NOT EXISTS phase_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES run(id),
    unit_id TEXT,
    phase INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('running', 'success', 'failed')),
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_phase_event_key ON phase_event (run_id, unit_id, phase);
CREATE TRIGGER IF NOT EXISTS phase_event_no_update BEFORE UPDATE ON phase_event
BEGIN
    SELECT RAISE(ABORT, 'phase_event is append-only');
END;
CREATE TRIGGER IF NOT EXISTS phase_event_no_delete BEFORE DELETE ON phase_event
BEGIN
    SELECT RAISE(ABORT, 'phase_event is append-only');
END;
";

/// Event log persisted in a single SQLite database file.
///
/// One connection is shared behind a mutex; every append runs in its own
/// transaction.
pub struct SqliteEventLog {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteEventLog {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&path).map_err(db_err("open the sqlite database"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err("set journal_mode"))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(db_err("set synchronous"))?;
        Self::init(conn, Some(path))
    }

    /// A private database that lives as long as the returned value.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err("open an in-memory database"))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(db_err("enable foreign keys"))?;
        conn.busy_timeout(Duration::from_secs(30))
            .map_err(db_err("set the busy timeout"))?;
        conn.execute_batch(SCHEMA)
            .map_err(db_err("create the schema"))?;
        Ok(SqliteEventLog {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn run_exists(conn: &Connection, run_id: RunId) -> Result<bool, StorageError> {
    Ok(conn
        .query_row("SELECT 1 FROM run WHERE id = ?1", params![run_id.0], |_| {
            Ok(())
        })
        .optional()
        .map_err(db_err("look up the run"))?
        .is_some())
}

fn find_run_by_name(conn: &Connection, name: &str) -> Result<Option<Run>, StorageError> {
    conn.query_row(
        "SELECT id, name FROM run WHERE name = ?1",
        params![name],
        |row| {
            Ok(Run {
                id: RunId(row.get(0)?),
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(db_err("look up the run by name"))
}

fn conversion_failure(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn decode_event(row: &Row<'_>) -> rusqlite::Result<LoggedEvent> {
    let status: String = row.get(4)?;
    let status =
        PhaseStatus::from_str(&status).map_err(|e| conversion_failure(4, Type::Text, e))?;
    let timestamp: String = row.get(5)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| conversion_failure(5, Type::Text, e))?
        .with_timezone(&Utc);
    Ok(LoggedEvent {
        seq: row.get(0)?,
        event: PhaseEvent {
            run_id: RunId(row.get(1)?),
            unit: row.get::<_, Option<String>>(2)?.map(UnitId::from),
            phase: row.get(3)?,
            status,
            timestamp,
        },
    })
}

impl EventLog for SqliteEventLog {
    fn register_run(&self, name: &str) -> Result<Registration, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("begin a transaction"))?;
        if let Some(run) = find_run_by_name(&tx, name)? {
            return Ok(Registration::Existing(run));
        }
        tx.execute("INSERT INTO run (name) VALUES (?1)", params![name])
            .map_err(db_err("insert the run"))?;
        let run = Run {
            id: RunId(tx.last_insert_rowid()),
            name: name.to_string(),
        };
        tx.commit().map_err(db_err("commit the run"))?;
        debug!("registered run {} as id {}", run.name, run.id);
        Ok(Registration::Created(run))
    }

    fn find_run(&self, name: &str) -> Result<Option<Run>, StorageError> {
        find_run_by_name(&*self.lock()?, name)
    }

    fn runs(&self) -> Result<Vec<Run>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM run ORDER BY id ASC")
            .map_err(db_err("prepare the run query"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Run {
                    id: RunId(row.get(0)?),
                    name: row.get(1)?,
                })
            })
            .map_err(db_err("query runs"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("decode a run"))
    }

    fn register_units(&self, run_id: RunId, units: &[Unit]) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("begin a transaction"))?;
        if !run_exists(&tx, run_id)? {
            return Err(StorageError::RunNotFound(run_id));
        }
        {
            let mut stmt = tx
                .prepare("INSERT OR IGNORE INTO unit (run_id, id, metadata) VALUES (?1, ?2, ?3)")
                .map_err(db_err("prepare the unit insert"))?;
            for unit in units {
                stmt.execute(params![run_id.0, unit.id.as_str(), unit.metadata()])
                    .map_err(db_err("insert a unit"))?;
            }
        }
        tx.commit().map_err(db_err("commit the units"))
    }

    fn units(&self, run_id: RunId) -> Result<Vec<Unit>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, metadata FROM unit WHERE run_id = ?1 ORDER BY rowid ASC")
            .map_err(db_err("prepare the unit query"))?;
        let rows = stmt
            .query_map(params![run_id.0], |row| {
                let id: String = row.get(0)?;
                let metadata: String = row.get(1)?;
                Ok(Unit::from_metadata(run_id, UnitId::from(id), &metadata))
            })
            .map_err(db_err("query units"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("decode a unit"))
    }

    fn append(&self, event: &PhaseEvent) -> Result<i64, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("begin a transaction"))?;
        if !run_exists(&tx, event.run_id)? {
            return Err(StorageError::RunNotFound(event.run_id));
        }
        tx.execute(
            "INSERT INTO phase_event (run_id, unit_id, phase, status, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.run_id.0,
                event.unit.as_ref().map(UnitId::as_str),
                event.phase,
                event.status.to_string(),
                event
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(db_err("insert the event"))?;
        let seq = tx.last_insert_rowid();
        tx.commit().map_err(db_err("commit the event"))?;
        Ok(seq)
    }

    fn events_for(
        &self,
        run_id: RunId,
        unit: Option<&UnitId>,
        phase: Option<u32>,
    ) -> Result<Vec<LoggedEvent>, StorageError> {
        let mut sql = String::from(
            "SELECT id, run_id, unit_id, phase, status, timestamp FROM phase_event WHERE run_id = ?",
        );
        let mut args = vec![Value::Integer(run_id.0)];
        if let Some(unit) = unit {
            sql.push_str(" AND unit_id = ?");
            args.push(Value::Text(unit.as_str().to_string()));
        }
        if let Some(phase) = phase {
            sql.push_str(" AND phase = ?");
            args.push(Value::Integer(i64::from(phase)));
        }
        sql.push_str(" ORDER BY id ASC");

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(db_err("prepare the event query"))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), decode_event)
            .map_err(db_err("query events"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("decode an event"))
    }
}
