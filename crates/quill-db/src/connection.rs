//! The request-owned connection handle.

use crate::error::DbError;
use crate::record::{ColumnInfo, Record};
use rusqlite::{Connection, OpenFlags, Params};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// An open link to the backing store, owned by one request scope.
///
/// The handle is closed exactly once, by teardown. Every operation after
/// that fails with [`DbError::Closed`].
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl ConnectionHandle {
    /// Opens the store at `path`, creating the file if it does not exist.
    pub(crate) fn open(
        path: &Path,
        busy_timeout_ms: u64,
        foreign_keys: bool,
    ) -> Result<Self, DbError> {
        let open_err = |source| DbError::Open {
            path: path.to_path_buf(),
            source,
        };

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = {};
             PRAGMA busy_timeout = {};",
            if foreign_keys { "ON" } else { "OFF" },
            busy_timeout_ms
        ))
        .map_err(open_err)?;

        Ok(Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Process-unique identifier of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Location of the backing store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once teardown has closed the handle.
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Runs `f` against the underlying driver connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(DbError::Closed(self.id))?;
        f(conn)
    }

    /// Executes one statement and returns the number of affected rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, DbError> {
        self.with_connection(|conn| Ok(conn.execute(sql, params)?))
    }

    /// Executes a multi-statement script.
    pub fn execute_script(&self, sql: &str) -> Result<(), DbError> {
        self.with_connection(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Runs a query and returns every row.
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Record>, DbError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Arc<[ColumnInfo]> = stmt
                .columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name().to_string(),
                    decl_type: c.decl_type().map(str::to_string),
                })
                .collect();

            let mut rows = stmt.query(params)?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(Record::from_row(row, &columns)?);
            }
            Ok(records)
        })
    }

    /// Runs a query and returns its first row, if any.
    pub fn query_one<P: Params>(&self, sql: &str, params: P) -> Result<Option<Record>, DbError> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_rowid(&self) -> Result<i64, DbError> {
        self.with_connection(|conn| Ok(conn.last_insert_rowid()))
    }

    /// Closes the connection. Later calls are no-ops.
    ///
    /// The handle counts as closed even if the driver reports an error.
    pub(crate) fn close(&self) -> Result<(), DbError> {
        let taken = self.lock().take();
        match taken {
            Some(conn) => conn.close().map_err(|(_, e)| DbError::Query(e)),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
