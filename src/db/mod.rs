use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task;
use crate::error::{Result, UbkgError};
use crate::query::ComposedQuery;

pub mod migrate;
mod row;

#[cfg(test)]
pub(crate) mod fixtures;

pub use row::Row;

// WAL for concurrent readers, NORMAL sync, foreign keys, in-memory temp store,
// 64MB page cache, 256MB mmap.
const WRITE_PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536; \
     PRAGMA mmap_size = 268435456; \
     PRAGMA wal_autocheckpoint = 1000;";

const SESSION_PRAGMAS: &str = "PRAGMA query_only = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536;";

/// SQLite VM instructions between wall-clock checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Handle to the graph store.
///
/// Cheap to clone; holds no open connection. Every call acquires its own
/// session and drops it before returning, whatever the outcome.
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl Db {
    /// Create a new store handle
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
            timeout: None,
        }
    }

    /// Abort read sessions whose statements run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Open a read-write connection with the store pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(UbkgError::Database)?;
        conn.execute_batch(WRITE_PRAGMAS)?;
        Ok(conn)
    }

    /// Execute a closure with a read-write connection in a blocking task.
    ///
    /// Used for schema preparation and test fixtures; queries go through
    /// [`Db::with_session`].
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| UbkgError::StoreConnectivity(format!("connection task failed: {}", e)))?
    }

    /// Execute a closure inside a scoped read-only session.
    ///
    /// The session is opened with `query_only` set and, when a timeout is
    /// configured, a progress handler that interrupts any statement still
    /// running once the deadline passes.
    pub async fn with_session<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let timeout = self.timeout;
        task::spawn_blocking(move || {
            let conn = open_session(&path)?;
            if let Some(limit) = timeout {
                let deadline = Instant::now() + limit;
                conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
            }
            f(&conn)
        })
        .await
        .map_err(|e| UbkgError::StoreConnectivity(format!("session task failed: {}", e)))?
    }

    /// Run one composed query in its own session and collect the rows.
    pub async fn run_query(&self, query: ComposedQuery) -> Result<Vec<Row>> {
        self.with_session(move |conn| execute(conn, &query)).await
    }
}

fn open_session(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| UbkgError::StoreConnectivity(format!("cannot open {}: {}", path.display(), e)))?;
    conn.execute_batch(SESSION_PRAGMAS)
        .map_err(|e| UbkgError::StoreConnectivity(format!("cannot configure session: {}", e)))?;
    Ok(conn)
}

/// Execute a composed query on an open session.
pub fn execute(conn: &Connection, query: &ComposedQuery) -> Result<Vec<Row>> {
    log::debug!("query: {}", query.sql());

    let mut stmt = conn.prepare(query.sql()).map_err(execution_error)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let params = query.named_params();
    let mut rows = stmt.query(params.as_slice()).map_err(execution_error)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(execution_error)? {
        out.push(Row::from_sqlite(&names, row).map_err(execution_error)?);
    }
    Ok(out)
}

/// Does a concept with this CUI exist?
pub fn concept_exists(conn: &Connection, cui: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare_cached("SELECT 1 FROM concepts WHERE cui = ?1")
        .map_err(execution_error)?;
    stmt.exists([cui]).map_err(execution_error)
}

fn execution_error(err: rusqlite::Error) -> UbkgError {
    match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => {
            UbkgError::TraversalExecution("query exceeded its wall-clock limit".to_string())
        }
        _ => UbkgError::TraversalExecution(err.to_string()),
    }
}
