// Read-only relational access (SQLite through rusqlite)

use std::fmt;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};

use crate::table::RawTable;

#[derive(Debug)]
pub enum SqlError {
    /// The database could not be opened or is not a database.
    Open(String),
    /// A statement failed to prepare or execute.
    Query(String),
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlError::Open(msg) => write!(f, "cannot open database: {}", msg),
            SqlError::Query(msg) => write!(f, "query failed: {}", msg),
        }
    }
}

impl std::error::Error for SqlError {}

/// One read-only connection; every statement result comes back as a [`RawTable`].
pub struct SqlClient {
    conn: Connection,
    statements: usize,
}

impl SqlClient {
    /// Open an existing database read-only. `timeout` bounds lock waits per statement.
    pub fn open_read_only(path: &Path, timeout: Duration) -> Result<Self, SqlError> {
        if !path.is_file() {
            return Err(SqlError::Open(format!("{} does not exist", path.display())));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SqlError::Open(format!("{}: {}", path.display(), e)))?;

        conn.busy_timeout(timeout)
            .map_err(|e| SqlError::Open(e.to_string()))?;

        // Opening is lazy; touch the schema so a non-database file fails here
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
            .map_err(|e| SqlError::Open(format!("{}: {}", path.display(), e)))?;

        log::debug!("opened {} read-only (timeout {:?})", path.display(), timeout);
        Ok(Self { conn, statements: 0 })
    }

    /// Run one statement. Positional parameters beyond what the statement declares
    /// are ignored, so overridden queries may use fewer placeholders.
    pub fn query_table(&mut self, sql: &str, params: &[String]) -> Result<RawTable, SqlError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SqlError::Query(e.to_string()))?;
        self.statements += 1;

        let headers: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = headers.len();
        let bound = stmt.parameter_count().min(params.len());

        let mut rows = stmt
            .query(params_from_iter(params[..bound].iter()))
            .map_err(|e| SqlError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| SqlError::Query(e.to_string()))? {
            let mut record = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| SqlError::Query(e.to_string()))?;
                record.push(value_to_string(value));
            }
            out.push(record);
        }

        Ok(RawTable::new(headers, out))
    }

    /// Statements prepared on this connection so far.
    pub fn statements_executed(&self) -> usize {
        self.statements
    }

    pub fn close(self) -> Result<(), SqlError> {
        self.conn.close().map_err(|(_, e)| SqlError::Query(e.to_string()))
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().to_string(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
