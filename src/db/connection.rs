use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::errors::{FdepError, Result};

/// The embedded SQL schema applied when initializing a new database.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Tables a database may lack; queries touching them degrade instead of failing.
pub const OPTIONAL_TABLES: [&str; 6] = [
    "function_calls",
    "where_functions",
    "constructors",
    "fields",
    "type_dependencies",
    "instances",
];

/// SQLite database holding the code-analysis facts.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

/// Maps a rusqlite error to `FdepError::Database` tagged with `operation`.
pub(crate) fn db_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> FdepError {
    move |e| FdepError::Database {
        message: e.to_string(),
        operation: operation.to_string(),
    }
}

impl Database {
    /// Creates a database at `db_path` (parent directories included) and
    /// applies the full schema. Existing tables are left untouched.
    pub fn initialize(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| FdepError::Database {
                    message: format!("failed to create database directory: {e}"),
                    operation: "initialize".to_string(),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| FdepError::Database {
            message: format!("failed to open database: {e}"),
            operation: "initialize".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| FdepError::Database {
                message: format!("failed to apply schema: {e}"),
                operation: "initialize".to_string(),
            })?;

        Ok(Self { conn })
    }

    /// Opens an existing database at `db_path`.
    ///
    /// A missing file is reported as `Unavailable` rather than silently
    /// creating an empty database.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(FdepError::Unavailable {
                message: format!("database file not found: {}", db_path.display()),
            });
        }

        let conn = Connection::open(db_path).map_err(|e| FdepError::Database {
            message: format!("failed to open database: {e}"),
            operation: "open".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        // Fail early on files that are not SQLite databases or lack the core table.
        let db = Self { conn };
        if !db.has_table("modules")? {
            return Err(FdepError::Unavailable {
                message: format!("{} has no modules table", db_path.display()),
            });
        }
        Ok(db)
    }

    /// Opens an in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open_in_memory"))?;
        Self::apply_pragmas(&conn)?;
        conn.execute_batch(SCHEMA_SQL).map_err(db_err("open_in_memory"))?;
        Ok(Self { conn })
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the `Database`, closing the underlying connection.
    pub fn close(self) {
        drop(self.conn);
    }

    /// Runs a trivial query to check the connection is alive.
    pub fn ping(&self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(db_err("ping"))
    }

    /// Returns `true` if a table named `name` exists.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("has_table"))?;
        Ok(found.is_some())
    }

    /// Returns the on-disk size of the database file in bytes.
    pub fn size(&self) -> Result<u64> {
        let size: i64 = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .map_err(db_err("size"))?;
        Ok(size as u64)
    }

    /// `case_sensitive_like` makes `LIKE` byte-exact; `ilike` lowers both sides.
    fn apply_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 30000;
             PRAGMA case_sensitive_like = ON;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(|e| FdepError::Database {
            message: format!("failed to apply pragmas: {e}"),
            operation: "apply_pragmas".to_string(),
        })
    }
}
