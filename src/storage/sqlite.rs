//! SQLite storage implementation

use std::path::{Path, PathBuf};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, Transaction, named_params};
use super::schema;
use crate::name::ObjectId;

/// Named parameters, e.g. `named_params! { ":name": name }`
pub type Params<'a> = &'a [(&'a str, &'a dyn ToSql)];

/// Errors raised by the relational store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A statement failed; carries the SQL text and SQLite's message
    #[error("failed to execute `{statement}`: {source}")]
    Statement {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Can't open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Can't read schema file {path}: {source}")]
    SchemaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema hash not found in {0}")]
    SchemaHashMissing(PathBuf),

    #[error("Schema mismatch in {path}: stored {stored}, expected {expected}")]
    SchemaMismatch {
        path: PathBuf,
        stored: String,
        expected: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    fn statement(sql: &str, source: rusqlite::Error) -> Self {
        tracing::debug!(statement = sql, error = %source, "sql failure");
        StoreError::Statement {
            statement: sql.trim().to_string(),
            source,
        }
    }

    /// Schema problems are not recoverable by retrying
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::SchemaHashMissing(_) | StoreError::SchemaMismatch { .. } | StoreError::SchemaFile { .. }
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// SQLite-backed store guarded by a schema hash
pub struct RelationalStore {
    conn: Connection,
    schema_hash: String,
}

impl RelationalStore {
    /// Open a database file against the schema in `schema_path`
    pub fn open(path: &Path, schema_path: &Path) -> StoreResult<Self> {
        let schema = std::fs::read_to_string(schema_path).map_err(|source| StoreError::SchemaFile {
            path: schema_path.to_path_buf(),
            source,
        })?;
        Self::open_with_schema(path, &schema)
    }

    /// Open a database file (creates and fills it if it doesn't exist).
    ///
    /// An existing file must carry the hash of `schema`; it is never
    /// modified when the check fails.
    pub fn open_with_schema(path: &Path, schema: &str) -> StoreResult<Self> {
        let need_fill = !path.exists();
        let hash = schema::schema_hash(schema);

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn, schema_hash: hash };

        if need_fill {
            tracing::info!("Creating database {}", path.display());
            if let Err(e) = store.fill(schema) {
                drop(store);
                let _ = std::fs::remove_file(path);
                return Err(e);
            }
        } else {
            store.check_hash(path)?;
        }

        store.apply_pragmas()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(schema: &str) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let store = Self {
            conn,
            schema_hash: schema::schema_hash(schema),
        };
        store.fill(schema)?;
        store.apply_pragmas()?;
        Ok(store)
    }

    fn fill(&self, schema: &str) -> StoreResult<()> {
        let tx = self.transaction()?;
        self.conn
            .execute_batch(schema)
            .map_err(|e| StoreError::statement(schema, e))?;
        self.execute(
            schema::INSERT_SCHEMA_HASH,
            named_params! { ":name": schema::SCHEMA_HASH_PROPERTY, ":value": self.schema_hash },
        )?;
        tx.commit().map_err(|e| StoreError::statement("COMMIT", e))
    }

    fn check_hash(&self, path: &Path) -> StoreResult<()> {
        // Not a registry database at all
        let property: Option<i64> = self.query_opt(schema::SELECT_PROPERTY_TABLE, &[], |row| row.get(0))?;
        if property.is_none() {
            return Err(StoreError::SchemaHashMissing(path.to_path_buf()));
        }

        let stored: Option<String> = self.query_opt(
            schema::SELECT_SCHEMA_HASH,
            named_params! { ":name": schema::SCHEMA_HASH_PROPERTY },
            |row| row.get(0),
        )?;

        match stored {
            None => Err(StoreError::SchemaHashMissing(path.to_path_buf())),
            Some(stored) if stored != self.schema_hash => Err(StoreError::SchemaMismatch {
                path: path.to_path_buf(),
                stored,
                expected: self.schema_hash.clone(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn apply_pragmas(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(schema::CONNECTION_PRAGMAS)
            .map_err(|e| StoreError::statement(schema::CONNECTION_PRAGMAS, e))
    }

    pub fn schema_hash(&self) -> &str {
        &self.schema_hash
    }

    // ========== Statement Operations ==========

    /// Execute a statement, returning the number of changed rows
    pub fn execute(&self, sql: &str, params: Params<'_>) -> StoreResult<usize> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| StoreError::statement(sql, e))?;
        stmt.execute(params).map_err(|e| StoreError::statement(sql, e))
    }

    /// Execute an insert, returning the new row id
    pub fn insert(&self, sql: &str, params: Params<'_>) -> StoreResult<ObjectId> {
        self.execute(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Read at most one row
    pub fn query_opt<T, F>(&self, sql: &str, params: Params<'_>, f: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| StoreError::statement(sql, e))?;
        stmt.query_row(params, f)
            .optional()
            .map_err(|e| StoreError::statement(sql, e))
    }

    /// Read every row, mapping each with `f`
    pub fn query_rows<T, F>(&self, sql: &str, params: Params<'_>, mut f: F) -> StoreResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| StoreError::statement(sql, e))?;
        let mut rows = stmt.query(params).map_err(|e| StoreError::statement(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| StoreError::statement(sql, e))? {
            out.push(f(row).map_err(|e| StoreError::statement(sql, e))?);
        }
        Ok(out)
    }

    /// Count rows of a table
    pub fn count(&self, table: &str) -> StoreResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: Option<i64> = self.query_opt(&sql, &[], |row| row.get(0))?;
        Ok(count.unwrap_or(0) as usize)
    }

    // ========== Transactions ==========

    /// Begin a transaction; it rolls back when dropped without `commit()`
    pub fn transaction(&self) -> StoreResult<Transaction<'_>> {
        self.conn
            .unchecked_transaction()
            .map_err(|e| StoreError::statement("BEGIN", e))
    }
}

/// Commit a transaction, keeping the store's error type
pub fn commit(tx: Transaction<'_>) -> StoreResult<()> {
    tx.commit().map_err(|e| StoreError::statement("COMMIT", e))
}
