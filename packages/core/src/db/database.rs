//! Database Connection Management
//!
//! This module provides the core database connection and initialization
//! functionality using libsql for the tree engine's two relations.
//!
//! # Architecture
//!
//! - **Path-agnostic**: accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging so readers never block the writer
//! - **Foreign keys**: enabled for referential integrity on parent pointers
//! - **Single writer**: SQLite admits one write transaction at a time, which
//!   is what serializes conflicting subtree moves (see `NodeService`)
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async functions. The 5-second busy
//! timeout makes concurrent operations wait and retry instead of failing
//! immediately with `SQLITE_BUSY` when another writer holds the lock.
//!
//! ```no_run
//! # use canopy_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/tree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
///
/// Owns the two relations of the engine:
///
/// - `nodes` - the primary table: one row per node with its current parent
///   and root; the single authority for "current parent"
/// - `closure` - the transitive-closure relation: one row per
///   (ancestor, descendant) pair that currently holds, including a depth-0
///   self-edge for every node, with the descendant's parent and root
///   denormalized for filtering without a join back to `nodes`
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Enable SQLite features (WAL mode, foreign keys, busy timeout)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        // Only checkpoint the WAL for brand new database files
        let is_new_database = !db_path.exists();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Get a connection to the database
    ///
    /// Prefer [`Self::connect_with_timeout`] in async contexts.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with the busy timeout configured
    ///
    /// Sets a 5-second busy timeout so concurrent operations wait and retry
    /// instead of failing immediately when another transaction holds the
    /// write lock. This is the safe default for async contexts where the
    /// Tokio runtime moves futures between threads.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        Ok(conn)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of
    /// execute(). This helper encapsulates that pattern.
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Creates tables and indexes using CREATE TABLE IF NOT EXISTS,
    /// ensuring idempotent initialization (safe to call multiple times).
    ///
    /// # Schema
    ///
    /// - `nodes` table: primary tree storage (id, parent_id, root_id)
    /// - `closure` table: one row per transitively held (ancestor, descendant)
    ///   pair with depth and denormalized parent/root of the descendant
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        // Enable WAL mode for better concurrency
        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        // Enable foreign key constraints
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                parent_id TEXT,
                root_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                modified_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (parent_id) REFERENCES nodes(id)
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create nodes table: {}", e))
        })?;

        // One row per (ancestor, descendant) pair that currently holds.
        // parent_id/root_id are the descendant's current parent and root.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS closure (
                ancestor TEXT NOT NULL,
                descendant TEXT NOT NULL,
                depth INTEGER NOT NULL,
                parent_id TEXT,
                root_id TEXT NOT NULL,
                PRIMARY KEY (ancestor, descendant)
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create closure table: {}", e))
        })?;

        self.create_core_indexes(&conn).await?;

        // Flush the schema to disk for newly created databases so rapid
        // open/close cycles in tests never observe "no such table".
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create core indexes for the two tables
    ///
    /// The (ancestor, descendant) primary key already serves the ancestor
    /// test and the "descendants of" scan; these cover the reverse lookups
    /// used by height computation and the detach/reattach joins.
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        // Index on parent_id (hierarchy queries)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_nodes_parent': {}",
                e
            ))
        })?;

        // Index on root_id (per-tree filtering)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_root ON nodes(root_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create index 'idx_nodes_root': {}", e))
        })?;

        // Index on descendant (path-to-root reads, detach join)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_closure_descendant ON closure(descendant)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_closure_descendant': {}",
                e
            ))
        })?;

        // Index on denormalized parent (filtering without joining nodes)
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_closure_parent ON closure(parent_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create index 'idx_closure_parent': {}",
                e
            ))
        })?;

        Ok(())
    }
}
