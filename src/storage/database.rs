//! SQLite database management with migrations
//!
//! Holds query history, term counters, user preferences, the shared cache
//! table, and the expert/taxonomy/works relations read by recommendation.

use crate::error::{Result, ScholarError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection handle
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file and bring the schema up to date
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScholarError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(16).build(manager)?;
        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Row counts for the main tables
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(DbStats {
            query_count: count("query_history")?,
            term_rows: count("term_frequencies")?,
            cache_entries: count("cache_entries")?,
            expert_count: count("experts")?,
            taxonomy_node_count: count("taxonomy_nodes")?,
            work_count: count("works")?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub query_count: usize,
    pub term_rows: usize,
    pub cache_entries: usize,
    pub expert_count: usize,
    pub taxonomy_node_count: usize,
    pub work_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: query history and derived signals
    r#"
    -- Append-only query log
    CREATE TABLE query_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query TEXT NOT NULL,
        normalized TEXT NOT NULL,
        scope TEXT,
        timestamp INTEGER NOT NULL,
        result_count INTEGER NOT NULL DEFAULT 0,
        search_type TEXT NOT NULL DEFAULT 'semantic'
    );

    CREATE INDEX idx_query_history_timestamp ON query_history(timestamp);
    CREATE INDEX idx_query_history_scope ON query_history(scope);
    CREATE INDEX idx_query_history_query ON query_history(query);
    CREATE INDEX idx_query_history_normalized ON query_history(normalized);

    -- Per-term counters bucketed by day; scope '' is the anonymous scope
    CREATE TABLE term_frequencies (
        term TEXT NOT NULL,
        scope TEXT NOT NULL DEFAULT '',
        day INTEGER NOT NULL,
        frequency INTEGER NOT NULL DEFAULT 0,
        last_updated INTEGER NOT NULL,
        PRIMARY KEY (term, scope, day)
    );

    CREATE INDEX idx_term_frequencies_day ON term_frequencies(day);

    CREATE TABLE user_preferences (
        user_id TEXT NOT NULL,
        tag TEXT NOT NULL,
        weight REAL NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, tag)
    );

    CREATE TABLE cache_entries (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );

    CREATE INDEX idx_cache_entries_expires ON cache_entries(expires_at);
    "#,
    // Migration 2: experts, taxonomy and works
    r#"
    CREATE TABLE experts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE taxonomy_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL CHECK (kind IN ('domain', 'field', 'skill')),
        name TEXT NOT NULL,
        UNIQUE (kind, name)
    );

    CREATE TABLE expert_taxonomy (
        expert_id TEXT NOT NULL,
        node_id INTEGER NOT NULL,
        PRIMARY KEY (expert_id, node_id),
        FOREIGN KEY (expert_id) REFERENCES experts(id) ON DELETE CASCADE,
        FOREIGN KEY (node_id) REFERENCES taxonomy_nodes(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_expert_taxonomy_node ON expert_taxonomy(node_id);

    CREATE TABLE works (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        publication_year INTEGER NOT NULL,
        citation_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE work_topics (
        work_id TEXT NOT NULL,
        topic TEXT NOT NULL,
        PRIMARY KEY (work_id, topic),
        FOREIGN KEY (work_id) REFERENCES works(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_work_topics_topic ON work_topics(topic);

    CREATE TABLE work_authors (
        work_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        PRIMARY KEY (work_id, author_id),
        FOREIGN KEY (work_id) REFERENCES works(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_work_authors_author ON work_authors(author_id);
    "#,
];
