//! # tally-db
//!
//! SQLite persistence for the Tally oracle.
//! The daemon keeps a single database, [`DB_FILE`], in its data directory.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - Timestamps are Unix epoch seconds
//! - Prices are `u128` and stored as decimal TEXT
//! - Addresses are 20-byte BLOBs
//! - Schema version stored in `PRAGMA user_version`

pub mod migrations;
pub mod queries;
pub mod schema;
pub mod state;

use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "tally.db";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("data directory: {0}")]
    Io(#[from] std::io::Error),

    /// The file was written by a newer build.
    #[error("database schema v{found} is newer than supported v{supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// A stored value does not decode to its record type.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// A JSON-encoded setting failed to encode or decode.
    #[error("setting encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at `path`, migrating it to [`SCHEMA_VERSION`].
pub fn open(path: &Path) -> Result<Connection> {
    prepare(Connection::open(path)?)
}

/// Open [`DB_FILE`] inside `data_dir`, creating the directory if needed.
pub fn open_in(data_dir: &Path) -> Result<Connection> {
    std::fs::create_dir_all(data_dir)?;
    open(&data_dir.join(DB_FILE))
}

/// Open a migrated in-memory database.
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(mut conn: Connection) -> Result<Connection> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    migrations::run(&mut conn)?;
    Ok(conn)
}
