//! Forward-only schema migrations.
//!
//! The schema version lives in `PRAGMA user_version`. Each step runs in its
//! own transaction together with the version bump, so an interrupted upgrade
//! leaves the file at the last completed version.

use rusqlite::Connection;

use crate::queries::settings;
use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// One schema step and the settings it seeds.
struct Migration {
    version: u32,
    sql: &'static str,
    seed: &'static [(&'static str, &'static str)],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: schema::SCHEMA_V1,
    seed: &[(settings::PAUSED, "false")],
}];

/// Stored schema version, `0` for a fresh file.
pub fn version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Apply every step newer than the stored version.
///
/// # Errors
///
/// - [`DbError::UnsupportedVersion`] if the file is newer than this build
pub fn run(conn: &mut Connection) -> Result<()> {
    let current = version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(DbError::UnsupportedVersion {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    for step in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(from = current, to = step.version, "migrating database schema");
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        for (key, value) in step.seed {
            tx.execute(
                "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, value],
            )?;
        }
        tx.pragma_update(None, "user_version", step.version)?;
        tx.commit()?;
    }
    Ok(())
}
