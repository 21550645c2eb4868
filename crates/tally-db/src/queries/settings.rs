//! Key/value settings: global parameters, pause flag and upgrade state.

use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

pub const PARAMETERS: &str = "parameters";
pub const PAUSED: &str = "paused";
pub const IMPLEMENTATION: &str = "implementation";
pub const PENDING_UPGRADE: &str = "pending_upgrade";

/// Get a setting value by key, `None` if unset.
pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?)
}

/// Set a setting value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
    Ok(())
}

/// Get a setting as a boolean, defaulting to `default` if unset.
pub fn get_bool(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    Ok(get(conn, key)?.map_or(default, |v| v == "true" || v == "1"))
}

/// Get a JSON-encoded setting, `None` if unset.
pub fn get_json<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>> {
    get(conn, key)?
        .map(|v| serde_json::from_str(&v))
        .transpose()
        .map_err(Into::into)
}

/// Store `value` as JSON, or remove the key for `None`.
pub fn set_json<T: Serialize>(conn: &Connection, key: &str, value: Option<&T>) -> Result<()> {
    match value {
        Some(value) => set(conn, key, &serde_json::to_string(value)?),
        None => delete(conn, key),
    }
}
