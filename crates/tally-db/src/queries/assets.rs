//! Asset registry queries.

use rusqlite::Connection;
use tally_types::state::TrackedAsset;

use super::to_address;
use crate::Result;

/// Insert or replace an asset at its registration position.
pub fn upsert(conn: &Connection, asset: &TrackedAsset, position: usize) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO assets (asset, active, registered_at, position)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            asset.id.0.as_slice(),
            asset.active,
            asset.registered_at as i64,
            position as i64,
        ],
    )?;
    Ok(())
}

/// All assets in registration order.
pub fn list(conn: &Connection) -> Result<Vec<TrackedAsset>> {
    let mut stmt =
        conn.prepare("SELECT asset, active, registered_at FROM assets ORDER BY position")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, active, registered_at)| {
            Ok(TrackedAsset {
                id: to_address(&id)?,
                active,
                registered_at,
            })
        })
        .collect()
}
