//! Per-asset consensus state queries.

use rusqlite::Connection;
use tally_types::state::ConsensusState;
use tally_types::AssetId;

use super::{to_address, to_price};
use crate::Result;

pub fn upsert(conn: &Connection, asset: &AssetId, state: &ConsensusState) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO consensus (asset, latest_price, last_update, current_round)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            asset.0.as_slice(),
            state.latest_price.to_string(),
            state.last_update as i64,
            state.current_round as i64,
        ],
    )?;
    Ok(())
}

pub fn all(conn: &Connection) -> Result<Vec<(AssetId, ConsensusState)>> {
    let mut stmt = conn.prepare(
        "SELECT asset, latest_price, last_update, current_round FROM consensus ORDER BY asset",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, i64>(3)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(asset, price, last_update, current_round)| {
            Ok((
                to_address(&asset)?,
                ConsensusState {
                    latest_price: to_price(&price)?,
                    last_update,
                    current_round,
                },
            ))
        })
        .collect()
}
