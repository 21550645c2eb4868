//! TWAP observation log queries.
//!
//! Observations are append-only and keyed by their position in the asset's log.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tally_types::state::TwapObservation;
use tally_types::AssetId;

use super::{to_address, to_price};
use crate::Result;

/// Append an observation at position `seq`. Existing positions are kept.
pub fn append(conn: &Connection, asset: &AssetId, seq: usize, obs: &TwapObservation) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO twap_observations (asset, seq, price, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            asset.0.as_slice(),
            seq as i64,
            obs.price.to_string(),
            obs.timestamp as i64,
        ],
    )?;
    Ok(())
}

/// Every asset's full log.
pub fn all(conn: &Connection) -> Result<Vec<(AssetId, Vec<TwapObservation>)>> {
    let mut stmt = conn
        .prepare("SELECT asset, price, timestamp FROM twap_observations ORDER BY asset, seq")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut logs: BTreeMap<AssetId, Vec<TwapObservation>> = BTreeMap::new();
    for (asset, price, timestamp) in rows {
        logs.entry(to_address(&asset)?)
            .or_default()
            .push(TwapObservation {
                price: to_price(&price)?,
                timestamp,
            });
    }
    Ok(logs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Address;

    fn obs(price: u128, timestamp: u64) -> TwapObservation {
        TwapObservation { price, timestamp }
    }

    #[test]
    fn test_append_is_idempotent_per_position() {
        let conn = crate::open_memory().expect("open");
        let asset = Address::from_low_u8(1);
        append(&conn, &asset, 0, &obs(100, 10)).expect("append");
        append(&conn, &asset, 0, &obs(999, 10)).expect("ignored");
        append(&conn, &asset, 1, &obs(200, 20)).expect("append");

        assert_eq!(
            all(&conn).expect("all"),
            vec![(asset, vec![obs(100, 10), obs(200, 20)])]
        );
    }
}
