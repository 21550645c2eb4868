//! Anchor and reference feed queries.

use rusqlite::Connection;
use tally_types::state::{AnchorState, ReferenceFeedConfig};
use tally_types::AssetId;

use super::{to_address, to_price};
use crate::Result;

pub fn upsert_anchor(conn: &Connection, asset: &AssetId, anchor: &AnchorState) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO anchors (asset, price, timestamp) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            asset.0.as_slice(),
            anchor.price.to_string(),
            anchor.timestamp as i64,
        ],
    )?;
    Ok(())
}

pub fn anchors(conn: &Connection) -> Result<Vec<(AssetId, AnchorState)>> {
    let mut stmt = conn.prepare("SELECT asset, price, timestamp FROM anchors ORDER BY asset")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(asset, price, timestamp)| {
            Ok((
                to_address(&asset)?,
                AnchorState {
                    price: to_price(&price)?,
                    timestamp,
                },
            ))
        })
        .collect()
}

pub fn upsert_feed(conn: &Connection, asset: &AssetId, feed: &ReferenceFeedConfig) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO reference_feeds (asset, source, source_decimals, enabled)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            asset.0.as_slice(),
            feed.source.0.as_slice(),
            feed.source_decimals,
            feed.enabled,
        ],
    )?;
    Ok(())
}

pub fn delete_feed(conn: &Connection, asset: &AssetId) -> Result<()> {
    conn.execute(
        "DELETE FROM reference_feeds WHERE asset = ?1",
        [asset.0.as_slice()],
    )?;
    Ok(())
}

pub fn feeds(conn: &Connection) -> Result<Vec<(AssetId, ReferenceFeedConfig)>> {
    let mut stmt = conn.prepare(
        "SELECT asset, source, source_decimals, enabled FROM reference_feeds ORDER BY asset",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(asset, source, source_decimals, enabled)| {
            Ok((
                to_address(&asset)?,
                ReferenceFeedConfig {
                    source: to_address(&source)?,
                    source_decimals,
                    enabled,
                },
            ))
        })
        .collect()
}
