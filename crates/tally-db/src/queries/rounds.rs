//! Round and submission queries.
//!
//! Submissions are append-only within a round; the `seq` column preserves
//! arrival order.

use rusqlite::Connection;
use tally_types::state::{RoundRecord, Submission};
use tally_types::{AssetId, RoundIndex};

use super::{to_address, to_price};
use crate::Result;

/// Write a round, updating its finalized flag and appending new submissions.
pub fn upsert(conn: &Connection, round: &RoundRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO rounds (asset, round_index, finalized) VALUES (?1, ?2, ?3)
         ON CONFLICT (asset, round_index) DO UPDATE SET finalized = excluded.finalized",
        rusqlite::params![round.asset.0.as_slice(), round.index as i64, round.finalized],
    )?;

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO round_submissions (asset, round_index, seq, validator, price)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (seq, submission) in round.submissions.iter().enumerate() {
        stmt.execute(rusqlite::params![
            round.asset.0.as_slice(),
            round.index as i64,
            seq as i64,
            submission.validator.0.as_slice(),
            submission.price.to_string(),
        ])?;
    }
    Ok(())
}

fn submissions(conn: &Connection, asset: &AssetId, index: RoundIndex) -> Result<Vec<Submission>> {
    let mut stmt = conn.prepare(
        "SELECT validator, price FROM round_submissions
         WHERE asset = ?1 AND round_index = ?2 ORDER BY seq",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![asset.0.as_slice(), index as i64], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(validator, price)| {
            Ok(Submission {
                validator: to_address(&validator)?,
                price: to_price(&price)?,
            })
        })
        .collect()
}

/// Every round, ordered by asset then index.
pub fn all(conn: &Connection) -> Result<Vec<RoundRecord>> {
    let mut stmt =
        conn.prepare("SELECT asset, round_index, finalized FROM rounds ORDER BY asset, round_index")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, bool>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(asset, index, finalized)| {
            let asset = to_address(&asset)?;
            Ok(RoundRecord {
                asset,
                index,
                submissions: submissions(conn, &asset, index)?,
                finalized,
            })
        })
        .collect()
}
