//! Validator violation counters.

use rusqlite::Connection;
use tally_types::ValidatorId;

use super::to_address;
use crate::Result;

pub fn set(conn: &Connection, validator: &ValidatorId, count: u32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO violations (validator, count) VALUES (?1, ?2)",
        rusqlite::params![validator.0.as_slice(), count],
    )?;
    Ok(())
}

pub fn all(conn: &Connection) -> Result<Vec<(ValidatorId, u32)>> {
    let mut stmt = conn.prepare("SELECT validator, count FROM violations ORDER BY validator")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, u32>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(validator, count)| Ok((to_address(&validator)?, count)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Address;

    #[test]
    fn test_set_overwrites() {
        let conn = crate::open_memory().expect("open");
        let v = Address::from_low_u8(3);
        set(&conn, &v, 1).expect("set");
        set(&conn, &v, 2).expect("set");
        assert_eq!(all(&conn).expect("all"), vec![(v, 2)]);
    }
}
