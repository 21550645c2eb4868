//! Whole-oracle persistence.
//!
//! [`save`] writes an [`OracleSnapshot`] in one transaction; [`load`] reads it
//! back. Mutable records (assets, consensus, anchors, feeds, violations) are
//! rewritten on every save. Rounds and TWAP observations only ever grow and
//! are upserted by key.
//!
//! [`apply`] writes a [`StateDelta`], touching only the records it names.
//! A full save is a checkpoint; steady-state writes go through `apply`.

use rusqlite::Connection;
use tally_types::governance::{ImplementationHandle, Parameters, PendingUpgrade};
use tally_types::state::{OracleSnapshot, StateDelta, UpgradeState};

use crate::queries::{assets, bounds, consensus, rounds, settings, twap, violations};
use crate::Result;

/// Persist `snapshot`, replacing whatever was stored before.
pub fn save(conn: &mut Connection, snapshot: &OracleSnapshot) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "DELETE FROM assets;
         DELETE FROM consensus;
         DELETE FROM anchors;
         DELETE FROM reference_feeds;
         DELETE FROM violations;",
    )?;

    for (position, asset) in snapshot.assets.iter().enumerate() {
        assets::upsert(&tx, asset, position)?;
    }
    for (asset, state) in &snapshot.consensus {
        consensus::upsert(&tx, asset, state)?;
    }
    for (asset, anchor) in &snapshot.anchors {
        bounds::upsert_anchor(&tx, asset, anchor)?;
    }
    for (asset, feed) in &snapshot.reference_feeds {
        bounds::upsert_feed(&tx, asset, feed)?;
    }
    for round in &snapshot.rounds {
        rounds::upsert(&tx, round)?;
    }
    for (asset, log) in &snapshot.observations {
        for (seq, obs) in log.iter().enumerate() {
            twap::append(&tx, asset, seq, obs)?;
        }
    }
    for (validator, count) in &snapshot.violations {
        violations::set(&tx, validator, *count)?;
    }

    settings::set_json(&tx, settings::PARAMETERS, Some(&snapshot.parameters))?;
    settings::set(&tx, settings::PAUSED, if snapshot.paused { "true" } else { "false" })?;
    settings::set_json(
        &tx,
        settings::IMPLEMENTATION,
        snapshot.implementation.as_ref(),
    )?;
    settings::set_json(
        &tx,
        settings::PENDING_UPGRADE,
        snapshot.pending_upgrade.as_ref(),
    )?;

    tx.commit()?;
    tracing::debug!(
        assets = snapshot.assets.len(),
        rounds = snapshot.rounds.len(),
        "oracle state saved"
    );
    Ok(())
}

/// Write the records named by `delta` in one transaction.
///
/// Nothing is written if any statement fails.
pub fn apply(conn: &mut Connection, delta: &StateDelta) -> Result<()> {
    if delta.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction()?;

    if let Some(parameters) = &delta.parameters {
        settings::set_json(&tx, settings::PARAMETERS, Some(parameters))?;
    }
    if let Some(paused) = delta.paused {
        settings::set(&tx, settings::PAUSED, if paused { "true" } else { "false" })?;
    }
    if let Some(UpgradeState {
        implementation,
        pending,
    }) = &delta.upgrades
    {
        settings::set_json(&tx, settings::IMPLEMENTATION, implementation.as_ref())?;
        settings::set_json(&tx, settings::PENDING_UPGRADE, pending.as_ref())?;
    }

    for (position, asset) in &delta.assets {
        assets::upsert(&tx, asset, *position)?;
    }
    for (asset, state) in &delta.consensus {
        consensus::upsert(&tx, asset, state)?;
    }
    for (asset, anchor) in &delta.anchors {
        bounds::upsert_anchor(&tx, asset, anchor)?;
    }
    for (asset, feed) in &delta.reference_feeds {
        match feed {
            Some(feed) => bounds::upsert_feed(&tx, asset, feed)?,
            None => bounds::delete_feed(&tx, asset)?,
        }
    }
    for round in &delta.rounds {
        rounds::upsert(&tx, round)?;
    }
    for (asset, seq, obs) in &delta.observations {
        twap::append(&tx, asset, *seq, obs)?;
    }
    for (validator, count) in &delta.violations {
        violations::set(&tx, validator, *count)?;
    }

    tx.commit()?;
    tracing::debug!(
        rounds = delta.rounds.len(),
        observations = delta.observations.len(),
        "oracle changes written"
    );
    Ok(())
}

/// Load the stored snapshot, or `None` if nothing was ever saved.
pub fn load(conn: &Connection) -> Result<Option<OracleSnapshot>> {
    let Some(parameters) = settings::get_json::<Parameters>(conn, settings::PARAMETERS)? else {
        return Ok(None);
    };

    let snapshot = OracleSnapshot {
        parameters,
        paused: settings::get_bool(conn, settings::PAUSED, false)?,
        assets: assets::list(conn)?,
        consensus: consensus::all(conn)?,
        anchors: bounds::anchors(conn)?,
        reference_feeds: bounds::feeds(conn)?,
        rounds: rounds::all(conn)?,
        observations: twap::all(conn)?,
        violations: violations::all(conn)?,
        implementation: settings::get_json::<ImplementationHandle>(
            conn,
            settings::IMPLEMENTATION,
        )?,
        pending_upgrade: settings::get_json::<PendingUpgrade>(conn, settings::PENDING_UPGRADE)?,
    };

    tracing::info!(
        assets = snapshot.assets.len(),
        rounds = snapshot.rounds.len(),
        paused = snapshot.paused,
        "oracle state loaded"
    );
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::state::{
        AnchorState, ConsensusState, ReferenceFeedConfig, RoundRecord, Submission, TrackedAsset,
        TwapObservation,
    };
    use tally_types::Address;

    fn addr(n: u8) -> Address {
        Address::from_low_u8(n)
    }

    fn sample() -> OracleSnapshot {
        let asset = addr(1);
        OracleSnapshot {
            parameters: Parameters {
                min_validators: 7,
                ..Parameters::default()
            },
            paused: true,
            assets: vec![
                TrackedAsset {
                    id: addr(2),
                    active: false,
                    registered_at: 5,
                },
                TrackedAsset {
                    id: asset,
                    active: true,
                    registered_at: 6,
                },
            ],
            consensus: vec![(
                asset,
                ConsensusState {
                    latest_price: 123_456_789_000,
                    last_update: 60,
                    current_round: 1,
                },
            )],
            anchors: vec![(
                asset,
                AnchorState {
                    price: 123_000_000_000,
                    timestamp: 30,
                },
            )],
            reference_feeds: vec![(
                asset,
                ReferenceFeedConfig {
                    source: addr(0xfe),
                    source_decimals: 18,
                    enabled: true,
                },
            )],
            rounds: vec![
                RoundRecord {
                    asset,
                    index: 0,
                    submissions: vec![
                        Submission {
                            validator: addr(11),
                            price: 123_456_789_000,
                        },
                        Submission {
                            validator: addr(10),
                            price: 123_456_789_001,
                        },
                    ],
                    finalized: true,
                },
                RoundRecord {
                    asset,
                    index: 1,
                    submissions: vec![Submission {
                        validator: addr(10),
                        price: 1,
                    }],
                    finalized: false,
                },
            ],
            observations: vec![(
                asset,
                vec![TwapObservation {
                    price: 123_456_789_000,
                    timestamp: 60,
                }],
            )],
            violations: vec![(addr(10), 3)],
            implementation: Some(ImplementationHandle {
                address: addr(0xc0),
                code_hash: [9; 32],
            }),
            pending_upgrade: Some(PendingUpgrade {
                implementation: ImplementationHandle {
                    address: addr(0xc1),
                    code_hash: [8; 32],
                },
                scheduled_at: 100,
                eta: 100 + 48 * 3600,
            }),
        }
    }

    #[test]
    fn test_load_empty_is_none() {
        let conn = crate::open_memory().expect("open");
        assert_eq!(load(&conn).expect("load"), None);
    }

    #[test]
    fn test_save_then_load() {
        let mut conn = crate::open_memory().expect("open");
        let snapshot = sample();
        save(&mut conn, &snapshot).expect("save");
        assert_eq!(load(&conn).expect("load"), Some(snapshot));
    }

    #[test]
    fn test_apply_writes_only_named_records() {
        let mut conn = crate::open_memory().expect("open");
        let mut snapshot = sample();
        save(&mut conn, &snapshot).expect("save");

        let asset = addr(1);
        let reopened = RoundRecord {
            asset,
            index: 1,
            submissions: vec![
                Submission {
                    validator: addr(10),
                    price: 1,
                },
                Submission {
                    validator: addr(11),
                    price: 3,
                },
            ],
            finalized: true,
        };
        let consensus = ConsensusState {
            latest_price: 2,
            last_update: 120,
            current_round: 2,
        };
        let observation = TwapObservation {
            price: 2,
            timestamp: 120,
        };
        let delta = StateDelta {
            paused: Some(false),
            upgrades: Some(UpgradeState {
                implementation: snapshot.implementation,
                pending: None,
            }),
            consensus: vec![(asset, consensus)],
            reference_feeds: vec![(asset, None)],
            rounds: vec![reopened.clone()],
            observations: vec![(asset, 1, observation)],
            ..StateDelta::default()
        };
        apply(&mut conn, &delta).expect("apply");

        snapshot.paused = false;
        snapshot.pending_upgrade = None;
        snapshot.consensus = vec![(asset, consensus)];
        snapshot.reference_feeds.clear();
        snapshot.rounds[1] = reopened;
        snapshot.observations[0].1.push(observation);
        assert_eq!(load(&conn).expect("load"), Some(snapshot));
    }

    #[test]
    fn test_failed_apply_writes_nothing() {
        let mut conn = crate::open_memory().expect("open");
        save(&mut conn, &sample()).expect("save");
        conn.execute_batch("DROP TABLE violations").expect("drop");

        // the pause flag is written before the violation counter fails
        let delta = StateDelta {
            paused: Some(false),
            violations: vec![(addr(10), 4)],
            ..StateDelta::default()
        };
        assert!(apply(&mut conn, &delta).is_err());
        assert!(settings::get_bool(&conn, settings::PAUSED, false).expect("paused"));
    }

    #[test]
    fn test_second_save_replaces_mutable_records() {
        let mut conn = crate::open_memory().expect("open");
        let mut snapshot = sample();
        save(&mut conn, &snapshot).expect("save");

        snapshot.paused = false;
        snapshot.reference_feeds.clear();
        snapshot.pending_upgrade = None;
        snapshot.violations = vec![(addr(10), 4)];
        snapshot.rounds[1].submissions.push(Submission {
            validator: addr(11),
            price: 2,
        });
        snapshot.observations[0].1.push(TwapObservation {
            price: 5,
            timestamp: 90,
        });
        save(&mut conn, &snapshot).expect("save again");

        assert_eq!(load(&conn).expect("load"), Some(snapshot));
    }
}
