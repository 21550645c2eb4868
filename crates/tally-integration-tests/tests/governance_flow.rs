//! Integration test: emergency pause, parameter governance and the upgrade
//! timelock, with state persisted between steps.

use tally_db::queries::settings;
use tally_db::state;
use tally_oracle::access::StaticAccess;
use tally_oracle::governor::{ParameterUpdate, UPGRADE_DELAY_SECS};
use tally_oracle::stub::StaticPriceSource;
use tally_oracle::{OracleError, PriceOracle};
use tally_types::events::OracleEvent;
use tally_types::governance::{ImplementationHandle, Parameters};
use tally_types::Address;

/// Simulated timestamp for deterministic testing.
const BASE_TIME: u64 = 1_700_000_000;

type Oracle = PriceOracle<StaticAccess, StaticPriceSource>;

fn admin() -> Address {
    Address::from_low_u8(0xaa)
}

fn access() -> StaticAccess {
    StaticAccess::new([admin()], (1..=5).map(Address::from_low_u8))
}

fn build_oracle() -> Oracle {
    PriceOracle::new(access(), StaticPriceSource::new(), Parameters::default())
        .expect("default parameters are valid")
}

fn implementation(n: u8) -> ImplementationHandle {
    ImplementationHandle {
        address: Address::from_low_u8(n),
        code_hash: [n; 32],
    }
}

#[tokio::test]
async fn pause_blocks_writes_and_persists() {
    let asset = Address::from_low_u8(0xa1);
    let mut oracle = build_oracle();
    let mut conn = tally_db::open_memory().expect("db");

    oracle
        .register_asset(&admin(), asset, BASE_TIME)
        .expect("register");
    oracle.pause(&admin()).expect("pause");
    oracle.pause(&admin()).expect("second pause is a no-op");

    let paused_events = oracle
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, OracleEvent::Paused))
        .count();
    assert_eq!(paused_events, 1);

    assert!(matches!(
        oracle.submit_price(&Address::from_low_u8(1), asset, 1000, BASE_TIME),
        Err(OracleError::Paused)
    ));
    assert!(matches!(
        oracle.register_asset(&admin(), Address::from_low_u8(0xa2), BASE_TIME),
        Err(OracleError::Paused)
    ));
    assert!(matches!(
        oracle.set_twap_window(&admin(), 3600),
        Err(OracleError::Paused)
    ));
    // reads keep working
    assert!(oracle.is_stale(&asset, BASE_TIME));
    assert_eq!(oracle.list_assets(0, 10).expect("list").len(), 1);

    state::save(&mut conn, &oracle.snapshot()).expect("save");
    assert!(settings::get_bool(&conn, settings::PAUSED, false).expect("paused flag"));

    let mut restored = PriceOracle::restore(
        access(),
        StaticPriceSource::new(),
        state::load(&conn).expect("load").expect("stored"),
    )
    .expect("restore");
    assert!(restored.is_paused());

    // only admins can resume
    assert!(matches!(
        restored.unpause(&Address::from_low_u8(1)),
        Err(OracleError::NotAdmin(_))
    ));
    restored.unpause(&admin()).expect("unpause");
    restored
        .submit_price(&Address::from_low_u8(1), asset, 1000, BASE_TIME)
        .expect("submissions resume");
}

#[tokio::test]
async fn parameter_updates_are_bounded() {
    let mut oracle = build_oracle();

    let next = oracle
        .update_parameters(
            &admin(),
            ParameterUpdate {
                consensus_tolerance_bps: 250,
                staleness_threshold: 900,
                ..Default::default()
            },
        )
        .expect("update");
    assert_eq!(next.consensus_tolerance_bps, 250);
    assert_eq!(next.staleness_threshold, 900);
    assert_eq!(next.min_validators, 5, "zero fields are left unchanged");

    // one bad field rejects the whole update
    let err = oracle
        .update_parameters(
            &admin(),
            ParameterUpdate {
                consensus_tolerance_bps: 100,
                circuit_breaker_bps: 2001,
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        OracleError::ParameterOutOfBounds { value: 2001, .. }
    ));
    assert_eq!(oracle.parameters().consensus_tolerance_bps, 250);

    assert!(matches!(
        oracle.update_parameters(
            &admin(),
            ParameterUpdate {
                min_validators: 4,
                ..Default::default()
            },
        ),
        Err(OracleError::ParameterOutOfBounds { .. })
    ));

    // the outlier threshold follows the circuit breaker until pinned
    assert_eq!(oracle.parameters().outlier_threshold(), 1000);
    oracle
        .update_parameters(
            &admin(),
            ParameterUpdate {
                circuit_breaker_bps: 1500,
                ..Default::default()
            },
        )
        .expect("widen breaker");
    assert_eq!(oracle.parameters().outlier_threshold(), 1500);
    oracle
        .set_outlier_threshold(&admin(), Some(400))
        .expect("pin outlier threshold");
    assert_eq!(oracle.parameters().outlier_threshold(), 400);

    let mut conn = tally_db::open_memory().expect("db");
    state::save(&mut conn, &oracle.snapshot()).expect("save");
    let stored = state::load(&conn).expect("load").expect("stored");
    assert_eq!(&stored.parameters, oracle.parameters());
}

#[tokio::test]
async fn upgrade_waits_for_timelock() {
    let mut oracle = build_oracle();
    let mut conn = tally_db::open_memory().expect("db");

    // targets without code are refused
    assert!(matches!(
        oracle.schedule_upgrade(
            &admin(),
            ImplementationHandle {
                address: Address::from_low_u8(0x10),
                code_hash: [0; 32],
            },
            BASE_TIME,
        ),
        Err(OracleError::NotExecutable(_))
    ));

    let pending = oracle
        .schedule_upgrade(&admin(), implementation(0x11), BASE_TIME)
        .expect("schedule");
    assert_eq!(pending.eta, BASE_TIME + UPGRADE_DELAY_SECS);

    assert!(matches!(
        oracle.schedule_upgrade(&admin(), implementation(0x12), BASE_TIME + 1),
        Err(OracleError::UpgradeAlreadyScheduled { eta }) if eta == pending.eta
    ));

    // the pending upgrade survives a restart
    state::save(&mut conn, &oracle.snapshot()).expect("save");
    let mut oracle = PriceOracle::restore(
        access(),
        StaticPriceSource::new(),
        state::load(&conn).expect("load").expect("stored"),
    )
    .expect("restore");
    assert_eq!(oracle.pending_upgrade(), Some(pending));

    assert!(matches!(
        oracle.apply_upgrade(&admin(), pending.eta - 1),
        Err(OracleError::TimelockNotElapsed { .. })
    ));

    // upgrades stay available while paused
    oracle.pause(&admin()).expect("pause");
    let applied = oracle
        .apply_upgrade(&admin(), pending.eta)
        .expect("apply at eta");
    assert_eq!(applied, implementation(0x11));
    assert_eq!(oracle.implementation(), Some(implementation(0x11)));
    assert_eq!(oracle.pending_upgrade(), None);

    assert!(matches!(
        oracle.cancel_upgrade(&admin()),
        Err(OracleError::NoUpgradeScheduled)
    ));
    oracle
        .schedule_upgrade(&admin(), implementation(0x12), pending.eta)
        .expect("schedule again");
    oracle.cancel_upgrade(&admin()).expect("cancel");

    let events: Vec<&'static str> = oracle.drain_events().iter().map(OracleEvent::name).collect();
    assert_eq!(
        events,
        vec![
            "Paused",
            "UpgradeApplied",
            "UpgradeScheduled",
            "UpgradeCancelled"
        ]
    );

    // only the records touched since the restart are written
    let delta = oracle.changes();
    assert!(delta.parameters.is_none());
    assert_eq!(delta.paused, Some(true));
    state::apply(&mut conn, &delta).expect("apply");
    oracle.mark_persisted();
    assert!(oracle.changes().is_empty());

    let stored = state::load(&conn).expect("load").expect("stored");
    assert!(stored.paused);
    assert_eq!(stored.implementation, Some(implementation(0x11)));
    assert_eq!(stored.pending_upgrade, None);
}
