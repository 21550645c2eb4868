//! tally-daemon: hosts the price oracle behind a JSON-RPC Unix socket.
//!
//! One Tokio runtime, one oracle behind one mutex. Every mutating call runs
//! to completion under the lock, writes the records it changed to SQLite and
//! publishes the oracle's events before the lock is released. A failed write
//! rolls the oracle back instead.

mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;

use anyhow::Context;
use tally_oracle::access::StaticAccess;
use tally_oracle::stub::StaticPriceSource;
use tally_oracle::PriceOracle;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// The oracle as hosted by the daemon.
pub type Oracle = PriceOracle<StaticAccess, StaticPriceSource>;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// The oracle. Lock before `db` when both are needed.
    pub oracle: Mutex<Oracle>,
    pub db: Mutex<rusqlite::Connection>,
    pub config: DaemonConfig,
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    pub fn new(config: DaemonConfig, oracle: Oracle, db: rusqlite::Connection) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            oracle: Mutex::new(oracle),
            db: Mutex::new(db),
            event_bus: EventBus::new(config.advanced.event_buffer),
            config,
            shutdown_tx,
        }
    }
}

/// Build the oracle from stored state, or from config on first start.
///
/// A first start writes a full checkpoint, which later incremental writes
/// build on.
fn build_oracle(config: &DaemonConfig, db: &mut rusqlite::Connection) -> anyhow::Result<Oracle> {
    let access = config.access.to_access()?;
    let sources = config.price_source(commands::unix_now())?;

    match tally_db::state::load(db)? {
        Some(snapshot) => {
            info!("Restoring oracle from database");
            PriceOracle::restore(access, sources, snapshot).context("restoring oracle state")
        }
        None => {
            info!("No stored state, starting from config parameters");
            let oracle = PriceOracle::new(access, sources, config.oracle.to_parameters())
                .context("invalid [oracle] parameters")?;
            tally_db::state::save(db, &oracle.snapshot()).context("writing initial state")?;
            Ok(oracle)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config (before logging, which reads its level from it)
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tally={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("Tally daemon starting");

    // 2. Open database
    let data_dir = config.data_dir();
    let mut conn = tally_db::open_in(&data_dir)?;

    // 3. Build oracle
    let oracle = build_oracle(&config, &mut conn)?;
    {
        let params = oracle.parameters();
        info!(
            min_validators = params.min_validators,
            circuit_breaker_bps = params.circuit_breaker_bps,
            paused = oracle.is_paused(),
            "oracle ready"
        );
    }

    // 4. Build daemon state
    let state = Arc::new(DaemonState::new(config, oracle, conn));

    // 5. Start IPC server
    let socket_path = data_dir.join("tally.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    // 6. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    info!("Daemon shutting down gracefully");

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{dispatch_request, RpcRequest};
    use serde_json::{json, Value};
    use tally_types::Address;

    fn hex(n: u8) -> String {
        Address::from_low_u8(n).to_string()
    }

    fn test_config() -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.access.admins = vec![hex(0xaa)];
        config.access.validators = (1..=6).map(hex).collect();
        config
    }

    fn test_state() -> Arc<DaemonState> {
        let config = test_config();
        let mut conn = tally_db::open_memory().expect("db");
        let oracle = build_oracle(&config, &mut conn).expect("oracle");
        Arc::new(DaemonState::new(config, oracle, conn))
    }

    async fn call(state: &Arc<DaemonState>, method: &str, params: Value) -> Result<Value, i32> {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        };
        let response = dispatch_request(state.clone(), request).await;
        match (response.result, response.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => Err(error.code),
            (None, None) => Err(0),
        }
    }

    #[tokio::test]
    async fn test_consensus_over_rpc_is_persisted() {
        let state = test_state();
        let mut events = state.event_bus.subscribe();
        let asset = hex(0xa1);

        call(&state, "register_asset", json!({"caller": hex(0xaa), "asset": asset}))
            .await
            .expect("register");

        let prices = ["950", "1050", "1000", "1000", "1050"];
        let mut last = Value::Null;
        for (i, price) in prices.iter().enumerate() {
            last = call(
                &state,
                "submit_price",
                json!({"caller": hex(i as u8 + 1), "asset": asset, "price": price}),
            )
            .await
            .expect("submit");
        }
        assert_eq!(last["consensus"], "1000");

        let consensus = call(&state, "get_consensus", json!({"asset": asset}))
            .await
            .expect("consensus");
        assert_eq!(consensus["price"], "1000");
        assert_eq!(consensus["current_round"], 1);

        let db = state.db.lock().await;
        let stored = tally_db::state::load(&db).expect("load").expect("saved");
        assert_eq!(stored.consensus[0].1.latest_price, 1000);

        let first = events.try_recv().expect("event");
        assert_eq!(first.event_type, "AssetRegistered");
        assert_eq!(first.sequence, 1);
    }

    #[tokio::test]
    async fn test_rejections_map_to_codes() {
        let state = test_state();
        let asset = hex(0xa1);

        assert_eq!(
            call(&state, "register_asset", json!({"caller": hex(1), "asset": asset})).await,
            Err(-32010)
        );
        assert_eq!(
            call(&state, "submit_price", json!({"caller": hex(1), "asset": asset, "price": 5}))
                .await,
            Err(-32022)
        );
        assert_eq!(
            call(&state, "submit_price", json!({"caller": hex(0x77), "asset": asset, "price": 5}))
                .await,
            Err(-32011)
        );
        assert_eq!(call(&state, "no_such_method", Value::Null).await, Err(-32601));
        assert_eq!(
            call(&state, "submit_price", json!({"caller": "zz", "asset": asset})).await,
            Err(-32602)
        );
    }

    #[tokio::test]
    async fn test_pause_gates_mutations_only() {
        let state = test_state();
        let admin = hex(0xaa);
        let asset = hex(0xa1);

        call(&state, "pause", json!({"caller": admin})).await.expect("pause");
        assert_eq!(
            call(&state, "register_asset", json!({"caller": admin, "asset": asset})).await,
            Err(-32001)
        );
        let paused = call(&state, "is_paused", Value::Null).await.expect("query");
        assert_eq!(paused["paused"], true);
        let verify = call(&state, "verify_price", json!({"asset": asset, "price": 1}))
            .await
            .expect("query while paused");
        assert_eq!(verify["within_tolerance"], false);
        assert_eq!(verify["deviation_bps"], "10000");

        call(&state, "unpause", json!({"caller": admin})).await.expect("unpause");
        call(&state, "register_asset", json!({"caller": admin, "asset": asset}))
            .await
            .expect("register after unpause");
    }

    #[tokio::test]
    async fn test_batch_and_parameters() {
        let state = test_state();
        let admin = hex(0xaa);
        let (a, b) = (hex(0xa1), hex(0xa2));
        for asset in [&a, &b] {
            call(&state, "register_asset", json!({"caller": admin, "asset": asset}))
                .await
                .expect("register");
        }

        let report = call(
            &state,
            "submit_price_batch",
            json!({"caller": hex(1), "assets": [a, b, hex(0xb0)], "prices": ["100", 0, "5"]}),
        )
        .await
        .expect("batch");
        assert_eq!(report["accepted"].as_array().map(Vec::len), Some(1));
        assert_eq!(report["skipped"][0]["reason"], "invalid_price");
        assert_eq!(report["skipped"][1]["reason"], "asset_not_registered");

        assert_eq!(
            call(
                &state,
                "submit_price_batch",
                json!({"caller": hex(1), "assets": [a, b], "prices": ["1"]}),
            )
            .await,
            Err(-32026)
        );

        let params = call(
            &state,
            "update_parameters",
            json!({"caller": admin, "min_validators": 6}),
        )
        .await
        .expect("update");
        assert_eq!(params["min_validators"], 6);
        assert_eq!(
            call(&state, "set_twap_window", json!({"caller": admin, "window_secs": 10})).await,
            Err(-32040)
        );
        let params = call(&state, "get_parameters", Value::Null).await.expect("params");
        assert_eq!(params["effective_outlier_threshold_bps"], 1000);
    }

    #[tokio::test]
    async fn test_feed_reading_and_validators() {
        let state = test_state();
        let admin = hex(0xaa);
        let asset = hex(0xa1);
        let source = hex(0xfe);

        call(&state, "register_asset", json!({"caller": admin, "asset": asset}))
            .await
            .expect("register");
        call(
            &state,
            "set_reference_feed",
            json!({"caller": admin, "asset": asset, "source": source, "decimals": 8}),
        )
        .await
        .expect("feed");
        call(
            &state,
            "set_feed_reading",
            json!({"caller": admin, "source": source, "answer": 1000, "decimals": 8}),
        )
        .await
        .expect("reading");

        assert_eq!(
            call(&state, "submit_price", json!({"caller": hex(1), "asset": asset, "price": 1100}))
                .await,
            Err(-32033)
        );

        let new_validator = hex(0x40);
        call(&state, "add_validator", json!({"caller": admin, "validator": new_validator}))
            .await
            .expect("add");
        call(
            &state,
            "submit_price",
            json!({"caller": new_validator, "asset": asset, "price": 1000}),
        )
        .await
        .expect("new validator submits");
        call(&state, "remove_validator", json!({"caller": admin, "validator": new_validator}))
            .await
            .expect("remove");
        assert_eq!(
            call(
                &state,
                "submit_price",
                json!({"caller": new_validator, "asset": asset, "price": 1000}),
            )
            .await,
            Err(-32011)
        );
    }

    async fn submit_round(state: &Arc<DaemonState>, asset: &str, prices: &[&str]) -> Value {
        let mut last = Value::Null;
        for (i, price) in prices.iter().enumerate() {
            last = call(
                state,
                "submit_price",
                json!({"caller": hex(i as u8 + 1), "asset": asset, "price": price}),
            )
            .await
            .expect("submit");
        }
        last
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_and_retry_succeeds() {
        let state = test_state();
        let asset = hex(0xa1);
        call(&state, "register_asset", json!({"caller": hex(0xaa), "asset": asset}))
            .await
            .expect("register");
        submit_round(&state, &asset, &["1000", "1000", "1000", "1000"]).await;
        let mut events = state.event_bus.subscribe();

        state
            .db
            .lock()
            .await
            .execute_batch("PRAGMA query_only = ON")
            .expect("read-only");
        let quorum = json!({"caller": hex(5), "asset": asset, "price": "1000"});
        assert_eq!(call(&state, "submit_price", quorum.clone()).await, Err(-32603));

        // nothing of the failed submission is visible
        let round = call(&state, "get_round", json!({"asset": asset})).await.expect("round");
        assert_eq!(round["round"], 0);
        assert_eq!(round["finalized"], false);
        assert_eq!(round["submissions"].as_array().map(Vec::len), Some(4));
        let consensus = call(&state, "get_consensus", json!({"asset": asset}))
            .await
            .expect("consensus");
        assert_eq!(consensus["price"], "0");
        assert!(events.try_recv().is_err(), "no event for an unpersisted change");

        state
            .db
            .lock()
            .await
            .execute_batch("PRAGMA query_only = OFF")
            .expect("writable");
        let receipt = call(&state, "submit_price", quorum).await.expect("retry");
        assert_eq!(receipt["consensus"], "1000");

        let delivered: Vec<String> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event_type)
            .collect();
        assert_eq!(delivered, vec!["PriceSubmitted", "ConsensusReached"]);

        let db = state.db.lock().await;
        let stored = tally_db::state::load(&db).expect("load").expect("saved");
        assert_eq!(stored.consensus[0].1.latest_price, 1000);
        assert_eq!(stored.rounds[0].submissions.len(), 5);
    }

    #[tokio::test]
    async fn test_lowered_quorum_finalizes_open_round_on_next_submission() {
        let state = test_state();
        let admin = hex(0xaa);
        let asset = hex(0xa1);
        call(&state, "register_asset", json!({"caller": admin, "asset": asset}))
            .await
            .expect("register");
        call(&state, "update_parameters", json!({"caller": admin, "min_validators": 6}))
            .await
            .expect("raise quorum");

        let last = submit_round(&state, &asset, &["1000", "1010", "990", "1005", "995"]).await;
        assert_eq!(last["consensus"], Value::Null);

        call(&state, "update_parameters", json!({"caller": admin, "min_validators": 5}))
            .await
            .expect("lower quorum");
        // the open round already holds the new quorum but stays open
        let round = call(&state, "get_round", json!({"asset": asset})).await.expect("round");
        assert_eq!(round["finalized"], false);
        assert_eq!(round["submissions"].as_array().map(Vec::len), Some(5));

        let receipt = call(
            &state,
            "submit_price",
            json!({"caller": hex(6), "asset": asset, "price": "1020"}),
        )
        .await
        .expect("sixth submission");
        // [990, 995, 1000, 1005, 1010, 1020] -> floor((1000 + 1005) / 2)
        assert_eq!(receipt["consensus"], "1002");
        assert_eq!(receipt["submissions"], 6);

        let round = call(&state, "get_round", json!({"asset": asset, "round": 0}))
            .await
            .expect("round 0");
        assert_eq!(round["finalized"], true);
        let db = state.db.lock().await;
        let stored = tally_db::state::load(&db).expect("load").expect("saved");
        assert_eq!(stored.parameters.min_validators, 5);
        assert_eq!(stored.consensus[0].1.current_round, 1);
    }

    #[tokio::test]
    async fn test_restart_restores_state() {
        let config = test_config();
        let mut conn = tally_db::open_memory().expect("db");

        let mut oracle = build_oracle(&config, &mut conn).expect("oracle");
        let admin = Address::from_low_u8(0xaa);
        oracle
            .register_asset(&admin, Address::from_low_u8(0xa1), 10)
            .expect("register");
        oracle.pause(&admin).expect("pause");
        tally_db::state::apply(&mut conn, &oracle.changes()).expect("apply");

        let restored = build_oracle(&config, &mut conn).expect("restore");
        assert!(restored.is_paused());
        assert!(restored.is_registered(&Address::from_low_u8(0xa1)));
    }
}
