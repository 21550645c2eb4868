//! Read-only query handlers. Queries work while the oracle is paused.

use std::sync::Arc;

use serde_json::Value;

use super::{param_address, param_price, param_u64, param_u64_or, unix_now, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Default page size for `list_assets`.
const DEFAULT_PAGE: u64 = 100;

pub async fn get_consensus(state: &Arc<DaemonState>, params: &Value) -> Result {
    let asset = param_address(params, "asset")?;
    let oracle = state.oracle.lock().await;
    let consensus = oracle.consensus(&asset);

    Ok(serde_json::json!({
        "asset": asset,
        "price": consensus.latest_price.to_string(),
        "last_update": consensus.last_update,
        "current_round": consensus.current_round,
        "stale": oracle.is_stale(&asset, unix_now()),
    }))
}

pub async fn is_stale(state: &Arc<DaemonState>, params: &Value) -> Result {
    let asset = param_address(params, "asset")?;
    let now = param_u64_or(params, "now", unix_now());
    let oracle = state.oracle.lock().await;
    Ok(serde_json::json!({ "stale": oracle.is_stale(&asset, now) }))
}

pub async fn get_twap(state: &Arc<DaemonState>, params: &Value) -> Result {
    let asset = param_address(params, "asset")?;
    let now = param_u64_or(params, "now", unix_now());
    let oracle = state.oracle.lock().await;

    Ok(serde_json::json!({
        "asset": asset,
        "twap": oracle.twap(&asset, now).to_string(),
        "window_secs": oracle.parameters().twap_window,
    }))
}

pub async fn verify_price(state: &Arc<DaemonState>, params: &Value) -> Result {
    let asset = param_address(params, "asset")?;
    let price = param_price(params, "price")?;
    let oracle = state.oracle.lock().await;
    let verification = oracle.verify_price(&asset, price);

    Ok(serde_json::json!({
        "within_tolerance": verification.within_tolerance,
        "deviation_bps": verification.deviation_bps.to_string(),
    }))
}

pub async fn list_assets(state: &Arc<DaemonState>, params: &Value) -> Result {
    let offset = usize::try_from(param_u64_or(params, "offset", 0))
        .map_err(|_| RpcError::invalid_params("offset out of range"))?;
    let limit = usize::try_from(param_u64_or(params, "limit", DEFAULT_PAGE))
        .map_err(|_| RpcError::invalid_params("limit out of range"))?;

    let oracle = state.oracle.lock().await;
    let assets = oracle.list_assets(offset, limit)?;
    serde_json::to_value(assets).map_err(|e| RpcError::internal_error(&e.to_string()))
}

pub async fn get_round(state: &Arc<DaemonState>, params: &Value) -> Result {
    let asset = param_address(params, "asset")?;
    let oracle = state.oracle.lock().await;
    let index = match params.get("round") {
        Some(_) => param_u64(params, "round")?,
        None => oracle.consensus(&asset).current_round,
    };

    let Some(round) = oracle.round(&asset, index) else {
        return Ok(Value::Null);
    };
    let submissions: Vec<Value> = round
        .submissions
        .iter()
        .map(|s| {
            serde_json::json!({
                "validator": s.validator,
                "price": s.price.to_string(),
            })
        })
        .collect();

    Ok(serde_json::json!({
        "asset": asset,
        "round": round.index,
        "finalized": round.finalized,
        "submissions": submissions,
    }))
}

pub async fn violation_count(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator = param_address(params, "validator")?;
    let oracle = state.oracle.lock().await;

    Ok(serde_json::json!({
        "validator": validator,
        "violations": oracle.violation_count(&validator),
        "suspended": oracle.is_suspended(&validator),
    }))
}

pub async fn get_parameters(state: &Arc<DaemonState>) -> Result {
    let oracle = state.oracle.lock().await;
    let params = oracle.parameters();
    let mut value =
        serde_json::to_value(params).map_err(|e| RpcError::internal_error(&e.to_string()))?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "effective_outlier_threshold_bps".to_string(),
            params.outlier_threshold().into(),
        );
    }
    Ok(value)
}

pub async fn is_paused(state: &Arc<DaemonState>) -> Result {
    let oracle = state.oracle.lock().await;
    Ok(serde_json::json!({ "paused": oracle.is_paused() }))
}

pub async fn get_pending_upgrade(state: &Arc<DaemonState>) -> Result {
    let oracle = state.oracle.lock().await;
    serde_json::to_value(oracle.pending_upgrade())
        .map_err(|e| RpcError::internal_error(&e.to_string()))
}

pub async fn get_implementation(state: &Arc<DaemonState>) -> Result {
    let oracle = state.oracle.lock().await;
    serde_json::to_value(oracle.implementation())
        .map_err(|e| RpcError::internal_error(&e.to_string()))
}

pub async fn get_daemon_status(state: &Arc<DaemonState>) -> Result {
    let oracle = state.oracle.lock().await;
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "paused": oracle.is_paused(),
        "active_assets": oracle.active_asset_count(),
        "validators": oracle.access().validator_count(),
        "event_sequence": state.event_bus.sequence(),
        "data_dir": state.config.data_dir().display().to_string(),
    }))
}
