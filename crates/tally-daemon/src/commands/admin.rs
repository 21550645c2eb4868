//! Administrative command handlers.
//!
//! Every handler takes the oracle lock, applies one mutation and commits
//! (persist + publish events) before answering.

use std::sync::Arc;

use serde_json::Value;
use tally_oracle::access::AccessControl;
use tally_oracle::governor::ParameterUpdate;
use tally_oracle::reference::FeedReading;
use tally_oracle::OracleError;
use tally_types::governance::{ImplementationHandle, Parameters};
use tally_types::state::ReferenceFeedConfig;
use tally_types::Address;
use tracing::info;

use super::{
    commit, param_address, param_caller, param_u32, param_u64, param_u64_or, unix_now, Result,
};
use crate::rpc::RpcError;
use crate::{DaemonState, Oracle};

fn parameters_json(params: &Parameters) -> Result {
    serde_json::to_value(params).map_err(|e| RpcError::internal_error(&e.to_string()))
}

fn ensure_admin(oracle: &Oracle, caller: &Address) -> std::result::Result<(), RpcError> {
    if !oracle.access().is_admin(caller) {
        return Err(OracleError::NotAdmin(*caller).into());
    }
    Ok(())
}

/// Register an asset for tracking.
pub async fn register_asset(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let asset = param_address(params, "asset")?;

    let mut oracle = state.oracle.lock().await;
    oracle.register_asset(&caller, asset, unix_now())?;
    commit(state, &mut oracle).await?;

    Ok(serde_json::json!({ "asset": asset, "active": true }))
}

pub async fn deregister_asset(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let asset = param_address(params, "asset")?;

    let mut oracle = state.oracle.lock().await;
    oracle.deregister_asset(&caller, asset)?;
    commit(state, &mut oracle).await?;

    Ok(serde_json::json!({ "asset": asset, "active": false }))
}

/// Batch parameter update. Omitted or zero fields are left unchanged.
pub async fn update_parameters(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let update: ParameterUpdate = serde_json::from_value(params.clone())
        .map_err(|e| RpcError::invalid_params(&e.to_string()))?;

    let mut oracle = state.oracle.lock().await;
    let next = oracle.update_parameters(&caller, update)?;
    commit(state, &mut oracle).await?;

    parameters_json(&next)
}

pub async fn set_reference_deviation_threshold(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let bps = param_u32(params, "bps")?;

    let mut oracle = state.oracle.lock().await;
    let next = oracle.set_reference_deviation_threshold(&caller, bps)?;
    commit(state, &mut oracle).await?;

    parameters_json(&next)
}

pub async fn set_twap_window(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let window = param_u64(params, "window_secs")?;

    let mut oracle = state.oracle.lock().await;
    let next = oracle.set_twap_window(&caller, window)?;
    commit(state, &mut oracle).await?;

    parameters_json(&next)
}

/// Set the outlier threshold; a null or missing `bps` tracks the circuit breaker.
pub async fn set_outlier_threshold(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let bps = match params.get("bps") {
        None | Some(Value::Null) => None,
        Some(_) => Some(param_u32(params, "bps")?),
    };

    let mut oracle = state.oracle.lock().await;
    let next = oracle.set_outlier_threshold(&caller, bps)?;
    commit(state, &mut oracle).await?;

    parameters_json(&next)
}

pub async fn set_suspension_threshold(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let violations = param_u32(params, "violations")?;

    let mut oracle = state.oracle.lock().await;
    let next = oracle.set_suspension_threshold(&caller, violations)?;
    commit(state, &mut oracle).await?;

    parameters_json(&next)
}

/// Bind a reference source to an asset.
pub async fn set_reference_feed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let asset = param_address(params, "asset")?;
    let source = param_address(params, "source")?;
    let decimals = u8::try_from(param_u64(params, "decimals")?)
        .map_err(|_| RpcError::invalid_params("decimals out of range"))?;
    let enabled = params
        .get("enabled")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let config = ReferenceFeedConfig {
        source,
        source_decimals: decimals,
        enabled,
    };

    let mut oracle = state.oracle.lock().await;
    oracle.set_reference_feed(&caller, asset, config)?;
    commit(state, &mut oracle).await?;

    Ok(serde_json::json!({
        "asset": asset,
        "source": source,
        "decimals": decimals,
        "enabled": enabled,
    }))
}

pub async fn clear_reference_feed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let asset = param_address(params, "asset")?;

    let mut oracle = state.oracle.lock().await;
    oracle.clear_reference_feed(&caller, asset)?;
    commit(state, &mut oracle).await?;

    Ok(serde_json::json!({ "asset": asset }))
}

/// Replace the static reading of a reference source, or force it to fail.
///
/// Readings live in memory only; `[[feeds]]` in the config seeds them at
/// startup.
pub async fn set_feed_reading(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let source = param_address(params, "source")?;

    let mut oracle = state.oracle.lock().await;
    ensure_admin(&oracle, &caller)?;

    if let Some(reason) = params.get("fail").and_then(|v| v.as_str()) {
        oracle.sources_mut().fail_source(source, reason);
        return Ok(serde_json::json!({ "source": source, "failing": true }));
    }

    let answer: i128 = match params.get("answer") {
        Some(Value::String(s)) => s
            .parse()
            .map_err(|e| RpcError::invalid_params(&format!("answer: {e}")))?,
        Some(v) => v
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| RpcError::invalid_params("answer: expected integer"))?,
        None => return Err(RpcError::invalid_params("answer required")),
    };
    let decimals = u8::try_from(param_u64(params, "decimals")?)
        .map_err(|_| RpcError::invalid_params("decimals out of range"))?;
    let updated_at = param_u64_or(params, "updated_at", unix_now());

    oracle.sources_mut().set_reading(
        source,
        FeedReading {
            answer,
            decimals,
            updated_at,
        },
    );

    Ok(serde_json::json!({
        "source": source,
        "answer": answer.to_string(),
        "decimals": decimals,
        "updated_at": updated_at,
    }))
}

/// Grant the validator role. Role changes are not persisted; restarts
/// reload `[access]` from the config.
pub async fn add_validator(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let validator = param_address(params, "validator")?;

    let mut oracle = state.oracle.lock().await;
    ensure_admin(&oracle, &caller)?;
    oracle.access_mut().add_validator(validator);
    info!(validator = %validator, "validator added");

    Ok(serde_json::json!({
        "validator": validator,
        "validators": oracle.access().validator_count(),
    }))
}

pub async fn remove_validator(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let validator = param_address(params, "validator")?;

    let mut oracle = state.oracle.lock().await;
    ensure_admin(&oracle, &caller)?;
    oracle.access_mut().remove_validator(&validator);
    info!(validator = %validator, "validator removed");

    Ok(serde_json::json!({
        "validator": validator,
        "validators": oracle.access().validator_count(),
    }))
}

pub async fn pause(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;

    let mut oracle = state.oracle.lock().await;
    oracle.pause(&caller)?;
    commit(state, &mut oracle).await?;

    Ok(serde_json::json!({ "paused": true }))
}

pub async fn unpause(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;

    let mut oracle = state.oracle.lock().await;
    oracle.unpause(&caller)?;
    commit(state, &mut oracle).await?;

    Ok(serde_json::json!({ "paused": false }))
}

/// Schedule an upgrade; `code_hash` is 32 bytes of hex.
pub async fn schedule_upgrade(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;
    let address = param_address(params, "implementation")?;
    let code_hash_hex = params
        .get("code_hash")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("code_hash required"))?;
    let code_hash: [u8; 32] = hex::decode(code_hash_hex.strip_prefix("0x").unwrap_or(code_hash_hex))
        .map_err(|e| RpcError::invalid_params(&format!("code_hash: {e}")))?
        .try_into()
        .map_err(|_| RpcError::invalid_params("code_hash must be 32 bytes"))?;

    let mut oracle = state.oracle.lock().await;
    let pending =
        oracle.schedule_upgrade(&caller, ImplementationHandle { address, code_hash }, unix_now())?;
    commit(state, &mut oracle).await?;

    serde_json::to_value(pending).map_err(|e| RpcError::internal_error(&e.to_string()))
}

pub async fn cancel_upgrade(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;

    let mut oracle = state.oracle.lock().await;
    oracle.cancel_upgrade(&caller)?;
    commit(state, &mut oracle).await?;

    Ok(serde_json::json!({ "cancelled": true }))
}

pub async fn apply_upgrade(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = param_caller(params)?;

    let mut oracle = state.oracle.lock().await;
    let implementation = oracle.apply_upgrade(&caller, unix_now())?;
    commit(state, &mut oracle).await?;

    serde_json::to_value(implementation).map_err(|e| RpcError::internal_error(&e.to_string()))
}
