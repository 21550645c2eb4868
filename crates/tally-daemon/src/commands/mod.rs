//! IPC command handlers.
//!
//! - [`admin`]: registry, parameters, feeds, roles, pause and upgrades
//! - [`submit`]: validator price submissions
//! - [`query`]: read-only views
//!
//! Prices cross the wire as decimal strings so values above `u64::MAX`
//! survive JSON. Mutating calls name their `caller` explicitly.

pub mod admin;
pub mod query;
pub mod submit;

use serde_json::Value;
use tally_types::{Address, Price};

use crate::rpc::RpcError;
use crate::{DaemonState, Oracle};

type Result = std::result::Result<Value, RpcError>;

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub(crate) fn param_address(params: &Value, key: &str) -> std::result::Result<Address, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?
        .parse()
        .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}

pub(crate) fn param_caller(params: &Value) -> std::result::Result<Address, RpcError> {
    param_address(params, "caller")
}

fn parse_price(key: &str, value: &Value) -> std::result::Result<Price, RpcError> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}"))),
        Value::Number(n) => n
            .as_u64()
            .map(Price::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{key}: not an unsigned integer"))),
        _ => Err(RpcError::invalid_params(&format!("{key}: expected string or integer"))),
    }
}

/// A price given as a decimal string or a JSON integer.
pub(crate) fn param_price(params: &Value, key: &str) -> std::result::Result<Price, RpcError> {
    let value = params
        .get(key)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    parse_price(key, value)
}

pub(crate) fn param_u64(params: &Value, key: &str) -> std::result::Result<u64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

pub(crate) fn param_u32(params: &Value, key: &str) -> std::result::Result<u32, RpcError> {
    u32::try_from(param_u64(params, key)?)
        .map_err(|_| RpcError::invalid_params(&format!("{key} out of range")))
}

pub(crate) fn param_u64_or(params: &Value, key: &str, default: u64) -> u64 {
    params.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

pub(crate) fn param_addresses(
    params: &Value,
    key: &str,
) -> std::result::Result<Vec<Address>, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} array required")))?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| RpcError::invalid_params(&format!("{key}: expected hex strings")))?
                .parse()
                .map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
        })
        .collect()
}

pub(crate) fn param_prices(params: &Value, key: &str) -> std::result::Result<Vec<Price>, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} array required")))?
        .iter()
        .map(|v| parse_price(key, v))
        .collect()
}

/// Persist what the last mutation changed, then publish its events.
///
/// Called with the oracle lock held, after every successful mutation. Only
/// the touched records are written. If the write fails the oracle is rolled
/// back to the last persisted state and the events are dropped, so memory
/// never runs ahead of the database and the caller may retry.
pub(crate) async fn commit(state: &DaemonState, oracle: &mut Oracle) -> std::result::Result<(), RpcError> {
    let delta = oracle.changes();
    if !delta.is_empty() {
        let mut db = state.db.lock().await;
        if let Err(e) = tally_db::state::apply(&mut db, &delta) {
            tracing::error!(error = %e, "failed to persist oracle changes, rolling back");
            oracle.rollback();
            return Err(RpcError::internal_error(&format!("db error: {e}")));
        }
    }
    oracle.mark_persisted();

    let now = unix_now();
    for event in oracle.drain_events() {
        state.event_bus.emit(event, now);
    }
    Ok(())
}
