//! Validator submission handlers.

use std::sync::Arc;

use serde_json::Value;
use tally_oracle::SubmissionReceipt;

use super::{
    commit, param_address, param_addresses, param_caller, param_price, param_prices, unix_now,
    Result,
};
use crate::rpc::RpcError;
use crate::DaemonState;

fn receipt_json(receipt: &SubmissionReceipt) -> Value {
    serde_json::json!({
        "asset": receipt.asset,
        "round": receipt.round,
        "submissions": receipt.submissions,
        "consensus": receipt.consensus.map(|p| p.to_string()),
    })
}

/// Submit one price as `caller`.
pub async fn submit_price(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator = param_caller(params)?;
    let asset = param_address(params, "asset")?;
    let price = param_price(params, "price")?;

    let mut oracle = state.oracle.lock().await;
    let receipt = oracle.submit_price(&validator, asset, price, unix_now())?;
    commit(state, &mut oracle).await?;

    Ok(receipt_json(&receipt))
}

/// Submit prices for several assets in one call.
pub async fn submit_price_batch(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator = param_caller(params)?;
    let assets = param_addresses(params, "assets")?;
    let prices = param_prices(params, "prices")?;

    let mut oracle = state.oracle.lock().await;
    let report = oracle.submit_price_batch(&validator, &assets, &prices, unix_now())?;
    commit(state, &mut oracle).await?;

    let skipped = report
        .skipped
        .iter()
        .map(|(asset, reason)| {
            let reason = serde_json::to_value(reason)
                .map_err(|e| RpcError::internal_error(&e.to_string()))?;
            Ok(serde_json::json!({ "asset": asset, "reason": reason }))
        })
        .collect::<std::result::Result<Vec<_>, RpcError>>()?;

    Ok(serde_json::json!({
        "accepted": report.accepted.iter().map(receipt_json).collect::<Vec<_>>(),
        "skipped": skipped,
    }))
}
