//! TWAP (Time-Weighted Average Price) calculation.
//!
//! Every finalized round appends one observation. The TWAP weights each
//! observation inside the window by how recent it is:
//!
//! ```text
//! weight_i = window - (now - timestamp_i)
//! TWAP     = sum(price_i * weight_i) / sum(weight_i)
//! ```
//!
//! An observation whose age equals the window is outside it. Observations are
//! never deleted; old ones are simply ignored.

use std::collections::HashMap;

use tally_types::state::TwapObservation;
use tally_types::{AssetId, Price, Timestamp};

/// Compute the recency-weighted TWAP at `now`.
///
/// Returns `0` when no observation is inside the window, and the price itself
/// when exactly one is. The result is the exact floor of the weighted mean for
/// any prices, provided the total weight stays below 2^64, that is fewer than
/// 2^44 observations inside a maximal window.
///
/// # Examples
///
/// ```
/// use tally_oracle::twap::compute_twap;
/// use tally_types::state::TwapObservation;
///
/// // 100 observed 900s ago, 200 observed now, 1800s window:
/// // weights 900 and 1800 => (100*900 + 200*1800) / 2700 = 166
/// let obs = [
///     TwapObservation { price: 100, timestamp: 100 },
///     TwapObservation { price: 200, timestamp: 1000 },
/// ];
/// assert_eq!(compute_twap(&obs, 1000, 1800), 166);
/// ```
pub fn compute_twap(observations: &[TwapObservation], now: Timestamp, window: u64) -> Price {
    let in_window: Vec<(Price, u128)> = observations
        .iter()
        .filter_map(|obs| {
            let age = now.saturating_sub(obs.timestamp);
            (age < window).then(|| (obs.price, u128::from(window - age)))
        })
        .collect();

    match in_window.as_slice() {
        [] => 0,
        [(price, _)] => *price,
        many => {
            // every weight is at least 1
            let total_weight: u128 = many.iter().map(|(_, weight)| weight).sum();
            // price = q * total + r splits the mean into sum(q * w) plus
            // sum(r * w) / total. The first stays below the largest price
            // and the second below total^2.
            let mut whole: u128 = 0;
            let mut remainder: u128 = 0;
            for (price, weight) in many {
                whole += price / total_weight * weight;
                remainder += price % total_weight * weight;
            }
            whole + remainder / total_weight
        }
    }
}

/// Append-only observation log per asset.
#[derive(Debug, Clone, Default)]
pub struct TwapLog {
    observations: HashMap<AssetId, Vec<TwapObservation>>,
}

impl TwapLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = (AssetId, Vec<TwapObservation>)>) -> Self {
        Self {
            observations: records.into_iter().collect(),
        }
    }

    pub fn record(&mut self, asset: AssetId, price: Price, timestamp: Timestamp) {
        self.observations
            .entry(asset)
            .or_default()
            .push(TwapObservation { price, timestamp });
    }

    pub fn observations(&self, asset: &AssetId) -> &[TwapObservation] {
        self.observations
            .get(asset)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self, asset: &AssetId) -> usize {
        self.observations(asset).len()
    }

    /// Drop observations past the first `len`.
    pub fn truncate(&mut self, asset: &AssetId, len: usize) {
        if len == 0 {
            self.observations.remove(asset);
        } else if let Some(log) = self.observations.get_mut(asset) {
            log.truncate(len);
        }
    }

    pub fn twap(&self, asset: &AssetId, now: Timestamp, window: u64) -> Price {
        compute_twap(self.observations(asset), now, window)
    }

    pub fn records(&self) -> Vec<(AssetId, Vec<TwapObservation>)> {
        let mut records: Vec<_> = self
            .observations
            .iter()
            .map(|(asset, obs)| (*asset, obs.clone()))
            .collect();
        records.sort_by_key(|(asset, _)| *asset);
        records
    }
}
