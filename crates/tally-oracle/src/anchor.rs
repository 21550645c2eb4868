//! Hourly anchor bounding cumulative drift.
//!
//! The circuit breaker compares a submission only with the last finalized
//! consensus, so a chain of small steps can walk the price arbitrarily far.
//! The anchor pins a baseline for up to [`ANCHOR_WINDOW_SECS`] and rejects
//! anything more than [`MAX_CUMULATIVE_DEVIATION_BPS`] away from it.

use std::collections::HashMap;

use tally_types::state::AnchorState;
use tally_types::{AssetId, Bps, Price, Timestamp};

use crate::math::deviation_bps;
use crate::{exceeds, OracleError, Result};

/// Seconds after which the anchor resets to the next submission.
pub const ANCHOR_WINDOW_SECS: u64 = 3600;

/// Maximum deviation from the anchor (20%).
pub const MAX_CUMULATIVE_DEVIATION_BPS: Bps = 2000;

/// Outcome of an anchor check, applied with [`AnchorTracker::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorCheck {
    /// The submission establishes a new anchor and is exempt from the bound.
    Reset(AnchorState),
    /// The submission is within the ceiling of the current anchor.
    Within { deviation_bps: u128 },
}

/// Per-asset anchors.
#[derive(Debug, Clone, Default)]
pub struct AnchorTracker {
    anchors: HashMap<AssetId, AnchorState>,
}

impl AnchorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = (AssetId, AnchorState)>) -> Self {
        Self {
            anchors: records.into_iter().collect(),
        }
    }

    pub fn get(&self, asset: &AssetId) -> Option<AnchorState> {
        self.anchors.get(asset).copied()
    }

    /// Check `price` against the anchor without mutating anything.
    ///
    /// # Errors
    ///
    /// - [`OracleError::CumulativeDeviationExceeded`] if the anchor is live and
    ///   `price` is more than [`MAX_CUMULATIVE_DEVIATION_BPS`] away from it
    pub fn check(&self, asset: &AssetId, price: Price, now: Timestamp) -> Result<AnchorCheck> {
        let anchor = match self.anchors.get(asset) {
            Some(anchor) if now.saturating_sub(anchor.timestamp) <= ANCHOR_WINDOW_SECS => anchor,
            _ => {
                return Ok(AnchorCheck::Reset(AnchorState {
                    price,
                    timestamp: now,
                }))
            }
        };

        let deviation = deviation_bps(price, anchor.price);
        if exceeds(deviation, MAX_CUMULATIVE_DEVIATION_BPS) {
            return Err(OracleError::CumulativeDeviationExceeded {
                anchor: anchor.price,
                attempted: price,
                deviation_bps: deviation,
            });
        }
        Ok(AnchorCheck::Within {
            deviation_bps: deviation,
        })
    }

    /// Apply the outcome of a successful [`check`](Self::check).
    pub fn commit(&mut self, asset: AssetId, outcome: AnchorCheck) {
        if let AnchorCheck::Reset(state) = outcome {
            tracing::debug!(asset = %asset, price = state.price, "anchor reset");
            self.anchors.insert(asset, state);
        }
    }

    /// Put back an earlier anchor.
    pub fn restore(&mut self, asset: AssetId, prior: Option<AnchorState>) {
        match prior {
            Some(state) => self.anchors.insert(asset, state),
            None => self.anchors.remove(&asset),
        };
    }

    pub fn records(&self) -> Vec<(AssetId, AnchorState)> {
        let mut records: Vec<_> = self.anchors.iter().map(|(k, v)| (*k, *v)).collect();
        records.sort_by_key(|(asset, _)| *asset);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Address;

    const T0: Timestamp = 1_700_000_000;

    fn asset() -> AssetId {
        Address::from_low_u8(1)
    }

    fn anchored(price: Price) -> AnchorTracker {
        let mut tracker = AnchorTracker::new();
        let outcome = tracker.check(&asset(), price, T0).expect("first check");
        tracker.commit(asset(), outcome);
        tracker
    }

    #[test]
    fn test_first_submission_sets_anchor() {
        let tracker = AnchorTracker::new();
        let outcome = tracker.check(&asset(), 1000, T0).expect("check");
        assert_eq!(
            outcome,
            AnchorCheck::Reset(AnchorState {
                price: 1000,
                timestamp: T0
            })
        );
        // check alone does not mutate
        assert_eq!(tracker.get(&asset()), None);
    }

    #[test]
    fn test_within_ceiling() {
        let tracker = anchored(1000);
        let outcome = tracker.check(&asset(), 1200, T0 + 10).expect("exactly 20%");
        assert_eq!(outcome, AnchorCheck::Within { deviation_bps: 2000 });
    }

    #[test]
    fn test_exceeds_ceiling() {
        let tracker = anchored(1000);
        let err = tracker.check(&asset(), 1201, T0 + 10).unwrap_err();
        assert!(matches!(
            err,
            OracleError::CumulativeDeviationExceeded {
                anchor: 1000,
                attempted: 1201,
                deviation_bps: 2010
            }
        ));
    }

    #[test]
    fn test_anchor_holds_for_full_hour() {
        let tracker = anchored(1000);
        assert!(tracker
            .check(&asset(), 1300, T0 + ANCHOR_WINDOW_SECS)
            .is_err());
    }

    #[test]
    fn test_anchor_resets_after_hour() {
        let mut tracker = anchored(1000);
        let outcome = tracker
            .check(&asset(), 1300, T0 + ANCHOR_WINDOW_SECS + 1)
            .expect("reset");
        assert!(matches!(outcome, AnchorCheck::Reset(_)));
        tracker.commit(asset(), outcome);
        assert_eq!(tracker.get(&asset()).map(|a| a.price), Some(1300));
    }

    #[test]
    fn test_within_does_not_move_anchor() {
        let mut tracker = anchored(1000);
        let outcome = tracker.check(&asset(), 1100, T0 + 5).expect("check");
        tracker.commit(asset(), outcome);
        assert_eq!(
            tracker.get(&asset()),
            Some(AnchorState {
                price: 1000,
                timestamp: T0
            })
        );
    }
}
