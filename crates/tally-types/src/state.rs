//! Persisted oracle records.
//!
//! Each record is stored under its natural key (asset, `(asset, round)`,
//! validator). [`OracleSnapshot`] bundles all of them for persistence;
//! [`StateDelta`] carries only the records changed since the last write.

use serde::{Deserialize, Serialize};

use crate::governance::{ImplementationHandle, Parameters, PendingUpgrade};
use crate::{AssetId, Price, RoundIndex, SourceHandle, Timestamp, ValidatorId};

/// A registered asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAsset {
    pub id: AssetId,
    pub active: bool,
    pub registered_at: Timestamp,
}

/// Latest finalized consensus for one asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    /// Zero until the first round finalizes.
    pub latest_price: Price,
    pub last_update: Timestamp,
    /// Index of the currently open round.
    pub current_round: RoundIndex,
}

/// Hourly-reset baseline for one asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorState {
    pub price: Price,
    pub timestamp: Timestamp,
}

/// Reference feed binding for one asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFeedConfig {
    pub source: SourceHandle,
    pub source_decimals: u8,
    pub enabled: bool,
}

/// A finalized consensus price recorded for TWAP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapObservation {
    pub price: Price,
    pub timestamp: Timestamp,
}

/// One validator's price within a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub validator: ValidatorId,
    pub price: Price,
}

/// A submission round for one asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub asset: AssetId,
    pub index: RoundIndex,
    /// Submissions in arrival order.
    pub submissions: Vec<Submission>,
    pub finalized: bool,
}

/// Everything the oracle persists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSnapshot {
    pub parameters: Parameters,
    pub paused: bool,
    /// Registration order.
    pub assets: Vec<TrackedAsset>,
    pub consensus: Vec<(AssetId, ConsensusState)>,
    pub anchors: Vec<(AssetId, AnchorState)>,
    pub reference_feeds: Vec<(AssetId, ReferenceFeedConfig)>,
    pub rounds: Vec<RoundRecord>,
    pub observations: Vec<(AssetId, Vec<TwapObservation>)>,
    pub violations: Vec<(ValidatorId, u32)>,
    pub implementation: Option<ImplementationHandle>,
    pub pending_upgrade: Option<PendingUpgrade>,
}

/// Upgrade timelock state, written as one record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeState {
    pub implementation: Option<ImplementationHandle>,
    pub pending: Option<PendingUpgrade>,
}

/// Records changed since the last persisted point, at their current values.
///
/// Assets, consensus, anchors, rounds and violations are never removed, so
/// they carry plain values; a cleared feed is `None`. Observations are only
/// ever appended and carry their position in the asset's log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub parameters: Option<Parameters>,
    pub paused: Option<bool>,
    pub upgrades: Option<UpgradeState>,
    /// `(registration position, record)`.
    pub assets: Vec<(usize, TrackedAsset)>,
    pub consensus: Vec<(AssetId, ConsensusState)>,
    pub anchors: Vec<(AssetId, AnchorState)>,
    pub reference_feeds: Vec<(AssetId, Option<ReferenceFeedConfig>)>,
    pub rounds: Vec<RoundRecord>,
    /// `(asset, seq, observation)`.
    pub observations: Vec<(AssetId, usize, TwapObservation)>,
    pub violations: Vec<(ValidatorId, u32)>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_none()
            && self.paused.is_none()
            && self.upgrades.is_none()
            && self.assets.is_empty()
            && self.consensus.is_empty()
            && self.anchors.is_empty()
            && self.reference_feeds.is_empty()
            && self.rounds.is_empty()
            && self.observations.is_empty()
            && self.violations.is_empty()
    }
}
