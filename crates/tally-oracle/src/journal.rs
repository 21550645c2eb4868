//! Change journal between persisted points.
//!
//! The first time a record is touched after a commit its prior value is
//! kept. The touched keys name what to write; the priors are what a rollback
//! puts back. Later touches of the same record keep the first prior.

use std::collections::HashMap;
use std::hash::Hash;

use tally_types::governance::Parameters;
use tally_types::state::{
    AnchorState, ConsensusState, ReferenceFeedConfig, RoundRecord, TrackedAsset, UpgradeState,
};
use tally_types::{AssetId, RoundIndex, ValidatorId};

#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub parameters: Option<Parameters>,
    pub paused: Option<bool>,
    pub upgrades: Option<UpgradeState>,
    pub assets: HashMap<AssetId, Option<TrackedAsset>>,
    pub consensus: HashMap<AssetId, Option<ConsensusState>>,
    pub rounds: HashMap<(AssetId, RoundIndex), Option<RoundRecord>>,
    pub anchors: HashMap<AssetId, Option<AnchorState>>,
    pub feeds: HashMap<AssetId, Option<ReferenceFeedConfig>>,
    /// Log length per asset before the first append.
    pub observations: HashMap<AssetId, usize>,
    pub violations: HashMap<ValidatorId, Option<u32>>,
}

impl Journal {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_none()
            && self.paused.is_none()
            && self.upgrades.is_none()
            && self.assets.is_empty()
            && self.consensus.is_empty()
            && self.rounds.is_empty()
            && self.anchors.is_empty()
            && self.feeds.is_empty()
            && self.observations.is_empty()
            && self.violations.is_empty()
    }
}

/// Keep `prior()` under `key` unless a prior is already held.
pub(crate) fn keep<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, prior: impl FnOnce() -> V) {
    map.entry(key).or_insert_with(prior);
}

/// Keep `prior` in a single-valued slot unless one is already held.
pub(crate) fn keep_slot<V>(slot: &mut Option<V>, prior: impl FnOnce() -> V) {
    if slot.is_none() {
        *slot = Some(prior());
    }
}

/// Entries sorted by key, for a deterministic write order.
pub(crate) fn sorted<K: Ord + Copy, V>(map: &HashMap<K, V>) -> Vec<(K, &V)> {
    let mut entries: Vec<(K, &V)> = map.iter().map(|(k, v)| (*k, v)).collect();
    entries.sort_by_key(|(k, _)| *k);
    entries
}
