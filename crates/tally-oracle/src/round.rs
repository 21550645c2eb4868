//! Round bookkeeping.
//!
//! Each asset has exactly one open round at a time, at
//! `ConsensusState::current_round`. A round is created lazily on its first
//! submission and becomes immutable once finalized; finalization advances the
//! asset to the next index.

use std::collections::HashMap;

use tally_types::state::{ConsensusState, RoundRecord, Submission};
use tally_types::{AssetId, Price, RoundIndex, Timestamp, ValidatorId};

use crate::math::median;

/// Result of finalizing a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedRound {
    pub asset: AssetId,
    pub round: RoundIndex,
    pub median: Price,
    pub submissions: Vec<Submission>,
    pub timestamp: Timestamp,
}

/// Rounds and consensus state for every asset.
#[derive(Debug, Clone, Default)]
pub struct RoundBook {
    rounds: HashMap<(AssetId, RoundIndex), RoundRecord>,
    consensus: HashMap<AssetId, ConsensusState>,
}

impl RoundBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(
        consensus: impl IntoIterator<Item = (AssetId, ConsensusState)>,
        rounds: impl IntoIterator<Item = RoundRecord>,
    ) -> Self {
        Self {
            consensus: consensus.into_iter().collect(),
            rounds: rounds
                .into_iter()
                .map(|r| ((r.asset, r.index), r))
                .collect(),
        }
    }

    /// Consensus state, defaulting to "no consensus, round 0".
    pub fn consensus(&self, asset: &AssetId) -> ConsensusState {
        self.consensus.get(asset).copied().unwrap_or_default()
    }

    /// The stored consensus record, if any round ever finalized.
    pub fn consensus_record(&self, asset: &AssetId) -> Option<ConsensusState> {
        self.consensus.get(asset).copied()
    }

    /// Put back an earlier consensus record.
    pub fn restore_consensus(&mut self, asset: AssetId, prior: Option<ConsensusState>) {
        match prior {
            Some(state) => self.consensus.insert(asset, state),
            None => self.consensus.remove(&asset),
        };
    }

    /// Put back an earlier state of one round.
    pub fn restore_round(&mut self, asset: AssetId, index: RoundIndex, prior: Option<RoundRecord>) {
        match prior {
            Some(round) => self.rounds.insert((asset, index), round),
            None => self.rounds.remove(&(asset, index)),
        };
    }

    pub fn current_round(&self, asset: &AssetId) -> RoundIndex {
        self.consensus(asset).current_round
    }

    pub fn round(&self, asset: &AssetId, index: RoundIndex) -> Option<&RoundRecord> {
        self.rounds.get(&(*asset, index))
    }

    /// Whether `validator` already submitted in the open round.
    pub fn has_submitted(&self, asset: &AssetId, validator: &ValidatorId) -> bool {
        self.round(asset, self.current_round(asset))
            .is_some_and(|r| r.submissions.iter().any(|s| &s.validator == validator))
    }

    /// Record a submission in the open round.
    ///
    /// Returns the round index and the new submission count. The caller must
    /// have checked [`has_submitted`](Self::has_submitted).
    pub fn record(&mut self, asset: AssetId, validator: ValidatorId, price: Price) -> (RoundIndex, u32) {
        let index = self.current_round(&asset);
        let round = self
            .rounds
            .entry((asset, index))
            .or_insert_with(|| RoundRecord {
                asset,
                index,
                submissions: Vec::new(),
                finalized: false,
            });
        round.submissions.push(Submission { validator, price });
        (index, round.submissions.len() as u32)
    }

    /// Finalize the open round at its median and advance to the next index.
    ///
    /// Returns `None` if the open round has no submissions.
    pub fn finalize(&mut self, asset: AssetId, now: Timestamp) -> Option<FinalizedRound> {
        let index = self.current_round(&asset);
        let round = self.rounds.get_mut(&(asset, index))?;

        let mut prices: Vec<Price> = round.submissions.iter().map(|s| s.price).collect();
        let median = median(&mut prices)?;
        round.finalized = true;
        let submissions = round.submissions.clone();

        let state = self.consensus.entry(asset).or_default();
        state.latest_price = median;
        state.last_update = now;
        state.current_round = index + 1;

        Some(FinalizedRound {
            asset,
            round: index,
            median,
            submissions,
            timestamp: now,
        })
    }

    pub fn consensus_records(&self) -> Vec<(AssetId, ConsensusState)> {
        let mut records: Vec<_> = self.consensus.iter().map(|(k, v)| (*k, *v)).collect();
        records.sort_by_key(|(asset, _)| *asset);
        records
    }

    pub fn round_records(&self) -> Vec<RoundRecord> {
        let mut records: Vec<_> = self.rounds.values().cloned().collect();
        records.sort_by_key(|r| (r.asset, r.index));
        records
    }
}
