//! Notifications emitted by the oracle.
//!
//! Events are buffered by the oracle and drained by the host, which may log
//! them, persist them or forward them to subscribers.

use serde::{Deserialize, Serialize};

use crate::governance::{ImplementationHandle, Parameters};
use crate::{AssetId, Price, RoundIndex, SourceHandle, Timestamp, ValidatorId};

/// Why a batch item was skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ZeroAddress,
    InvalidPrice,
    AssetNotRegistered,
    /// A protocol-safety check rejected the item.
    Rejected { detail: String },
}

/// All oracle notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleEvent {
    AssetRegistered {
        asset: AssetId,
        timestamp: Timestamp,
    },
    AssetDeregistered {
        asset: AssetId,
    },
    PriceSubmitted {
        asset: AssetId,
        validator: ValidatorId,
        price: Price,
        round: RoundIndex,
    },
    SubmissionSkipped {
        asset: AssetId,
        validator: ValidatorId,
        reason: SkipReason,
    },
    ConsensusReached {
        asset: AssetId,
        price: Price,
        round: RoundIndex,
        submissions: u32,
        timestamp: Timestamp,
    },
    ReferenceFeedFailed {
        asset: AssetId,
        reason: String,
    },
    ReferenceFeedSet {
        asset: AssetId,
        source: SourceHandle,
        decimals: u8,
    },
    ReferenceFeedCleared {
        asset: AssetId,
    },
    OutlierDetected {
        asset: AssetId,
        validator: ValidatorId,
        submitted: Price,
        median: Price,
        violations_added: u32,
    },
    ValidatorSuspended {
        validator: ValidatorId,
        violations: u32,
    },
    ParametersUpdated {
        parameters: Parameters,
    },
    Paused,
    Unpaused,
    UpgradeScheduled {
        implementation: ImplementationHandle,
        eta: Timestamp,
    },
    UpgradeCancelled {
        implementation: ImplementationHandle,
    },
    UpgradeApplied {
        implementation: ImplementationHandle,
    },
}

impl OracleEvent {
    /// Stable event name, e.g. `"ConsensusReached"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssetRegistered { .. } => "AssetRegistered",
            Self::AssetDeregistered { .. } => "AssetDeregistered",
            Self::PriceSubmitted { .. } => "PriceSubmitted",
            Self::SubmissionSkipped { .. } => "SubmissionSkipped",
            Self::ConsensusReached { .. } => "ConsensusReached",
            Self::ReferenceFeedFailed { .. } => "ReferenceFeedFailed",
            Self::ReferenceFeedSet { .. } => "ReferenceFeedSet",
            Self::ReferenceFeedCleared { .. } => "ReferenceFeedCleared",
            Self::OutlierDetected { .. } => "OutlierDetected",
            Self::ValidatorSuspended { .. } => "ValidatorSuspended",
            Self::ParametersUpdated { .. } => "ParametersUpdated",
            Self::Paused => "Paused",
            Self::Unpaused => "Unpaused",
            Self::UpgradeScheduled { .. } => "UpgradeScheduled",
            Self::UpgradeCancelled { .. } => "UpgradeCancelled",
            Self::UpgradeApplied { .. } => "UpgradeApplied",
        }
    }

    /// The asset this event concerns, if any.
    pub fn asset(&self) -> Option<AssetId> {
        match self {
            Self::AssetRegistered { asset, .. }
            | Self::AssetDeregistered { asset }
            | Self::PriceSubmitted { asset, .. }
            | Self::SubmissionSkipped { asset, .. }
            | Self::ConsensusReached { asset, .. }
            | Self::ReferenceFeedFailed { asset, .. }
            | Self::ReferenceFeedSet { asset, .. }
            | Self::ReferenceFeedCleared { asset }
            | Self::OutlierDetected { asset, .. } => Some(*asset),
            _ => None,
        }
    }
}
